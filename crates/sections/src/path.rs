//! Closed section-path parser
//!
//! Paths follow `block_<N>` or `block_<N>/part_<M>`. Anything else parses
//! to `None` and is passed through untouched; no heuristics on unknown
//! shapes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SECTION_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^block_(\d+)(?:/part_(\d+))?$").expect("section path pattern"));

/// A parsed section path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectionPath {
    pub block: u64,
    /// `None` for the base section, which orders as part 0
    pub part: Option<u64>,
}

impl SectionPath {
    /// Parse a path or return `None` for any other shape.
    pub fn parse(path: &str) -> Option<Self> {
        let captures = SECTION_PATH.captures(path)?;
        let block = captures.get(1)?.as_str().parse().ok()?;
        let part = match captures.get(2) {
            Some(part) => Some(part.as_str().parse().ok()?),
            None => None,
        };
        Some(Self { block, part })
    }

    /// Base path shared by every part of the block.
    pub fn base(&self) -> String {
        format!("block_{}", self.block)
    }

    /// Ordering index: the base section is part 0.
    pub fn part_index(&self) -> u64 {
        self.part.unwrap_or(0)
    }
}

impl std::fmt::Display for SectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.part {
            Some(part) => write!(f, "block_{}/part_{}", self.block, part),
            None => write!(f, "block_{}", self.block),
        }
    }
}
