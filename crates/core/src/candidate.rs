//! Candidate and fusion-input value objects
//!
//! Candidates are produced by one pipeline stage and handed to the next;
//! no stage mutates a prior stage's candidate. Stage-specific extensions
//! (component scores, term hits) are optional fields on the flat record,
//! with `SearchType` tagging the stage provenance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::metadata::DocumentMetadata;

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    VectorOnly,
    KeywordOnly,
    Hybrid,
    SectionReconstructed,
    SectionRelated,
}

impl Default for SearchType {
    fn default() -> Self {
        SearchType::Hybrid
    }
}

/// How a query term matched inside a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermMatchKind {
    /// Whole-word match
    Exact,
    /// Sub-token or stem-level match
    Lemma,
    /// Within Levenshtein distance 1 of a document word
    Fuzzy,
}

/// A single term occurrence recorded by the lexical adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermHit {
    /// Field the term matched in (`content`, `title`, `docId`, `header`, `sectionPath`)
    pub field: String,
    /// Kind of match
    pub match_kind: TermMatchKind,
    /// Word indices of the occurrences, when tracked
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<usize>,
}

/// A scored reference to a document chunk, carrying enough metadata for
/// RBAC, ranking, and presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Chunk identifier
    pub id: String,
    /// Current-stage score
    pub score: f32,
    /// Payload metadata; authoritative for access decisions
    pub payload: DocumentMetadata,
    /// Chunk content, when the store returned it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Score assigned by vector search, if the candidate passed through it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    /// Score assigned by lexical search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f32>,
    /// Score assigned by fusion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion_score: Option<f32>,
    /// Score assigned by the reranker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_score: Option<f32>,
    /// 1-based rank within the final list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    /// Stage provenance tag
    #[serde(default)]
    pub search_type: SearchType,
    /// Per-term hit records from the lexical adapter
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub term_hits: HashMap<String, Vec<TermHit>>,
    /// Word indices per query term in the composite text
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub token_positions: HashMap<String, Vec<usize>>,
    /// Set when the query matched the temporal class and this candidate's
    /// content carries temporal keywords
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub temporal_boost: bool,
}

impl Candidate {
    /// Create a minimal candidate.
    pub fn new(id: impl Into<String>, score: f32, payload: DocumentMetadata) -> Self {
        Self {
            id: id.into(),
            score,
            payload,
            content: None,
            vector_score: None,
            keyword_score: None,
            fusion_score: None,
            reranker_score: None,
            rank: None,
            search_type: SearchType::Hybrid,
            term_hits: HashMap::new(),
            token_positions: HashMap::new(),
            temporal_boost: false,
        }
    }

    /// Set the content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the provenance tag.
    pub fn with_search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    /// Best available component score, used for tie-breaking after fusion.
    pub fn component_max(&self) -> f32 {
        [self.vector_score, self.keyword_score]
            .into_iter()
            .flatten()
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Input to the fusion core. Within one list, ids are unique and
/// `rank == 1 + index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionInput {
    pub id: String,
    pub score: f32,
    /// 1-based rank within the source list
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
}

impl FusionInput {
    /// Build a ranked fusion list from scored ids, assigning contiguous
    /// 1-based ranks in input order.
    pub fn from_scored(items: impl IntoIterator<Item = (String, f32, Option<String>)>) -> Vec<Self> {
        items
            .into_iter()
            .enumerate()
            .map(|(index, (id, score, doc_id))| Self {
                id,
                score,
                rank: index + 1,
                doc_id,
            })
            .collect()
    }
}
