//! Fragmented-section detection
//!
//! Groups retrieved candidates by base section path and applies three
//! rules in priority order; the first match wins. Groups that look
//! complete are not detected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use retrieval_core::Candidate;

use crate::path::SectionPath;

/// Which rule detected the fragmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPattern {
    /// Gap in observed part indices, or base section alongside parts
    SequentialParts,
    /// A single chunk carrying a markdown table fragment
    SinglePartTable,
    /// Generic residual: the group starts mid-section
    PartialStructure,
}

/// A detected fragmented section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedSection {
    /// `block_<N>` shared by the group
    pub base_section_path: String,
    pub doc_id: String,
    /// The retrieved chunks belonging to the group, in retrieval order
    pub original_chunks: Vec<Candidate>,
    pub confidence: f32,
    pub pattern: DetectionPattern,
    pub detection_reasons: Vec<String>,
}

/// Detect fragmented sections among retrieved candidates. Candidates whose
/// section path does not parse are ignored, never rejected.
pub fn detect_sections(candidates: &[Candidate]) -> Vec<DetectedSection> {
    let mut groups: BTreeMap<(String, String), Vec<(&Candidate, SectionPath)>> = BTreeMap::new();
    for candidate in candidates {
        let Some(raw_path) = candidate.payload.section_path.as_deref() else {
            continue;
        };
        let Some(path) = SectionPath::parse(raw_path) else {
            continue;
        };
        groups
            .entry((candidate.payload.doc_id.clone(), path.base()))
            .or_default()
            .push((candidate, path));
    }

    let mut detected: Vec<DetectedSection> = groups
        .into_iter()
        .filter_map(|((doc_id, base), group)| classify_group(doc_id, base, group))
        .collect();

    detected.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    detected
}

fn classify_group(
    doc_id: String,
    base: String,
    group: Vec<(&Candidate, SectionPath)>,
) -> Option<DetectedSection> {
    let has_base = group.iter().any(|(_, path)| path.part.is_none());
    let mut parts: Vec<u64> = group
        .iter()
        .filter_map(|(_, path)| path.part)
        .collect();
    parts.sort_unstable();
    parts.dedup();

    let mut reasons = Vec::new();

    // Rule 1: sequential parts with a gap, or base mixed with parts.
    let gap = first_gap(&parts);
    if let Some(missing) = gap {
        reasons.push(format!("gap in part indices: missing part_{missing}"));
        return Some(build(
            doc_id,
            base,
            group,
            0.9,
            DetectionPattern::SequentialParts,
            reasons,
        ));
    }
    if has_base && !parts.is_empty() {
        reasons.push("base section retrieved alongside part chunks".to_string());
        return Some(build(
            doc_id,
            base,
            group,
            0.8,
            DetectionPattern::SequentialParts,
            reasons,
        ));
    }

    // Rule 2: a lone chunk holding a markdown table fragment.
    if group.len() == 1 {
        let content = group[0].0.content.as_deref().unwrap_or("");
        if content.contains('|') && content.contains("---") {
            reasons.push("single chunk contains a markdown table fragment".to_string());
            return Some(build(
                doc_id,
                base,
                group,
                0.85,
                DetectionPattern::SinglePartTable,
                reasons,
            ));
        }
    }

    // Rule 3: generic residual; the group starts mid-section.
    if !has_base && parts.first().map(|&first| first > 0).unwrap_or(false) {
        let confidence = (0.5 + 0.1 * parts.len() as f32).min(1.0);
        reasons.push(format!(
            "parts start at part_{} with no base section",
            parts[0]
        ));
        return Some(build(
            doc_id,
            base,
            group,
            confidence,
            DetectionPattern::PartialStructure,
            reasons,
        ));
    }

    None
}

/// First missing index in a sorted, deduplicated part list that should be
/// contiguous from its start.
fn first_gap(parts: &[u64]) -> Option<u64> {
    let first = *parts.first()?;
    for (offset, &part) in parts.iter().enumerate() {
        let expected = first + offset as u64;
        if part != expected {
            return Some(expected);
        }
    }
    None
}

fn build(
    doc_id: String,
    base: String,
    group: Vec<(&Candidate, SectionPath)>,
    confidence: f32,
    pattern: DetectionPattern,
    reasons: Vec<String>,
) -> DetectedSection {
    DetectedSection {
        base_section_path: base,
        doc_id,
        original_chunks: group.into_iter().map(|(c, _)| c.clone()).collect(),
        confidence,
        pattern,
        detection_reasons: reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrieval_core::DocumentMetadata;

    fn chunk(id: &str, doc_id: &str, section_path: &str, content: &str) -> Candidate {
        let payload = DocumentMetadata {
            tenant: "acme".to_string(),
            doc_id: doc_id.to_string(),
            acl: vec!["public".to_string()],
            section_path: Some(section_path.to_string()),
            ..Default::default()
        };
        Candidate::new(id, 0.5, payload).with_content(content)
    }

    #[test]
    fn test_gap_in_parts_detects_sequential() {
        let detected = detect_sections(&[
            chunk("a", "d7", "block_9/part_0", "first"),
            chunk("b", "d7", "block_9/part_2", "third"),
        ]);
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].pattern, DetectionPattern::SequentialParts);
        assert_eq!(detected[0].base_section_path, "block_9");
        assert!((detected[0].confidence - 0.9).abs() < f32::EPSILON);
        assert!(detected[0].detection_reasons[0].contains("part_1"));
    }

    #[test]
    fn test_base_with_parts_detects_sequential() {
        let detected = detect_sections(&[
            chunk("a", "d7", "block_3", "intro"),
            chunk("b", "d7", "block_3/part_1", "body"),
        ]);
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].pattern, DetectionPattern::SequentialParts);
        assert!((detected[0].confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_single_table_fragment_detects_table() {
        let detected = detect_sections(&[chunk(
            "a",
            "d1",
            "block_2/part_1",
            "| metric | value |\n| --- | --- |\n| uptime | 99.9 |",
        )]);
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].pattern, DetectionPattern::SinglePartTable);
        assert!((detected[0].confidence - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn test_mid_section_start_detects_partial_structure() {
        let detected = detect_sections(&[
            chunk("a", "d1", "block_4/part_2", "plain text"),
            chunk("b", "d1", "block_4/part_3", "plain text"),
        ]);
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].pattern, DetectionPattern::PartialStructure);
        assert!(detected[0].confidence >= 0.5);
        assert!(detected[0].confidence <= 1.0);
    }

    #[test]
    fn test_complete_looking_groups_are_not_detected() {
        // Contiguous parts from part_0, no table fragment.
        let detected = detect_sections(&[
            chunk("a", "d1", "block_5/part_0", "plain"),
            chunk("b", "d1", "block_5/part_1", "plain"),
        ]);
        assert!(detected.is_empty());
    }

    #[test]
    fn test_foreign_paths_are_ignored_without_crashing() {
        let detected = detect_sections(&[
            chunk("a", "d1", "chapter_1/verse_2", "| --- |"),
            chunk("b", "d1", "appendix", "text"),
        ]);
        assert!(detected.is_empty());
    }

    #[test]
    fn test_groups_are_keyed_by_doc_and_block() {
        // Same block number in different docs must not merge.
        let detected = detect_sections(&[
            chunk("a", "d1", "block_9/part_0", "x"),
            chunk("b", "d2", "block_9/part_2", "y"),
        ]);
        // d1 group is complete-looking; d2 starts mid-section.
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].doc_id, "d2");
    }

    #[test]
    fn test_detected_sections_sorted_by_confidence() {
        let detected = detect_sections(&[
            chunk("a", "d1", "block_1/part_1", "mid"),
            chunk("b", "d2", "block_2/part_0", "first"),
            chunk("c", "d2", "block_2/part_2", "third"),
        ]);
        assert_eq!(detected.len(), 2);
        assert!(detected[0].confidence >= detected[1].confidence);
        assert_eq!(detected[0].doc_id, "d2");
    }
}
