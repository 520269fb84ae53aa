//! Merging reconstructed sections into the result list

use std::collections::HashSet;

use retrieval_config::SectionMergeStrategy;
use retrieval_core::Candidate;

use crate::reconstructor::ReconstructedSection;

/// Merge reconstructed sections into the original candidate list under the
/// tenant's configured strategy.
pub fn merge_sections(
    original: Vec<Candidate>,
    sections: &[ReconstructedSection],
    strategy: SectionMergeStrategy,
) -> Vec<Candidate> {
    if sections.is_empty() {
        return original;
    }

    let covered: HashSet<&str> = sections
        .iter()
        .flat_map(|section| section.original_chunk_refs.iter())
        .map(|id| id.as_str())
        .collect();

    let section_candidates: Vec<Candidate> =
        sections.iter().map(|section| section.to_candidate()).collect();

    match strategy {
        SectionMergeStrategy::Replace => {
            let mut merged = section_candidates;
            merged.extend(
                original
                    .into_iter()
                    .filter(|candidate| !covered.contains(candidate.id.as_str())),
            );
            merged
        }
        SectionMergeStrategy::Append => {
            let mut merged = original;
            merged.extend(section_candidates);
            merged
        }
        SectionMergeStrategy::Interleave => {
            let mut merged: Vec<Candidate> = original
                .into_iter()
                .filter(|candidate| !covered.contains(candidate.id.as_str()))
                .collect();
            merged.extend(section_candidates);
            merged.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            merged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrieval_core::{DocumentMetadata, SearchType};

    fn candidate(id: &str, score: f32) -> Candidate {
        Candidate::new(id, score, DocumentMetadata::default())
    }

    fn section(id: &str, score: f32, covers: &[&str]) -> ReconstructedSection {
        ReconstructedSection {
            id: id.to_string(),
            section_path: "block_1".to_string(),
            doc_id: "d1".to_string(),
            content: "merged".to_string(),
            original_chunk_refs: covers.iter().map(|c| c.to_string()).collect(),
            payload: DocumentMetadata::default(),
            combined_score: score,
            component_scores: vec![score],
        }
    }

    #[test]
    fn test_replace_removes_covered_and_prepends() {
        let merged = merge_sections(
            vec![candidate("a", 0.9), candidate("b", 0.8), candidate("c", 0.7)],
            &[section("s", 0.85, &["a", "b"])],
            SectionMergeStrategy::Replace,
        );
        let ids: Vec<&str> = merged.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["s", "c"]);
        assert_eq!(merged[0].search_type, SearchType::SectionReconstructed);
    }

    #[test]
    fn test_append_keeps_originals() {
        let merged = merge_sections(
            vec![candidate("a", 0.9), candidate("b", 0.8)],
            &[section("s", 0.85, &["a", "b"])],
            SectionMergeStrategy::Append,
        );
        let ids: Vec<&str> = merged.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "s"]);
    }

    #[test]
    fn test_interleave_resorts_and_dedupes_covered() {
        let merged = merge_sections(
            vec![candidate("a", 0.9), candidate("b", 0.3)],
            &[section("s", 0.6, &["b"])],
            SectionMergeStrategy::Interleave,
        );
        let ids: Vec<&str> = merged.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "s"]);
    }

    #[test]
    fn test_no_sections_is_identity() {
        let merged = merge_sections(
            vec![candidate("a", 0.9)],
            &[],
            SectionMergeStrategy::Replace,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "a");
    }
}
