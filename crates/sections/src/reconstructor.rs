//! Section reconstruction from retrieved chunks and fetched siblings

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use retrieval_config::SectionScorePolicy;
use retrieval_core::{Candidate, DocumentMetadata, ScrollPoint, SearchType};

use crate::detector::DetectedSection;
use crate::path::SectionPath;

/// A reconstructed section, ready to merge into the result list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructedSection {
    pub id: String,
    pub section_path: String,
    pub doc_id: String,
    pub content: String,
    /// Ids of the retrieved chunks the section covers
    pub original_chunk_refs: Vec<String>,
    pub payload: DocumentMetadata,
    pub combined_score: f32,
    /// Scores of the original chunks, in retrieval order
    pub component_scores: Vec<f32>,
}

impl ReconstructedSection {
    /// Present the section as a candidate.
    pub fn to_candidate(&self) -> Candidate {
        let mut candidate = Candidate::new(self.id.clone(), self.combined_score, self.payload.clone())
            .with_content(self.content.clone())
            .with_search_type(SearchType::SectionReconstructed);
        candidate.fusion_score = Some(self.combined_score);
        candidate
    }
}

struct OrderedChunk {
    part: Option<u64>,
    original_order: usize,
    content: String,
}

/// Merge a detected section's chunks with its fetched siblings into one
/// coherent section.
pub fn reconstruct_section(
    detected: &DetectedSection,
    siblings: &[ScrollPoint],
    policy: SectionScorePolicy,
) -> ReconstructedSection {
    let mut chunks: Vec<OrderedChunk> = Vec::new();

    for (order, candidate) in detected.original_chunks.iter().enumerate() {
        chunks.push(OrderedChunk {
            part: part_of(candidate.payload.section_path.as_deref(), &detected.base_section_path),
            original_order: order,
            content: candidate.content.clone().unwrap_or_default(),
        });
    }
    let offset = chunks.len();
    for (order, sibling) in siblings.iter().enumerate() {
        let meta = DocumentMetadata::from_payload(&sibling.payload);
        // A substring fetch can drag in neighbours of another block; only
        // chunks that parse to the detected base participate.
        let part = part_of(meta.section_path.as_deref(), &detected.base_section_path);
        if meta.section_path.is_some() && part.is_none() {
            continue;
        }
        chunks.push(OrderedChunk {
            part,
            original_order: offset + order,
            content: sibling.content.clone().unwrap_or_default(),
        });
    }

    // Base section orders as part 0; unknown parts keep original rank
    // after the parsed ones.
    chunks.sort_by_key(|chunk| match chunk.part {
        Some(part) => (0u8, part, chunk.original_order),
        None => (1u8, 0, chunk.original_order),
    });

    let content = merge_contents(&chunks);
    let payload = combine_payloads(detected);
    let component_scores: Vec<f32> = detected
        .original_chunks
        .iter()
        .map(|chunk| chunk.score)
        .collect();
    let combined_score = combine_scores(&component_scores, policy);

    ReconstructedSection {
        id: format!("section-{}", Uuid::new_v4()),
        section_path: detected.base_section_path.clone(),
        doc_id: detected.doc_id.clone(),
        content,
        original_chunk_refs: detected
            .original_chunks
            .iter()
            .map(|chunk| chunk.id.clone())
            .collect(),
        payload,
        combined_score,
        component_scores,
    }
}

/// Parsed part index when the path belongs to the detected base.
fn part_of(section_path: Option<&str>, base: &str) -> Option<u64> {
    let path = SectionPath::parse(section_path?)?;
    if path.base() == base {
        Some(path.part_index())
    } else {
        None
    }
}

/// Join chunk contents with blank-line separators, deduplicating identical
/// paragraphs across chunks.
fn merge_contents(chunks: &[OrderedChunk]) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut paragraphs: Vec<String> = Vec::new();
    for chunk in chunks {
        for paragraph in chunk.content.split("\n\n") {
            let trimmed = paragraph.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.to_string()) {
                paragraphs.push(trimmed.to_string());
            }
        }
    }
    paragraphs.join("\n\n")
}

/// Combine payloads across the group: scalar keys keep the first value,
/// array-valued keys take the per-key union. `sectionPath` becomes the
/// base and `docId` is preserved.
fn combine_payloads(detected: &DetectedSection) -> DocumentMetadata {
    let mut combined = detected
        .original_chunks
        .first()
        .map(|chunk| chunk.payload.clone())
        .unwrap_or_default();
    combined.section_path = Some(detected.base_section_path.clone());
    combined.doc_id = detected.doc_id.clone();

    for chunk in detected.original_chunks.iter().skip(1) {
        for acl_entry in &chunk.payload.acl {
            if !combined.acl.contains(acl_entry) {
                combined.acl.push(acl_entry.clone());
            }
        }
        for (key, value) in &chunk.payload.extra {
            match (combined.extra.get_mut(key), value) {
                (Some(Value::Array(existing)), Value::Array(incoming)) => {
                    for item in incoming {
                        if !existing.contains(item) {
                            existing.push(item.clone());
                        }
                    }
                }
                (None, _) => {
                    combined.extra.insert(key.clone(), value.clone());
                }
                _ => {}
            }
        }
    }
    combined
}

fn combine_scores(scores: &[f32], policy: SectionScorePolicy) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    match policy {
        SectionScorePolicy::Average => scores.iter().sum::<f32>() / scores.len() as f32,
        SectionScorePolicy::Max => scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max),
        SectionScorePolicy::Min => scores.iter().cloned().fold(f32::INFINITY, f32::min),
        SectionScorePolicy::WeightedAverage => {
            let mut weighted = 0.0f32;
            let mut weight_sum = 0.0f32;
            for (index, score) in scores.iter().enumerate() {
                let weight = 1.0 / (index as f32 + 1.0);
                weighted += score * weight;
                weight_sum += weight;
            }
            weighted / weight_sum
        }
    }
}
