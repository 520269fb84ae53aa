//! Per-document deduplication
//!
//! Retrieval frequently returns many chunks of the same document. Each
//! side of the pipeline keeps only the highest-scored few per document so
//! fusion sees breadth, not one document's echo.

use std::collections::HashMap;

use retrieval_core::Candidate;

/// Keep up to `cap` highest-scored chunks per `doc_id`, preserving the
/// input ordering among survivors. Candidates without a document id are
/// never deduplicated against each other.
pub fn dedup_by_doc(candidates: Vec<Candidate>, cap: usize) -> Vec<Candidate> {
    if cap == 0 {
        return Vec::new();
    }

    // Rank each candidate within its document by score.
    let mut per_doc: HashMap<&str, Vec<(usize, f32)>> = HashMap::new();
    for (index, candidate) in candidates.iter().enumerate() {
        if candidate.payload.doc_id.is_empty() {
            continue;
        }
        per_doc
            .entry(candidate.payload.doc_id.as_str())
            .or_default()
            .push((index, candidate.score));
    }

    let mut keep: Vec<bool> = vec![true; candidates.len()];
    for entries in per_doc.values() {
        if entries.len() <= cap {
            continue;
        }
        let mut sorted = entries.clone();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (index, _) in sorted.into_iter().skip(cap) {
            keep[index] = false;
        }
    }

    candidates
        .into_iter()
        .enumerate()
        .filter_map(|(index, candidate)| keep[index].then_some(candidate))
        .collect()
}
