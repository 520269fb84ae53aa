//! Keyword-points rescorer
//!
//! Refines fused scores using the term hits collected during lexical
//! search. Penalizes bag-of-words false positives and rewards proximity,
//! coverage, and field placement. All math is CPU-bound and runs to
//! completion without suspension.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use retrieval_config::{DomainlessTunables, KeywordPointsTunables};
use retrieval_core::{Candidate, TermHit};

use crate::corpus_stats::CorpusStats;

/// A weighted query term produced by extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermWeight {
    pub term: String,
    /// `base · IDF^γ · phraseBonus`, with base decaying per extraction rank
    pub weight: f32,
    /// 1-based extraction rank
    pub rank: usize,
    /// Whether the term came from a quoted multi-token phrase
    pub is_phrase: bool,
}

/// A candidate after rescoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescoredCandidate {
    pub id: String,
    /// Score the candidate entered rescoring with
    pub fused_score: f32,
    /// Raw keyword points before blending
    pub raw_keyword_points: f32,
    /// `fused + λ · clamp(raw / medianRaw, 0, clampKwNorm)`
    pub final_score: f32,
    /// Suppressed by strict soft-AND
    pub suppressed: bool,
}

/// Keyword-points rescorer over cached corpus statistics.
pub struct KeywordPointsRescorer {
    tunables: KeywordPointsTunables,
    stats: Arc<dyn CorpusStats>,
}

impl KeywordPointsRescorer {
    pub fn new(tunables: KeywordPointsTunables, stats: Arc<dyn CorpusStats>) -> Self {
        Self { tunables, stats }
    }

    /// Extract weighted terms from the query. Quoted spans become phrase
    /// terms with a bonus; remaining words are ranked in appearance order
    /// with a per-rank decay.
    pub fn extract_term_weights(&self, query: &str) -> Vec<TermWeight> {
        let mut terms: Vec<(String, bool)> = Vec::new();

        let mut rest = String::new();
        let mut in_quote = false;
        let mut phrase = String::new();
        for ch in query.chars() {
            if ch == '"' {
                if in_quote {
                    let trimmed = phrase.trim().to_lowercase();
                    if trimmed.split_whitespace().count() >= 2 {
                        terms.push((trimmed, true));
                    } else if !trimmed.is_empty() {
                        terms.push((trimmed, false));
                    }
                    phrase.clear();
                }
                in_quote = !in_quote;
            } else if in_quote {
                phrase.push(ch);
            } else {
                rest.push(ch);
            }
        }

        for word in rest.unicode_words() {
            let lowered = word.to_lowercase();
            if lowered.len() <= 2 {
                continue;
            }
            if terms.iter().any(|(term, _)| term == &lowered) {
                continue;
            }
            terms.push((lowered, false));
        }

        terms
            .into_iter()
            .enumerate()
            .map(|(index, (term, is_phrase))| {
                let base = self.tunables.rank_decay.powi(index as i32);
                let idf = self.stats.idf(&term).max(0.0);
                let phrase_bonus = if is_phrase {
                    self.tunables.phrase_bonus
                } else {
                    1.0
                };
                TermWeight {
                    weight: base * idf.powf(self.tunables.idf_gamma) * phrase_bonus,
                    term,
                    rank: index + 1,
                    is_phrase,
                }
            })
            .collect()
    }

    /// Rescore a fused candidate list. Candidates carry `term_hits` and
    /// `token_positions` from the lexical adapter; candidates that never
    /// passed through lexical search keep their fused score.
    pub fn rescore(&self, candidates: &[Candidate], terms: &[TermWeight]) -> Vec<RescoredCandidate> {
        let raw_points: Vec<f32> = candidates
            .iter()
            .map(|candidate| self.raw_points(candidate, terms))
            .collect();

        // The median is taken over candidates with keyword evidence;
        // vector-only zeros would otherwise drag it to nothing and let a
        // lone lexical match clamp to the maximum blend.
        let positive: Vec<f32> = raw_points.iter().copied().filter(|raw| *raw > 0.0).collect();
        let median_raw = median(&positive).max(f32::EPSILON);
        let suppression_floor = if self.tunables.soft_and_strict {
            percentile(&raw_points, self.tunables.soft_and_override_pctl)
        } else {
            f32::NEG_INFINITY
        };

        candidates
            .iter()
            .zip(raw_points)
            .map(|(candidate, raw)| {
                let fused = candidate.fusion_score.unwrap_or(candidate.score);
                let suppressed = self.tunables.soft_and_strict
                    && raw < suppression_floor
                    && !all_terms_hit(candidate, terms);
                let normalized = (raw / median_raw).clamp(0.0, self.tunables.clamp_kw_norm);
                let final_score = if suppressed {
                    // Suppressed candidates keep a ghost of their fused
                    // score so ordering within the suppressed band stays
                    // deterministic.
                    fused * 0.1
                } else {
                    fused + self.tunables.lambda_kw * normalized
                };
                RescoredCandidate {
                    id: candidate.id.clone(),
                    fused_score: fused,
                    raw_keyword_points: raw,
                    final_score,
                    suppressed,
                }
            })
            .collect()
    }

    /// Per-candidate raw keyword points: field-weighted, position-nudged,
    /// saturation-bounded term contributions scaled by coverage, proximity,
    /// and exclusivity.
    fn raw_points(&self, candidate: &Candidate, terms: &[TermWeight]) -> f32 {
        if terms.is_empty() || candidate.term_hits.is_empty() {
            return 0.0;
        }

        let mut sum = 0.0f32;
        let mut matched: Vec<&TermWeight> = Vec::new();

        for term in terms {
            let Some(hits) = candidate.term_hits.get(&term.term) else {
                continue;
            };
            if hits.is_empty() {
                continue;
            }
            matched.push(term);

            let mut term_points = 0.0f32;
            for hit in hits {
                let field_weight = self.field_weight(&hit.field);
                let nudge = self.position_nudge(hit);
                term_points += field_weight * nudge;
            }
            // Repeated hits saturate geometrically instead of growing
            // linearly with chunk length.
            let saturation = saturate(hits.len(), self.tunables.body_sat_c);
            sum += term.weight * term_points * saturation / hits.len() as f32;
        }

        if matched.is_empty() {
            return 0.0;
        }

        let coverage = self.coverage(terms, &matched);
        let proximity = self.proximity(candidate, terms);
        let exclusivity = self.exclusivity_penalty(&matched);

        sum * (1.0 + self.tunables.coverage_alpha * coverage)
            * (1.0 + self.tunables.proximity_beta * proximity)
            * (1.0 - self.tunables.exclusivity_gamma * exclusivity).max(0.0)
    }

    fn field_weight(&self, field: &str) -> f32 {
        match field {
            "content" | "body" => self.tunables.field_weight_body,
            "title" => self.tunables.field_weight_title,
            "header" => self.tunables.field_weight_header,
            "sectionPath" => self.tunables.field_weight_section,
            "docId" => self.tunables.field_weight_doc_id,
            _ => 1.0,
        }
    }

    fn position_nudge(&self, hit: &TermHit) -> f32 {
        match hit.positions.first() {
            Some(&first) if first < self.tunables.early_pos_tokens => self.tunables.early_pos_nudge,
            _ => 1.0,
        }
    }

    /// Fraction of the top-K query terms present in the candidate.
    fn coverage(&self, terms: &[TermWeight], matched: &[&TermWeight]) -> f32 {
        let top_k = self.tunables.top_k_coverage.min(terms.len());
        if top_k == 0 {
            return 0.0;
        }
        let matched_top = matched.iter().filter(|term| term.rank <= top_k).count();
        matched_top as f32 / top_k as f32
    }

    /// Sliding-window proximity over token positions: the best window of
    /// `prox_win` tokens is scored by how many distinct query terms it
    /// contains. A single matched term yields 0.
    fn proximity(&self, candidate: &Candidate, terms: &[TermWeight]) -> f32 {
        let mut positions: Vec<(usize, usize)> = Vec::new();
        for (term_index, term) in terms.iter().enumerate() {
            if let Some(term_positions) = candidate.token_positions.get(&term.term) {
                for &pos in term_positions {
                    positions.push((pos, term_index));
                }
            }
        }
        let distinct_terms: HashSet<usize> =
            positions.iter().map(|(_, term_index)| *term_index).collect();
        if distinct_terms.len() < 2 {
            return 0.0;
        }
        positions.sort_unstable();

        let window = self.tunables.prox_win;
        let mut best = 1usize;
        let mut start = 0usize;
        let mut in_window: HashSet<usize> = HashSet::new();
        let mut counts: Vec<usize> = vec![0; terms.len()];
        for end in 0..positions.len() {
            counts[positions[end].1] += 1;
            in_window.insert(positions[end].1);
            while positions[end].0 - positions[start].0 >= window {
                let term_index = positions[start].1;
                counts[term_index] -= 1;
                if counts[term_index] == 0 {
                    in_window.remove(&term_index);
                }
                start += 1;
            }
            best = best.max(in_window.len());
        }

        (best.saturating_sub(1)) as f32 / (distinct_terms.len() - 1) as f32
    }

    /// Domain-agnostic score multiplier: coverage, proximity, field
    /// placement, and exclusivity folded into one factor. Applied by the
    /// orchestrator when a tenant enables domainless ranking.
    pub fn domainless_multiplier(
        &self,
        candidate: &Candidate,
        terms: &[TermWeight],
        domainless: &DomainlessTunables,
    ) -> f32 {
        if terms.is_empty() || candidate.term_hits.is_empty() {
            return 1.0;
        }
        let matched: Vec<&TermWeight> = terms
            .iter()
            .filter(|term| candidate.term_hits.contains_key(&term.term))
            .collect();
        if matched.is_empty() {
            return 1.0;
        }

        let coverage = matched.len() as f32 / terms.len() as f32;
        let proximity = self.proximity(candidate, terms);
        let boosted_field = matched.iter().any(|term| {
            candidate.term_hits[&term.term]
                .iter()
                .any(|hit| hit.field == "title" || hit.field == "header")
        });
        let field_boost = if boosted_field { 1.0 } else { 0.0 };
        let exclusivity = self.exclusivity_penalty(&matched);

        (1.0 + domainless.coverage_alpha * coverage)
            * (1.0 + domainless.proximity_beta * proximity)
            * (1.0 + domainless.field_boost_delta * field_boost)
            * (1.0 - domainless.exclusivity_gamma * exclusivity).max(0.0)
    }

    /// Average corpus spread of the matched terms: terms that occur across
    /// most of the tenant corpus carry little exclusivity.
    fn exclusivity_penalty(&self, matched: &[&TermWeight]) -> f32 {
        if matched.is_empty() {
            return 0.0;
        }
        let total: f32 = matched
            .iter()
            .map(|term| self.stats.term_spread(&term.term))
            .sum();
        (total / matched.len() as f32).clamp(0.0, 1.0)
    }
}

fn all_terms_hit(candidate: &Candidate, terms: &[TermWeight]) -> bool {
    terms
        .iter()
        .all(|term| candidate.term_hits.contains_key(&term.term))
}

fn saturate(count: usize, c: f32) -> f32 {
    // Geometric partial sum: 1 + c + c^2 + ... saturates repeats.
    let c = c.clamp(0.0, 0.999);
    (1.0 - c.powi(count as i32)) / (1.0 - c)
}

fn median(values: &[f32]) -> f32 {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn percentile(values: &[f32], pctl: f32) -> f32 {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (pctl / 100.0 * (sorted.len() - 1) as f32).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
