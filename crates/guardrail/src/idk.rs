//! Structured "I don't know" responses

use serde::{Deserialize, Serialize};

use retrieval_config::{GuardrailConfig, IdkReasonCode};
use retrieval_core::Candidate;

use crate::answerability::AnswerabilityScore;

/// A short excerpt the caller may surface as "closest we found".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdkSuggestion {
    pub doc_id: String,
    pub excerpt: String,
    pub score: f32,
}

/// The structured refusal returned instead of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdkResponse {
    pub reason_code: IdkReasonCode,
    pub message: String,
    pub suggestions: Vec<IdkSuggestion>,
}

const EXCERPT_CHARS: usize = 160;

/// Build the IDK response for an unanswerable decision. The reason code is
/// keyed on what failed: nothing retrieved, scattered scores, or plain low
/// confidence.
pub fn build_idk(
    candidates: &[Candidate],
    score: &AnswerabilityScore,
    config: &GuardrailConfig,
) -> IdkResponse {
    let reason_code = if candidates.is_empty() {
        IdkReasonCode::NoRelevantDocs
    } else if score.score_stats.std_dev > config.threshold.max_std_dev {
        IdkReasonCode::AmbiguousQuery
    } else {
        IdkReasonCode::LowConfidence
    };

    let templates = &config.idk_templates;
    let suggestions = candidates
        .iter()
        .filter(|candidate| candidate.score >= templates.suggestion_threshold)
        .take(templates.max_suggestions)
        .map(|candidate| IdkSuggestion {
            doc_id: candidate.payload.doc_id.clone(),
            excerpt: excerpt_of(candidate),
            score: candidate.score,
        })
        .collect();

    IdkResponse {
        reason_code,
        message: templates.resolve(reason_code),
        suggestions,
    }
}

fn excerpt_of(candidate: &Candidate) -> String {
    let content = candidate
        .content
        .as_deref()
        .or(candidate.payload.title.as_deref())
        .unwrap_or("");
    let mut excerpt: String = content.chars().take(EXCERPT_CHARS).collect();
    if content.chars().count() > EXCERPT_CHARS {
        excerpt.push('…');
    }
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrieval_config::GuardrailConfig;
    use retrieval_core::DocumentMetadata;

    use crate::source_aware::StageInputs;

    fn unanswerable_score(final_scores: &[f32]) -> AnswerabilityScore {
        AnswerabilityScore::compute(
            final_scores,
            &StageInputs {
                vector: Some(final_scores.to_vec()),
                ..Default::default()
            },
            &GuardrailConfig::for_tenant("acme"),
            0.3,
            0.8,
        )
    }

    fn candidate(doc_id: &str, score: f32, content: &str) -> Candidate {
        let mut candidate = Candidate::new(
            format!("{doc_id}-chunk"),
            score,
            DocumentMetadata {
                doc_id: doc_id.to_string(),
                ..Default::default()
            },
        );
        candidate.content = Some(content.to_string());
        candidate
    }

    #[test]
    fn test_empty_candidates_select_no_relevant_docs() {
        let idk = build_idk(
            &[],
            &unanswerable_score(&[]),
            &GuardrailConfig::for_tenant("acme"),
        );
        assert_eq!(idk.reason_code, IdkReasonCode::NoRelevantDocs);
        assert!(idk.suggestions.is_empty());
        assert!(!idk.message.is_empty());
    }

    #[test]
    fn test_scattered_scores_select_ambiguous() {
        let mut config = GuardrailConfig::for_tenant("acme");
        config.threshold.max_std_dev = 0.05;
        let idk = build_idk(
            &[candidate("d1", 0.9, "a"), candidate("d2", 0.1, "b")],
            &unanswerable_score(&[0.9, 0.1]),
            &config,
        );
        assert_eq!(idk.reason_code, IdkReasonCode::AmbiguousQuery);
    }

    #[test]
    fn test_low_scores_select_low_confidence() {
        let idk = build_idk(
            &[candidate("d1", 0.2, "weak match")],
            &unanswerable_score(&[0.2]),
            &GuardrailConfig::for_tenant("acme"),
        );
        assert_eq!(idk.reason_code, IdkReasonCode::LowConfidence);
    }

    #[test]
    fn test_suggestions_respect_threshold_and_cap() {
        let mut config = GuardrailConfig::for_tenant("acme");
        config.idk_templates.max_suggestions = 2;
        config.idk_templates.suggestion_threshold = 0.3;
        let candidates = vec![
            candidate("d1", 0.6, "strong"),
            candidate("d2", 0.5, "good"),
            candidate("d3", 0.4, "okay"),
            candidate("d4", 0.1, "too weak"),
        ];
        let idk = build_idk(&candidates, &unanswerable_score(&[0.6, 0.5, 0.4, 0.1]), &config);
        assert_eq!(idk.suggestions.len(), 2);
        assert_eq!(idk.suggestions[0].doc_id, "d1");
        assert!(idk.suggestions.iter().all(|s| s.score >= 0.3));
    }

    #[test]
    fn test_excerpts_are_bounded() {
        let long = "word ".repeat(100);
        let idk = build_idk(
            &[candidate("d1", 0.5, &long)],
            &unanswerable_score(&[0.5]),
            &GuardrailConfig::for_tenant("acme"),
        );
        assert!(idk.suggestions[0].excerpt.chars().count() <= EXCERPT_CHARS + 1);
        assert!(idk.suggestions[0].excerpt.ends_with('…'));
    }

    #[test]
    fn test_custom_template_is_used() {
        let mut config = GuardrailConfig::for_tenant("acme");
        config.idk_templates.templates.insert(
            "NO_RELEVANT_DOCS".to_string(),
            "Nothing in the library matches.".to_string(),
        );
        let idk = build_idk(&[], &unanswerable_score(&[]), &config);
        assert_eq!(idk.message, "Nothing in the library matches.");
    }
}
