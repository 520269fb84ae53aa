//! Scroll-store lexical search adapter

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use retrieval_config::Tunables;
use retrieval_core::{
    Candidate, Condition, DocumentMetadata, Filter, LexicalStore, Result, ScrollPoint,
    ScrollRequest, SearchType, TermHit, TermMatchKind,
};

use crate::tokenize::{tokenize_query, tokenize_text, within_edit_distance_one};

/// Fields fanned out into per-term `should` text-match conditions.
const SHOULD_FIELDS: [&str; 5] = ["content", "title", "docId", "header", "sectionPath"];

/// Composite scoring weights: `content + 3×title + 5×docId + 3×path`.
const CONTENT_WEIGHT: f32 = 1.0;
const TITLE_WEIGHT: f32 = 3.0;
const DOC_ID_WEIGHT: f32 = 5.0;
const PATH_WEIGHT: f32 = 3.0;

/// Exact whole-word matches count triple against sub-token matches.
const EXACT_MULTIPLIER: f32 = 3.0;
const HIGH_VALUE_MULTIPLIER: f32 = 5.0;
const LONG_TOKEN_MULTIPLIER: f32 = 2.0;
const LONG_TOKEN_LEN: usize = 6;
const FULL_COVERAGE_MULTIPLIER: f32 = 5.0;
const SCORE_CEILING: f32 = 10.0;
const MIN_DOC_LENGTH: f32 = 50.0;

/// One lexical search call.
#[derive(Debug, Clone)]
pub struct LexicalSearchRequest {
    pub query: String,
    pub limit: usize,
    /// RBAC conjunction, always present
    pub rbac: Filter,
    /// Request filter; only its `must` clauses conjoin
    pub user_filter: Option<Filter>,
    /// Widens the over-fetch window
    pub domainless: bool,
    /// Tenant override for the high-value token list
    pub high_value_tokens: Option<Vec<String>>,
}

/// Wraps a scroll-capable store as a scored top-K keyword search.
pub struct LexicalSearchAdapter {
    store: Arc<dyn LexicalStore>,
    over_fetch: usize,
    over_fetch_domainless: usize,
    default_high_value: Vec<String>,
}

impl LexicalSearchAdapter {
    pub fn new(store: Arc<dyn LexicalStore>, tunables: &Tunables) -> Self {
        Self {
            store,
            over_fetch: tunables.lexical_over_fetch,
            over_fetch_domainless: tunables.lexical_over_fetch_domainless,
            default_high_value: tunables.high_value_tokens.clone(),
        }
    }

    /// Run a lexical search. Returns candidates sorted descending by
    /// keyword score, at most `limit`, each carrying term hits and token
    /// positions for downstream rescoring.
    pub async fn search(
        &self,
        collection: &str,
        request: LexicalSearchRequest,
    ) -> Result<Vec<Candidate>> {
        let terms = tokenize_query(&request.query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let filter = self.build_filter(&request, &terms);
        let over_fetch = if request.domainless {
            self.over_fetch_domainless
        } else {
            self.over_fetch
        };

        let points = self
            .store
            .scroll(
                collection,
                ScrollRequest {
                    filter,
                    limit: over_fetch,
                    with_payload: true,
                },
            )
            .await?;

        let high_value: HashSet<&str> = request
            .high_value_tokens
            .as_deref()
            .unwrap_or(&self.default_high_value)
            .iter()
            .map(|token| token.as_str())
            .collect();

        let mut candidates: Vec<Candidate> = points
            .iter()
            .filter_map(|point| self.score_point(point, &terms, &high_value))
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(request.limit);

        tracing::debug!(
            collection,
            terms = terms.len(),
            scrolled = points.len(),
            returned = candidates.len(),
            "lexical search complete"
        );
        Ok(candidates)
    }

    fn build_filter(&self, request: &LexicalSearchRequest, terms: &[String]) -> Filter {
        let mut filter = request.rbac.clone();
        if let Some(user_filter) = &request.user_filter {
            filter.must.extend(user_filter.must.iter().cloned());
        }
        for term in terms {
            for field in SHOULD_FIELDS {
                filter = filter.should(Condition::text_match(field, term.clone()));
            }
        }
        filter
    }

    /// Composite scoring over the weighted field concatenation, emitting
    /// term hits and token positions. Documents with zero matched terms
    /// drop out.
    fn score_point(
        &self,
        point: &ScrollPoint,
        terms: &[String],
        high_value: &HashSet<&str>,
    ) -> Option<Candidate> {
        let meta = DocumentMetadata::from_payload(&point.payload);
        let content = point.content.as_deref().unwrap_or("");

        let content_words = tokenize_text(content);
        let title_words = tokenize_text(meta.title.as_deref().unwrap_or(""));
        let doc_id_words = tokenize_text(&meta.doc_id);
        let path_words = tokenize_text(meta.path.as_deref().unwrap_or(""));
        let header_words = tokenize_text(meta.header.as_deref().unwrap_or(""));
        let section_words = tokenize_text(meta.section_path.as_deref().unwrap_or(""));

        let composite_length = content_words.len() as f32 * CONTENT_WEIGHT
            + title_words.len() as f32 * TITLE_WEIGHT
            + doc_id_words.len() as f32 * DOC_ID_WEIGHT
            + path_words.len() as f32 * PATH_WEIGHT;
        let length_norm = composite_length.max(MIN_DOC_LENGTH);

        let mut score = 0.0f32;
        let mut matched_terms = 0usize;
        let mut term_hits: HashMap<String, Vec<TermHit>> = HashMap::new();
        let mut token_positions: HashMap<String, Vec<usize>> = HashMap::new();

        for term in terms {
            let mut exact_weighted = 0.0f32;
            let mut sub_weighted = 0.0f32;
            let mut hits: Vec<TermHit> = Vec::new();
            let mut positions: Vec<usize> = Vec::new();

            // Content carries positions; the other fields only record hits.
            let content_counts =
                field_matches(&content_words, term, Some(&mut positions));
            if content_counts.any() {
                hits.push(content_counts.to_hit("content", positions.clone()));
                exact_weighted += content_counts.exact as f32 * CONTENT_WEIGHT;
                sub_weighted += content_counts.sub_and_fuzzy() as f32 * CONTENT_WEIGHT;
            }

            for (field, words, weight) in [
                ("title", &title_words, TITLE_WEIGHT),
                ("docId", &doc_id_words, DOC_ID_WEIGHT),
                ("path", &path_words, PATH_WEIGHT),
            ] {
                let counts = field_matches(words, term, None);
                if counts.any() {
                    hits.push(counts.to_hit(field, Vec::new()));
                    exact_weighted += counts.exact as f32 * weight;
                    sub_weighted += counts.sub_and_fuzzy() as f32 * weight;
                }
            }

            // Header and section path contribute hit records for the
            // rescorer but not to the composite score.
            for (field, words) in [("header", &header_words), ("sectionPath", &section_words)] {
                let counts = field_matches(words, term, None);
                if counts.any() {
                    hits.push(counts.to_hit(field, Vec::new()));
                }
            }

            if hits.is_empty() {
                continue;
            }
            matched_terms += 1;

            let mut term_points =
                (EXACT_MULTIPLIER * exact_weighted + sub_weighted) / length_norm;
            if high_value.contains(term.as_str()) {
                term_points *= HIGH_VALUE_MULTIPLIER;
            } else if term.len() >= LONG_TOKEN_LEN {
                term_points *= LONG_TOKEN_MULTIPLIER;
            }
            score += term_points;

            term_hits.insert(term.clone(), hits);
            if !positions.is_empty() {
                token_positions.insert(term.clone(), positions);
            }
        }

        if matched_terms == 0 {
            return None;
        }
        if matched_terms == terms.len() {
            score *= FULL_COVERAGE_MULTIPLIER;
        }
        let score = score.clamp(0.0, SCORE_CEILING);

        let mut candidate = Candidate::new(point.id.clone(), score, meta)
            .with_search_type(SearchType::KeywordOnly);
        if !content.is_empty() {
            candidate.content = Some(content.to_string());
        }
        candidate.keyword_score = Some(score);
        candidate.term_hits = term_hits;
        candidate.token_positions = token_positions;
        Some(candidate)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct MatchCounts {
    exact: usize,
    fuzzy: usize,
    sub: usize,
}

impl MatchCounts {
    fn any(&self) -> bool {
        self.exact + self.fuzzy + self.sub > 0
    }

    fn sub_and_fuzzy(&self) -> usize {
        self.fuzzy + self.sub
    }

    /// Dominant kind for the hit record: exact beats fuzzy beats lemma.
    fn to_hit(&self, field: &str, positions: Vec<usize>) -> TermHit {
        let match_kind = if self.exact > 0 {
            TermMatchKind::Exact
        } else if self.fuzzy > 0 {
            TermMatchKind::Fuzzy
        } else {
            TermMatchKind::Lemma
        };
        TermHit {
            field: field.to_string(),
            match_kind,
            positions,
        }
    }
}

/// Count exact, fuzzy, and sub-token matches of `term` against the words
/// of one field, optionally recording word indices.
fn field_matches(
    words: &[String],
    term: &str,
    mut positions: Option<&mut Vec<usize>>,
) -> MatchCounts {
    let mut counts = MatchCounts::default();
    for (index, word) in words.iter().enumerate() {
        let matched = if word == term {
            counts.exact += 1;
            true
        } else if within_edit_distance_one(word, term) {
            counts.fuzzy += 1;
            true
        } else if word.contains(term) {
            counts.sub += 1;
            true
        } else {
            false
        };
        if matched {
            if let Some(positions) = positions.as_mut() {
                positions.push(index);
            }
        }
    }
    counts
}
