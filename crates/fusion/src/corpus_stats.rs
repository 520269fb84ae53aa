//! Tenant corpus statistics
//!
//! The keyword-points rescorer needs document frequencies for IDF term
//! weighting and corpus spread for the exclusivity penalty. Statistics are
//! tenant-scoped, read-only within a request, and cached with a TTL.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Corpus statistics provider.
pub trait CorpusStats: Send + Sync {
    /// Total documents in the tenant corpus.
    fn doc_count(&self) -> usize;

    /// Documents containing the term.
    fn term_doc_count(&self, term: &str) -> usize;

    /// Fraction of the corpus containing the term, in [0, 1]. Broadly
    /// spread terms earn the exclusivity penalty.
    fn term_spread(&self, term: &str) -> f32 {
        let docs = self.doc_count();
        if docs == 0 {
            return 0.0;
        }
        (self.term_doc_count(term) as f32 / docs as f32).clamp(0.0, 1.0)
    }

    /// Smoothed inverse document frequency.
    fn idf(&self, term: &str) -> f32 {
        let n = self.doc_count() as f32;
        let df = self.term_doc_count(term) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln().max(0.0)
    }
}

/// Statistics for a corpus nothing is known about: every term is equally
/// informative and nothing is penalized for spread.
#[derive(Debug, Clone, Default)]
pub struct UniformCorpusStats;

impl CorpusStats for UniformCorpusStats {
    fn doc_count(&self) -> usize {
        0
    }

    fn term_doc_count(&self, _term: &str) -> usize {
        0
    }

    fn term_spread(&self, _term: &str) -> f32 {
        0.0
    }

    fn idf(&self, _term: &str) -> f32 {
        1.0
    }
}

/// In-memory statistics built from term -> document-count tables. Hosts
/// refresh these from their index; tests build them directly.
#[derive(Debug, Clone, Default)]
pub struct TableCorpusStats {
    doc_count: usize,
    term_doc_counts: HashMap<String, usize>,
}

impl TableCorpusStats {
    pub fn new(doc_count: usize) -> Self {
        Self {
            doc_count,
            term_doc_counts: HashMap::new(),
        }
    }

    pub fn with_term(mut self, term: impl Into<String>, doc_count: usize) -> Self {
        self.term_doc_counts.insert(term.into(), doc_count);
        self
    }
}

impl CorpusStats for TableCorpusStats {
    fn doc_count(&self) -> usize {
        self.doc_count
    }

    fn term_doc_count(&self, term: &str) -> usize {
        self.term_doc_counts.get(term).copied().unwrap_or(0)
    }
}

struct CachedTerm {
    idf: f32,
    spread: f32,
    cached_at: DateTime<Utc>,
}

/// TTL-caching decorator over an inner provider. Per-term lookups hit the
/// inner provider once per TTL window.
pub struct CachedCorpusStats<S> {
    inner: S,
    ttl: Duration,
    terms: RwLock<HashMap<String, CachedTerm>>,
}

impl<S: CorpusStats> CachedCorpusStats<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            terms: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, term: &str) -> Option<(f32, f32)> {
        let terms = self.terms.read();
        let entry = terms.get(term)?;
        let age = Utc::now().signed_duration_since(entry.cached_at);
        if age.to_std().map(|age| age < self.ttl).unwrap_or(false) {
            Some((entry.idf, entry.spread))
        } else {
            None
        }
    }

    fn refresh(&self, term: &str) -> (f32, f32) {
        let idf = self.inner.idf(term);
        let spread = self.inner.term_spread(term);
        self.terms.write().insert(
            term.to_string(),
            CachedTerm {
                idf,
                spread,
                cached_at: Utc::now(),
            },
        );
        (idf, spread)
    }
}

impl<S: CorpusStats> CorpusStats for CachedCorpusStats<S> {
    fn doc_count(&self) -> usize {
        self.inner.doc_count()
    }

    fn term_doc_count(&self, term: &str) -> usize {
        self.inner.term_doc_count(term)
    }

    fn term_spread(&self, term: &str) -> f32 {
        match self.cached(term) {
            Some((_, spread)) => spread,
            None => self.refresh(term).1,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        match self.cached(term) {
            Some((idf, _)) => idf,
            None => self.refresh(term).0,
        }
    }
}
