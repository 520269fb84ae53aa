//! Store filter predicates
//!
//! Both store capabilities accept the same filter shape: a conjunction of
//! `must` conditions, a disjunction of `should` conditions, and `must_not`
//! exclusions. Adapters translate this into their native query language.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::DocumentMetadata;
use crate::principal::Principal;

/// A single field predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Field equals the value exactly
    MatchValue { field: String, value: Value },
    /// Field (scalar or array) intersects any of the values
    MatchAny { field: String, values: Vec<String> },
    /// Field contains the text (case-insensitive substring)
    TextMatch { field: String, text: String },
}

impl Condition {
    pub fn match_value(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::MatchValue {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn match_any(field: impl Into<String>, values: Vec<String>) -> Self {
        Condition::MatchAny {
            field: field.into(),
            values,
        }
    }

    pub fn text_match(field: impl Into<String>, text: impl Into<String>) -> Self {
        Condition::TextMatch {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Evaluate the condition against a payload. Used by in-memory stores
    /// and by the post-retrieval defense-in-depth check.
    pub fn matches(&self, meta: &DocumentMetadata) -> bool {
        match self {
            Condition::MatchValue { field, value } => {
                field_values(meta, field).iter().any(|v| v == value)
            }
            Condition::MatchAny { field, values } => field_values(meta, field)
                .iter()
                .filter_map(|v| v.as_str())
                .any(|v| values.iter().any(|wanted| wanted == v)),
            Condition::TextMatch { field, text } => {
                let needle = text.to_lowercase();
                field_values(meta, field)
                    .iter()
                    .filter_map(|v| v.as_str())
                    .any(|v| v.to_lowercase().contains(&needle))
            }
        }
    }
}

/// Values a field resolves to within a payload. Array fields expand to
/// their elements so `MatchAny` can intersect them.
fn field_values(meta: &DocumentMetadata, field: &str) -> Vec<Value> {
    match field {
        "tenant" => vec![Value::String(meta.tenant.clone())],
        "docId" => vec![Value::String(meta.doc_id.clone())],
        "acl" => meta.acl.iter().cloned().map(Value::String).collect(),
        "lang" => meta.lang.iter().cloned().map(Value::String).collect(),
        "sectionPath" => meta
            .section_path
            .iter()
            .cloned()
            .map(Value::String)
            .collect(),
        "title" => meta.title.iter().cloned().map(Value::String).collect(),
        "header" => meta.header.iter().cloned().map(Value::String).collect(),
        "path" => meta.path.iter().cloned().map(Value::String).collect(),
        other => meta.extra.get(other).cloned().into_iter().collect(),
    }
}

/// A composable store filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// All must hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Condition>,
    /// At least one should hold (when non-empty)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Condition>,
    /// None may hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, condition: Condition) -> Self {
        self.must.push(condition);
        self
    }

    pub fn should(mut self, condition: Condition) -> Self {
        self.should.push(condition);
        self
    }

    pub fn must_not(mut self, condition: Condition) -> Self {
        self.must_not.push(condition);
        self
    }

    /// Conjoin another filter: musts and must-nots concatenate, shoulds
    /// concatenate (the disjunction widens).
    pub fn and(mut self, other: Filter) -> Self {
        self.must.extend(other.must);
        self.should.extend(other.should);
        self.must_not.extend(other.must_not);
        self
    }

    /// Evaluate the filter against a payload.
    pub fn matches(&self, meta: &DocumentMetadata) -> bool {
        if !self.must.iter().all(|c| c.matches(meta)) {
            return false;
        }
        if !self.should.is_empty() && !self.should.iter().any(|c| c.matches(meta)) {
            return false;
        }
        self.must_not.iter().all(|c| !c.matches(meta))
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }
}

/// Build the RBAC predicate for a principal:
/// `tenant == principal.tenant ∧ acl ∩ (groups ∪ {id, "public"}) ≠ ∅`.
pub fn rbac_filter(principal: &Principal) -> Filter {
    Filter::new()
        .must(Condition::match_value("tenant", principal.tenant.clone()))
        .must(Condition::match_any("acl", principal.access_identities()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(tenant: &str, acl: &[&str]) -> DocumentMetadata {
        DocumentMetadata {
            tenant: tenant.to_string(),
            acl: acl.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_rbac_filter_matches_public_doc() {
        let principal = Principal::new("u1", "acme");
        let filter = rbac_filter(&principal);
        assert!(filter.matches(&meta("acme", &["public"])));
        assert!(!filter.matches(&meta("acme", &["eng"])));
        assert!(!filter.matches(&meta("other", &["public"])));
    }

    #[test]
    fn test_rbac_filter_matches_group_doc() {
        let principal = Principal::new("u1", "acme").with_group("eng");
        let filter = rbac_filter(&principal);
        assert!(filter.matches(&meta("acme", &["eng"])));
    }

    #[test]
    fn test_text_match_is_case_insensitive() {
        let mut doc = meta("acme", &["public"]);
        doc.title = Some("Quarterly Report".to_string());
        let condition = Condition::text_match("title", "quarterly");
        assert!(condition.matches(&doc));
    }

    #[test]
    fn test_should_requires_one_hit_when_present() {
        let filter = Filter::new()
            .should(Condition::text_match("title", "alpha"))
            .should(Condition::text_match("title", "beta"));
        let mut doc = meta("acme", &["public"]);
        doc.title = Some("gamma".to_string());
        assert!(!filter.matches(&doc));
        doc.title = Some("beta release".to_string());
        assert!(filter.matches(&doc));
    }

    #[test]
    fn test_and_conjoins_musts() {
        let left = Filter::new().must(Condition::match_value("tenant", "acme"));
        let right = Filter::new().must(Condition::match_value("docId", "d1"));
        let combined = left.and(right);
        assert_eq!(combined.must.len(), 2);
    }

    #[test]
    fn test_extra_field_lookup() {
        let mut doc = meta("acme", &["public"]);
        doc.extra.insert("category".to_string(), json!("faq"));
        assert!(Condition::match_value("category", "faq").matches(&doc));
    }
}
