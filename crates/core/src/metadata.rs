//! Document metadata: the authoritative source for access decisions
//!
//! Payloads arrive from the stores as loose JSON maps. `DocumentMetadata`
//! is a typed view over the keys the engine cares about; unknown keys are
//! preserved untouched so downstream consumers see the full payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::principal::Principal;

/// Typed view over a candidate payload. Never mutated by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Owning tenant
    #[serde(default)]
    pub tenant: String,
    /// Logical document this chunk belongs to
    #[serde(rename = "docId", default)]
    pub doc_id: String,
    /// Access control list: principal ids, group ids, or `public`
    #[serde(default)]
    pub acl: Vec<String>,
    /// Document language, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Structural section path (`block_<N>` or `block_<N>/part_<M>`)
    #[serde(rename = "sectionPath", skip_serializing_if = "Option::is_none")]
    pub section_path: Option<String>,
    /// Document title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Section header text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Source path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Ingestion timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    /// Keys the engine does not interpret, carried through verbatim
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl DocumentMetadata {
    /// Build metadata from a raw payload map. Missing keys default; keys
    /// the engine does not model land in `extra`.
    pub fn from_payload(payload: &HashMap<String, Value>) -> Self {
        let as_value = Value::Object(payload.clone().into_iter().collect());
        serde_json::from_value(as_value).unwrap_or_default()
    }

    /// Convert back into a raw payload map, preserving unknown keys.
    pub fn to_payload(&self) -> HashMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    /// RBAC check: same tenant and a non-empty intersection between the
    /// document ACL and the principal's identities (groups, id, `public`).
    pub fn grants_access(&self, principal: &Principal) -> bool {
        if self.tenant != principal.tenant {
            return false;
        }
        let identities = principal.access_identities();
        self.acl.iter().any(|entry| identities.contains(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(entries: &[(&str, Value)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_from_payload_reads_known_keys() {
        let meta = DocumentMetadata::from_payload(&payload(&[
            ("tenant", json!("acme")),
            ("docId", json!("d1")),
            ("acl", json!(["eng", "public"])),
            ("sectionPath", json!("block_3/part_1")),
            ("custom", json!(42)),
        ]));

        assert_eq!(meta.tenant, "acme");
        assert_eq!(meta.doc_id, "d1");
        assert_eq!(meta.acl, vec!["eng", "public"]);
        assert_eq!(meta.section_path.as_deref(), Some("block_3/part_1"));
        assert_eq!(meta.extra.get("custom"), Some(&json!(42)));
    }

    #[test]
    fn test_round_trip_preserves_unknown_keys() {
        let original = payload(&[
            ("tenant", json!("acme")),
            ("docId", json!("d1")),
            ("acl", json!(["public"])),
            ("ingest_batch", json!("b-77")),
        ]);
        let round_tripped = DocumentMetadata::from_payload(&original).to_payload();
        assert_eq!(round_tripped.get("ingest_batch"), Some(&json!("b-77")));
        assert_eq!(round_tripped.get("tenant"), Some(&json!("acme")));
    }

    #[test]
    fn test_grants_access_requires_same_tenant() {
        let meta = DocumentMetadata {
            tenant: "acme".to_string(),
            acl: vec!["public".to_string()],
            ..Default::default()
        };
        assert!(meta.grants_access(&Principal::new("u1", "acme")));
        assert!(!meta.grants_access(&Principal::new("u1", "other")));
    }

    #[test]
    fn test_grants_access_intersects_acl() {
        let meta = DocumentMetadata {
            tenant: "acme".to_string(),
            acl: vec!["eng".to_string()],
            ..Default::default()
        };
        assert!(meta.grants_access(&Principal::new("u1", "acme").with_group("eng")));
        assert!(!meta.grants_access(&Principal::new("u1", "acme").with_group("sales")));
    }

    #[test]
    fn test_grants_access_matches_principal_id() {
        let meta = DocumentMetadata {
            tenant: "acme".to_string(),
            acl: vec!["u1".to_string()],
            ..Default::default()
        };
        assert!(meta.grants_access(&Principal::new("u1", "acme")));
    }
}
