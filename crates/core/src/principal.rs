//! Principal: the authenticated requester and their tenancy

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// The authenticated requester. Immutable per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User identifier
    pub id: String,
    /// Tenant the principal belongs to
    pub tenant: String,
    /// Group memberships used for ACL intersection
    #[serde(default)]
    pub groups: Vec<String>,
    /// Preferred language (BCP-47-ish tag), used for relevance nudging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Principal {
    /// Create a new principal.
    pub fn new(id: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant: tenant.into(),
            groups: Vec::new(),
            language: None,
        }
    }

    /// Add a group membership.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Set the preferred language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Structural validation: a usable principal names a tenant and an id.
    ///
    /// This is the narrow authorization precondition for every retrieve
    /// operation; it fails with `Unauthorized` before any upstream call.
    pub fn validate(&self) -> Result<()> {
        if self.tenant.is_empty() {
            return Err(RetrievalError::Unauthorized(
                "principal has no tenant".to_string(),
            ));
        }
        if self.id.is_empty() {
            return Err(RetrievalError::Unauthorized(
                "principal has no id".to_string(),
            ));
        }
        Ok(())
    }

    /// Identity set used for ACL intersection: groups plus the principal id
    /// plus the `public` marker.
    pub fn access_identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.groups.clone();
        ids.push(self.id.clone());
        ids.push("public".to_string());
        ids
    }

    /// Whether the principal belongs to the guardrail bypass set.
    ///
    /// Admins are group members of `admin` or `system`, or ids containing
    /// `admin`.
    pub fn is_admin(&self) -> bool {
        self.groups.iter().any(|g| g == "admin" || g == "system") || self.id.contains("admin")
    }
}
