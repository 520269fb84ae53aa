//! Tenant config registry
//!
//! A caching wrapper owning an inner `ConfigSource` through a narrow
//! interface. Entries are cached per tenant with a TTL; explicit updates
//! validate, write through, and eagerly invalidate the cached entry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use retrieval_core::Result;

use crate::guardrail::GuardrailConfig;
use crate::search::SearchConfig;
use crate::tunables::Tunables;

/// Backing source for tenant config documents. Hosts implement this over
/// their config store; `None` means the tenant has no stored document and
/// defaults apply.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn load_search_config(&self, tenant_id: &str) -> Result<Option<SearchConfig>>;
    async fn load_guardrail_config(&self, tenant_id: &str) -> Result<Option<GuardrailConfig>>;
    async fn store_search_config(&self, config: &SearchConfig) -> Result<()>;
    async fn store_guardrail_config(&self, config: &GuardrailConfig) -> Result<()>;
}

/// In-memory source, used by tests and by hosts that push configs at boot.
#[derive(Default)]
pub struct StaticConfigSource {
    search: DashMap<String, SearchConfig>,
    guardrail: DashMap<String, GuardrailConfig>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_config(self, config: SearchConfig) -> Self {
        self.search.insert(config.tenant_id.clone(), config);
        self
    }

    pub fn with_guardrail_config(self, config: GuardrailConfig) -> Self {
        self.guardrail.insert(config.tenant_id.clone(), config);
        self
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn load_search_config(&self, tenant_id: &str) -> Result<Option<SearchConfig>> {
        Ok(self.search.get(tenant_id).map(|entry| entry.clone()))
    }

    async fn load_guardrail_config(&self, tenant_id: &str) -> Result<Option<GuardrailConfig>> {
        Ok(self.guardrail.get(tenant_id).map(|entry| entry.clone()))
    }

    async fn store_search_config(&self, config: &SearchConfig) -> Result<()> {
        self.search.insert(config.tenant_id.clone(), config.clone());
        Ok(())
    }

    async fn store_guardrail_config(&self, config: &GuardrailConfig) -> Result<()> {
        self.guardrail
            .insert(config.tenant_id.clone(), config.clone());
        Ok(())
    }
}

#[derive(Clone)]
struct CachedEntry<T> {
    value: T,
    loaded_at: DateTime<Utc>,
}

impl<T: Clone> CachedEntry<T> {
    fn fresh(value: T) -> Self {
        Self {
            value,
            loaded_at: Utc::now(),
        }
    }

    fn is_live(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.loaded_at);
        age.to_std().map(|age| age < ttl).unwrap_or(false)
    }
}

/// Process-wide tenant config registry.
pub struct ConfigRegistry {
    source: Arc<dyn ConfigSource>,
    search_cache: DashMap<String, CachedEntry<SearchConfig>>,
    guardrail_cache: DashMap<String, CachedEntry<GuardrailConfig>>,
    search_ttl: Duration,
    guardrail_ttl: Duration,
}

impl ConfigRegistry {
    pub fn new(source: Arc<dyn ConfigSource>, tunables: &Tunables) -> Self {
        Self {
            source,
            search_cache: DashMap::new(),
            guardrail_cache: DashMap::new(),
            search_ttl: Duration::from_secs(tunables.search_cache_ttl_secs),
            guardrail_ttl: Duration::from_secs(tunables.guardrail_cache_ttl_secs),
        }
    }

    /// Registry over an empty in-memory source; every tenant resolves to
    /// defaults until configs are pushed.
    pub fn in_memory(tunables: &Tunables) -> Self {
        Self::new(Arc::new(StaticConfigSource::new()), tunables)
    }

    /// Resolve a tenant's search config, loading on cache miss. Tenants
    /// without a stored document get the defaults.
    pub async fn search_config(&self, tenant_id: &str) -> Result<SearchConfig> {
        if let Some(entry) = self.search_cache.get(tenant_id) {
            if entry.is_live(self.search_ttl) {
                return Ok(entry.value.clone());
            }
        }
        let loaded = self
            .source
            .load_search_config(tenant_id)
            .await?
            .unwrap_or_else(|| SearchConfig::for_tenant(tenant_id));
        self.search_cache
            .insert(tenant_id.to_string(), CachedEntry::fresh(loaded.clone()));
        Ok(loaded)
    }

    /// Resolve a tenant's guardrail config, loading on cache miss.
    pub async fn guardrail_config(&self, tenant_id: &str) -> Result<GuardrailConfig> {
        if let Some(entry) = self.guardrail_cache.get(tenant_id) {
            if entry.is_live(self.guardrail_ttl) {
                return Ok(entry.value.clone());
            }
        }
        let loaded = self
            .source
            .load_guardrail_config(tenant_id)
            .await?
            .unwrap_or_else(|| GuardrailConfig::for_tenant(tenant_id));
        self.guardrail_cache
            .insert(tenant_id.to_string(), CachedEntry::fresh(loaded.clone()));
        Ok(loaded)
    }

    /// Validate and persist a search config; the cached entry is replaced
    /// eagerly. Invalid documents leave the existing config untouched.
    pub async fn update_search_config(&self, config: SearchConfig) -> Result<()> {
        config.validate()?;
        self.source.store_search_config(&config).await?;
        tracing::info!(tenant = %config.tenant_id, "search config updated");
        self.search_cache
            .insert(config.tenant_id.clone(), CachedEntry::fresh(config));
        Ok(())
    }

    /// Validate and persist a guardrail config with eager invalidation.
    pub async fn update_guardrail_config(&self, config: GuardrailConfig) -> Result<()> {
        config.validate()?;
        self.source.store_guardrail_config(&config).await?;
        tracing::info!(tenant = %config.tenant_id, "guardrail config updated");
        self.guardrail_cache
            .insert(config.tenant_id.clone(), CachedEntry::fresh(config));
        Ok(())
    }

    /// Drop cached entries for a tenant.
    pub fn invalidate(&self, tenant_id: &str) {
        self.search_cache.remove(tenant_id);
        self.guardrail_cache.remove(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::ThresholdPreset;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::in_memory(&Tunables::reference())
    }

    #[tokio::test]
    async fn test_unknown_tenant_resolves_to_defaults() {
        let registry = registry();
        let config = registry.search_config("acme").await.unwrap();
        assert_eq!(config.tenant_id, "acme");
        assert!((config.vector_weight - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_update_is_observed_immediately() {
        let registry = registry();
        let _ = registry.search_config("acme").await.unwrap();

        let mut updated = SearchConfig::for_tenant("acme");
        updated.vector_weight = 0.9;
        updated.keyword_weight = 0.1;
        registry.update_search_config(updated).await.unwrap();

        let resolved = registry.search_config("acme").await.unwrap();
        assert!((resolved.vector_weight - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_invalid_update_retains_existing_config() {
        let registry = registry();
        let mut bad = SearchConfig::for_tenant("acme");
        bad.vector_weight = f32::NAN;
        assert!(registry.update_search_config(bad).await.is_err());

        let resolved = registry.search_config("acme").await.unwrap();
        assert!((resolved.vector_weight - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_guardrail_preset_round_trip() {
        let registry = registry();
        let config = GuardrailConfig::for_tenant("acme").with_preset(ThresholdPreset::Strict);
        registry.update_guardrail_config(config).await.unwrap();

        let resolved = registry.guardrail_config("acme").await.unwrap();
        assert_eq!(resolved.preset, ThresholdPreset::Strict);
        assert!((resolved.threshold.min_confidence - 0.6).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let registry = registry();
        let _ = registry.guardrail_config("acme").await.unwrap();
        registry.invalidate("acme");
        assert!(registry.guardrail_cache.get("acme").is_none());
    }
}
