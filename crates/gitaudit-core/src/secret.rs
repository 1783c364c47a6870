use std::collections::HashMap;
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

/// `SecretProvider.get(name, env) -> value | missing`. Implementations
/// talk to whatever backend is configured; callers never see the backend,
/// only the named lookup.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get(&self, name: &str, env: &str) -> Option<String>;
}

/// Reads secrets from process environment variables, optionally falling
/// back to a caller-declared variable name when the primary key is unset.
/// Placeholder values (containing `your_` or `_here`) are treated as
/// absent, the convention used elsewhere to detect unconfigured `.env`
/// templates.
#[derive(Debug, Default)]
pub struct EnvSecretProvider {
    overrides: HashMap<String, String>,
}

impl EnvSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// For tests: seed a value without touching process environment.
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(v) = self.overrides.get(key) {
            return Some(v.clone());
        }
        let value = env::var(key).ok()?;
        if value.is_empty() || value.contains("your_") || value.contains("_here") {
            return None;
        }
        Some(value)
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get(&self, name: &str, env_name: &str) -> Option<String> {
        let namespaced = format!("{}_{}", env_name.to_uppercase(), name.to_uppercase());
        self.lookup(&namespaced).or_else(|| self.lookup(&name.to_uppercase()))
    }
}

/// Wraps any `SecretProvider` with a bounded TTL cache keyed by (env, name),
/// default 5 minutes.
pub struct CachedSecretProvider<P: SecretProvider> {
    inner: P,
    cache: Cache<(String, String), Option<String>>,
}

impl<P: SecretProvider> CachedSecretProvider<P> {
    pub fn new(inner: P) -> Self {
        Self::with_ttl(inner, Duration::from_secs(300))
    }

    pub fn with_ttl(inner: P, ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).max_capacity(10_000).build();
        Self { inner, cache }
    }
}

#[async_trait]
impl<P: SecretProvider> SecretProvider for CachedSecretProvider<P> {
    async fn get(&self, name: &str, env: &str) -> Option<String> {
        let key = (env.to_string(), name.to_string());
        if let Some(hit) = self.cache.get(&key).await {
            return hit;
        }
        let value = self.inner.get(name, env).await;
        self.cache.insert(key, value.clone()).await;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_values_are_treated_as_missing() {
        let provider = EnvSecretProvider::new().with_override("PROD_WEBHOOK_SECRET", "your_secret_here");
        assert_eq!(provider.get("WEBHOOK_SECRET", "prod").await, None);
    }

    #[tokio::test]
    async fn configured_value_is_returned_and_cached() {
        let provider =
            CachedSecretProvider::new(EnvSecretProvider::new().with_override("PROD_WEBHOOK_SECRET", "s3cr3t-value"));
        assert_eq!(provider.get("WEBHOOK_SECRET", "prod").await.as_deref(), Some("s3cr3t-value"));
        // second call must hit the cache, not re-derive from env
        assert_eq!(provider.get("WEBHOOK_SECRET", "prod").await.as_deref(), Some("s3cr3t-value"));
    }
}
