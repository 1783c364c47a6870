//! Session lifecycle: `createSession` evicts the oldest active sessions
//! for a user once the concurrent-session limit is reached;
//! `validateSession` checks a moka cache keyed by token hash before
//! falling through to the store, matching the cache-then-backend
//! shape `CachedSecretProvider` uses in `gitaudit-core`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gitaudit_core::{Fingerprint, GitopsError, GitopsResult};
use gitaudit_store::{Session, Store};
use moka::future::Cache;
use uuid::Uuid;

pub const DEFAULT_CONCURRENT_SESSION_LIMIT: usize = 5;
const VALIDATION_CACHE_TTL: Duration = Duration::from_secs(30);
const VALIDATION_CACHE_CAPACITY: u64 = 10_000;

pub fn hash_token(token: &str) -> String {
    Fingerprint::of(token.as_bytes()).to_hex()
}

pub struct SessionManager {
    store: Arc<dyn Store>,
    concurrent_limit: usize,
    validation_cache: Cache<String, Option<Session>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_concurrent_limit(store, DEFAULT_CONCURRENT_SESSION_LIMIT)
    }

    pub fn with_concurrent_limit(store: Arc<dyn Store>, concurrent_limit: usize) -> Self {
        let validation_cache = Cache::builder()
            .time_to_live(VALIDATION_CACHE_TTL)
            .max_capacity(VALIDATION_CACHE_CAPACITY)
            .build();
        Self { store, concurrent_limit, validation_cache }
    }

    /// Evicts the oldest active sessions for `user_id` until fewer than
    /// `concurrent_limit` remain, then inserts the new one.
    pub async fn create_session(&self, user_id: Uuid, token: &str, ttl: Duration) -> GitopsResult<Session> {
        let mut active = self.store.list_active_sessions_for_user(user_id).await?;
        active.sort_by_key(|s| s.created_at);
        while active.len() >= self.concurrent_limit {
            let oldest = active.remove(0);
            self.store.delete_session(oldest.id).await?;
            self.validation_cache.invalidate(&oldest.token_hash).await;
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash_token(token),
            created_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).map_err(|e| GitopsError::validation(e.to_string()))?,
            last_activity: now,
            is_active: true,
        };
        self.store.insert_session(session.clone()).await?;
        Ok(session)
    }

    /// Cache lookup by token hash, then store lookup on miss, then expiry
    /// check. Expired sessions are invalidated synchronously before
    /// returning `None`.
    pub async fn validate_session(&self, token: &str) -> GitopsResult<Option<Session>> {
        let token_hash = hash_token(token);

        if let Some(cached) = self.validation_cache.get(&token_hash).await {
            return self.reject_if_expired(cached).await;
        }

        let session = self.store.get_session(&token_hash).await?;
        self.validation_cache.insert(token_hash, session.clone()).await;
        self.reject_if_expired(session).await
    }

    async fn reject_if_expired(&self, session: Option<Session>) -> GitopsResult<Option<Session>> {
        let Some(session) = session else { return Ok(None) };
        if !session.is_active || session.expires_at <= Utc::now() {
            self.store.delete_session(session.id).await?;
            self.validation_cache.invalidate(&session.token_hash).await;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// The session cleanup timer-wheel job, default interval 1h.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> GitopsResult<u64> {
        self.store.delete_expired_sessions(now).await
    }
}
