//! `AuthService`: the single entry point the rest of
//! the system gates operator requests through — authentication, session
//! issuance/validation, API-key verification, and permission checks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gitaudit_core::{GitopsError, GitopsResult, Permission, Role};
use gitaudit_store::{ApiKey, Session, Store, User};
use uuid::Uuid;

use crate::api_key;
use crate::password;
use crate::session::SessionManager;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(8 * 3600);

pub struct AuthService {
    store: Arc<dyn Store>,
    sessions: SessionManager,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let sessions = SessionManager::new(store.clone());
        Self { store, sessions }
    }

    /// Always computes a password hash, even when the user doesn't exist,
    /// so an unknown username and a wrong password take the same time.
    pub async fn authenticate(&self, username_or_email: &str, password: &str) -> GitopsResult<User> {
        let user = self.store.get_user_by_username(username_or_email).await?;

        let Some(mut user) = user else {
            let _ = password::hash_password(password);
            return Err(GitopsError::auth_failed("invalid credentials"));
        };

        if !password::verify_password(password, &user.password_hash) {
            return Err(GitopsError::auth_failed("invalid credentials"));
        }
        if !user.is_active {
            return Err(GitopsError::auth_failed("invalid credentials"));
        }
        if let Some(locked_until) = user.locked_until {
            if locked_until > Utc::now() {
                return Err(GitopsError::auth_failed("invalid credentials"));
            }
        }

        user.last_login = Some(Utc::now());
        self.store.update_user(user.clone()).await?;
        Ok(user)
    }

    pub async fn create_session(&self, user_id: Uuid, token: &str, ttl: Duration) -> GitopsResult<Session> {
        self.sessions.create_session(user_id, token, ttl).await
    }

    pub async fn validate_session(&self, token: &str) -> GitopsResult<Option<Session>> {
        self.sessions.validate_session(token).await
    }

    pub async fn cleanup_expired_sessions(&self) -> GitopsResult<u64> {
        self.sessions.cleanup_expired(Utc::now()).await
    }

    pub async fn issue_api_key(&self, user_id: Uuid) -> GitopsResult<(ApiKey, String)> {
        let generated = api_key::generate();
        let key = ApiKey {
            id: Uuid::new_v4(),
            user_id,
            prefix: generated.lookup_prefix.clone(),
            key_hash: generated.hash_hex,
            created_at: Utc::now(),
            last_used: None,
            expires_at: None,
            revoked: false,
        };
        self.store.insert_api_key(key.clone()).await?;
        Ok((key, generated.plaintext))
    }

    /// Constant-time compare of hashes; updates `lastUsed` on success.
    pub async fn verify_api_key(&self, key: &str) -> GitopsResult<ApiKey> {
        let Some(prefix) = api_key::lookup_prefix_of(key) else {
            return Err(GitopsError::auth_failed("malformed api key"));
        };
        let Some(stored) = self.store.get_api_key_by_prefix(&prefix).await? else {
            return Err(GitopsError::auth_failed("invalid api key"));
        };
        if stored.revoked {
            return Err(GitopsError::auth_failed("invalid api key"));
        }
        if let Some(expires_at) = stored.expires_at {
            if expires_at <= Utc::now() {
                return Err(GitopsError::auth_failed("invalid api key"));
            }
        }
        if !api_key::verify(key, &stored.key_hash) {
            return Err(GitopsError::auth_failed("invalid api key"));
        }

        let now = Utc::now();
        self.store.update_api_key_last_used(stored.id, now).await?;
        Ok(ApiKey { last_used: Some(now), ..stored })
    }

    /// Matches the exact (resource, action) pair or the wildcard `*:*`.
    /// Unknown pairs can't be represented at all since `Resource`/`Action`
    /// are closed enums; an unrecognized role string fails closed.
    pub fn check_permission(&self, role: Role, permission: Permission) -> bool {
        role.allows(permission)
    }

    /// Resolves the stored role string and checks it, failing closed on an
    /// unrecognized role rather than propagating the parse error.
    pub fn check_permission_for_user(&self, user: &User, permission: Permission) -> bool {
        user.role.parse::<Role>().map(|role| role.allows(permission)).unwrap_or(false)
    }
}
