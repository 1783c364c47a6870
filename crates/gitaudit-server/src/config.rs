//! Startup configuration: every option is read from the process
//! environment once at startup and validated; an out-of-range value
//! fails startup rather than silently clamping.

use std::collections::HashMap;
use std::time::Duration;

use gitaudit_core::{GitopsError, GitopsResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub workers_deployment_pool: usize,
    pub workers_pipeline_poll_min: Duration,
    pub workers_pipeline_poll_max: Duration,
    pub limits_max_content_bytes: u64,
    pub limits_webhook_dedup_ttl_seconds: u64,
    pub limits_sessions_concurrent: usize,
    pub retention_backup_days: u32,
    pub retention_terminal_days: u32,
    pub auth_session_ttl: Duration,
    pub rate_limits_pipeline_trigger_per_minute: u32,
    pub paths_remote_fs_roots: Vec<String>,
    pub webhook_secrets: HashMap<String, String>,
    pub repo_host_tool_path: String,
    pub remote_fs_tool_path: String,
    pub eventbus_subscriber_capacity: usize,
}

impl Config {
    pub fn from_env() -> GitopsResult<Self> {
        let config = Self {
            bind_addr: env_or("GITAUDIT_BIND_ADDR", "0.0.0.0:8080"),
            database_url: std::env::var("DATABASE_URL").ok(),
            workers_deployment_pool: env_usize("GITAUDIT_WORKERS_DEPLOYMENT_POOL", 4)?,
            workers_pipeline_poll_min: Duration::from_secs(env_u64("GITAUDIT_WORKERS_PIPELINE_POLL_MIN_SECS", 5)?),
            workers_pipeline_poll_max: Duration::from_secs(env_u64("GITAUDIT_WORKERS_PIPELINE_POLL_MAX_SECS", 60)?),
            limits_max_content_bytes: env_u64("GITAUDIT_LIMITS_MAX_CONTENT_BYTES", 10 * 1024 * 1024)?,
            limits_webhook_dedup_ttl_seconds: env_u64("GITAUDIT_LIMITS_WEBHOOK_DEDUP_TTL_SECONDS", 24 * 3600)?,
            limits_sessions_concurrent: env_usize("GITAUDIT_LIMITS_SESSIONS_CONCURRENT", 5)?,
            retention_backup_days: env_u32("GITAUDIT_RETENTION_BACKUP_DAYS", 30)?,
            retention_terminal_days: env_u32("GITAUDIT_RETENTION_TERMINAL_DAYS", 90)?,
            auth_session_ttl: Duration::from_secs(env_u64("GITAUDIT_AUTH_SESSION_TTL_SECS", 8 * 3600)?),
            rate_limits_pipeline_trigger_per_minute: env_u32("GITAUDIT_RATE_LIMITS_PIPELINE_TRIGGER", 30)?,
            paths_remote_fs_roots: env_or("GITAUDIT_PATHS_REMOTE_FS_ROOTS", "/srv/gitops")
                .split(',')
                .map(str::to_string)
                .collect(),
            webhook_secrets: parse_webhook_secrets(&env_or("GITAUDIT_WEBHOOK_SECRETS", "")),
            repo_host_tool_path: env_or("GITAUDIT_REPO_HOST_TOOL", "gh"),
            remote_fs_tool_path: env_or("GITAUDIT_REMOTE_FS_TOOL", "smbclient"),
            eventbus_subscriber_capacity: env_usize("GITAUDIT_EVENTBUS_SUBSCRIBER_CAPACITY", 256)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> GitopsResult<()> {
        if self.workers_deployment_pool == 0 {
            return Err(GitopsError::validation("workers.deploymentPool must be at least 1"));
        }
        if self.workers_pipeline_poll_min > self.workers_pipeline_poll_max {
            return Err(GitopsError::validation("workers.pipelinePollMin must not exceed workers.pipelinePollMax"));
        }
        if self.limits_max_content_bytes == 0 {
            return Err(GitopsError::validation("limits.maxContentBytes must be positive"));
        }
        if self.limits_sessions_concurrent == 0 {
            return Err(GitopsError::validation("limits.sessions.concurrent must be at least 1"));
        }
        if self.paths_remote_fs_roots.iter().any(|p| p.is_empty()) {
            return Err(GitopsError::validation("paths.remoteFSRoots entries must not be empty"));
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> GitopsResult<usize> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| GitopsError::validation(format!("{key} must be a non-negative integer"))),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> GitopsResult<u64> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| GitopsError::validation(format!("{key} must be a non-negative integer"))),
        Err(_) => Ok(default),
    }
}

fn env_u32(key: &str, default: u32) -> GitopsResult<u32> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| GitopsError::validation(format!("{key} must be a non-negative integer"))),
        Err(_) => Ok(default),
    }
}

/// `host1=secret1,host2=secret2`
fn parse_webhook_secrets(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(host, secret)| (host.trim().to_string(), secret.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn an_inverted_poll_window_fails_validation() {
        let mut config = Config {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            workers_deployment_pool: 4,
            workers_pipeline_poll_min: Duration::from_secs(60),
            workers_pipeline_poll_max: Duration::from_secs(5),
            limits_max_content_bytes: 1024,
            limits_webhook_dedup_ttl_seconds: 3600,
            limits_sessions_concurrent: 5,
            retention_backup_days: 30,
            retention_terminal_days: 90,
            auth_session_ttl: Duration::from_secs(3600),
            rate_limits_pipeline_trigger_per_minute: 30,
            paths_remote_fs_roots: vec!["/srv".to_string()],
            webhook_secrets: HashMap::new(),
            repo_host_tool_path: "gh".to_string(),
            remote_fs_tool_path: "smbclient".to_string(),
            eventbus_subscriber_capacity: 256,
        };
        assert!(config.validate().is_err());
        config.workers_pipeline_poll_max = Duration::from_secs(120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn webhook_secrets_are_parsed_as_host_to_secret_pairs() {
        let parsed = parse_webhook_secrets("github=abc123,gitlab=def456");
        assert_eq!(parsed.get("github").map(String::as_str), Some("abc123"));
        assert_eq!(parsed.get("gitlab").map(String::as_str), Some("def456"));
    }
}
