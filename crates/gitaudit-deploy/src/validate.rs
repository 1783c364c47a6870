//! Validate step: YAML syntax, whitelisted platforms, path-traversal
//! rejection, maximum content size, and any template-defined checks,
//! run over the fetched source before Apply.

use gitaudit_capabilities::remote_fs::validate_path;
use gitaudit_core::{GitopsError, GitopsResult};

use crate::types::DeploymentFileSpec;

pub const DEFAULT_MAX_CONTENT_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_ALLOWED_PLATFORMS: &[&str] = &["kubernetes", "docker-compose", "home-assistant", "bare-metal"];

/// A template-defined check: given a file's path and content, returns an
/// error describing the violation, or `Ok(())` if it passes.
pub type ValidationRule = Box<dyn Fn(&str, &str) -> GitopsResult<()> + Send + Sync>;

pub struct ValidationConfig {
    pub max_content_bytes: u64,
    pub allowed_platforms: Vec<String>,
    pub rules: Vec<ValidationRule>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            allowed_platforms: DEFAULT_ALLOWED_PLATFORMS.iter().map(|s| s.to_string()).collect(),
            rules: Vec::new(),
        }
    }
}

pub fn validate_platform(platform: &str, config: &ValidationConfig) -> GitopsResult<()> {
    if !config.allowed_platforms.iter().any(|p| p == platform) {
        return Err(GitopsError::validation(format!("platform '{platform}' is not whitelisted")));
    }
    Ok(())
}

fn is_yaml_path(path: &str) -> bool {
    path.ends_with(".yaml") || path.ends_with(".yml")
}

pub fn validate_file(spec: &DeploymentFileSpec, config: &ValidationConfig) -> GitopsResult<()> {
    validate_path(&spec.path)?;

    let Some(content) = spec.content.as_deref() else {
        return Ok(());
    };

    if content.len() as u64 > config.max_content_bytes {
        return Err(GitopsError::payload_too_large(config.max_content_bytes));
    }

    if is_yaml_path(&spec.path) {
        serde_yaml::from_str::<serde_yaml::Value>(content)
            .map_err(|e| GitopsError::validation(format!("{}: invalid YAML: {e}", spec.path)))?;
    }

    for rule in &config.rules {
        rule(&spec.path, content)?;
    }

    Ok(())
}

pub fn validate_change_set(files: &[DeploymentFileSpec], platform: &str, config: &ValidationConfig) -> GitopsResult<()> {
    validate_platform(platform, config)?;
    for file in files {
        validate_file(file, config)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitaudit_store::FileOp;

    fn file(path: &str, content: &str) -> DeploymentFileSpec {
        DeploymentFileSpec { path: path.to_string(), op: FileOp::Update, content: Some(content.to_string()) }
    }

    #[test]
    fn rejects_unwhitelisted_platform() {
        let config = ValidationConfig::default();
        assert!(validate_platform("ms-dos", &config).is_err());
    }

    #[test]
    fn rejects_malformed_yaml() {
        let config = ValidationConfig::default();
        let spec = file("configuration.yaml", "key: [unterminated");
        assert!(validate_file(&spec, &config).is_err());
    }

    #[test]
    fn accepts_well_formed_yaml() {
        let config = ValidationConfig::default();
        let spec = file("configuration.yaml", "homeassistant:\n  name: home\n");
        assert!(validate_file(&spec, &config).is_ok());
    }

    #[test]
    fn rejects_path_traversal() {
        let config = ValidationConfig::default();
        let spec = file("../../etc/passwd", "x");
        assert!(validate_file(&spec, &config).is_err());
    }

    #[test]
    fn rejects_oversize_content() {
        let config = ValidationConfig { max_content_bytes: 4, ..Default::default() };
        let spec = file("configuration.yaml", "way too big");
        assert!(validate_file(&spec, &config).is_err());
    }

    #[test]
    fn exact_max_size_passes() {
        let config = ValidationConfig { max_content_bytes: 4, ..Default::default() };
        let spec = file("notes.txt", "abcd");
        assert!(validate_file(&spec, &config).is_ok());
    }
}
