//! Shapes parsed out of `Deployment.parameters`, an open key-value
//! mapping. This crate fixes the schema it expects from that bag: a
//! destination, a platform, an optional health check, and the file
//! change set; `serde_json::Value` decides at run time since `parameters`
//! itself is untyped in the data model.

use gitaudit_store::FileOp;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct DeploymentFileSpec {
    pub path: String,
    pub op: FileOp,
    pub content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    pub destination_share: String,
    pub destination_dir: String,
    pub platform: String,
    pub files: Vec<DeploymentFileSpec>,
    pub health_check_url: Option<String>,
    pub health_check_body_contains: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFileSpec {
    path: String,
    #[serde(default = "default_op")]
    op: String,
    #[serde(default)]
    content: Option<String>,
}

fn default_op() -> String {
    "update".to_string()
}

#[derive(Debug, Deserialize)]
struct RawParams {
    #[serde(default)]
    destination_share: Option<String>,
    #[serde(default)]
    destination_dir: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    files: Vec<RawFileSpec>,
    #[serde(default)]
    health_check_url: Option<String>,
    #[serde(default)]
    health_check_body_contains: Option<String>,
}

fn parse_op(raw: &str) -> FileOp {
    match raw {
        "create" => FileOp::Create,
        "delete" => FileOp::Delete,
        "backup" => FileOp::Backup,
        _ => FileOp::Update,
    }
}

/// Defaults match the happy-path scenario: a lone `configuration.yaml`
/// fetched from the repository root and written verbatim.
pub fn plan_from(repository: &str, commit_configuration_yaml: &str, parameters: &serde_json::Value) -> DeploymentPlan {
    let raw: RawParams = serde_json::from_value(parameters.clone()).unwrap_or(RawParams {
        destination_share: None,
        destination_dir: None,
        platform: None,
        files: Vec::new(),
        health_check_url: None,
        health_check_body_contains: None,
    });

    let files = if raw.files.is_empty() {
        vec![DeploymentFileSpec {
            path: "configuration.yaml".to_string(),
            op: FileOp::Update,
            content: Some(commit_configuration_yaml.to_string()),
        }]
    } else {
        raw.files.into_iter().map(|f| DeploymentFileSpec { path: f.path, op: parse_op(&f.op), content: f.content }).collect()
    };

    DeploymentPlan {
        destination_share: raw.destination_share.unwrap_or_else(|| repository.to_string()),
        destination_dir: raw.destination_dir.unwrap_or_default(),
        platform: raw.platform.unwrap_or_else(|| "home-assistant".to_string()),
        files,
        health_check_url: raw.health_check_url,
        health_check_body_contains: raw.health_check_body_contains,
    }
}

/// Files are applied directories-before-files, deletes last; this plan
/// carries no directory entries of its own, so the only ordering that
/// matters is deletes moving to the end.
pub fn apply_order(files: &[DeploymentFileSpec]) -> Vec<&DeploymentFileSpec> {
    let mut ordered: Vec<&DeploymentFileSpec> = files.iter().collect();
    ordered.sort_by_key(|f| matches!(f.op, FileOp::Delete));
    ordered
}
