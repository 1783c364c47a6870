//! Entity definitions for the data model. These are plain records; the
//! behavior that mutates them lives in the component crates
//! (`gitaudit-deploy`, `gitaudit-pipelines`, `gitaudit-compliance`, ...).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentState {
    #[default]
    Queued,
    InProgress,
    Completed,
    Failed,
    RolledBack,
    Cancelled,
}

impl DeploymentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentState::Completed | DeploymentState::Failed | DeploymentState::RolledBack | DeploymentState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Deployment {
    pub id: Uuid,
    pub repository: String,
    pub branch: String,
    pub commit: String,
    pub state: DeploymentState,
    pub priority: Priority,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub backup_ref: Option<String>,
    pub error_message: Option<String>,
    pub original_deployment_id: Option<Uuid>,
    pub parameters: serde_json::Value,
    pub correlation_id: Option<String>,
    pub worker_id: Option<String>,
}

impl Deployment {
    pub fn invariants_hold(&self) -> bool {
        if let Some(started) = self.started_at {
            if started < self.requested_at {
                return false;
            }
        }
        if let (Some(started), Some(completed)) = (self.started_at, self.completed_at) {
            if completed < started {
                return false;
            }
        }
        self.retry_count <= self.max_retries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogChannel {
    Stdout,
    Stderr,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeploymentLog {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub level: LogLevel,
    pub channel: LogChannel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileOp {
    Create,
    Update,
    Delete,
    Backup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeploymentFile {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub path: String,
    pub op: FileOp,
    pub size: i64,
    pub hash: Option<String>,
    pub backup_path: Option<String>,
    pub status: FileStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Pending,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStatus::Success | PipelineStatus::Failure | PipelineStatus::Cancelled)
    }

    /// Pipeline run status never regresses. Returns the rank used to
    /// reject out-of-order updates from the code host.
    pub fn rank(self) -> u8 {
        match self {
            PipelineStatus::Pending => 0,
            PipelineStatus::Running => 1,
            PipelineStatus::Success | PipelineStatus::Failure | PipelineStatus::Cancelled => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PipelineRun {
    pub id: Uuid,
    pub repository: String,
    pub branch: String,
    pub workflow_name: String,
    pub run_id: String,
    pub status: PipelineStatus,
    pub conclusion: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub commit: String,
    pub actor: String,
    pub jobs: serde_json::Value,
    pub steps: serde_json::Value,
}

impl PipelineRun {
    pub fn duration_seconds(&self) -> Option<i64> {
        self.completed_at.map(|c| (c - self.started_at).num_seconds())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub files: f64,
    pub directories: f64,
    pub content: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub template_type: String,
    pub required_files: Vec<String>,
    pub required_directories: Vec<String>,
    pub scoring_weights: ScoringWeights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Missing,
    Outdated,
    Modified,
    Invalid,
}

impl IssueType {
    /// A file that's missing or was modified after the fact violates the
    /// required configuration outright; staleness and syntax problems are
    /// comparatively minor.
    pub fn default_severity(self) -> Severity {
        match self {
            IssueType::Missing | IssueType::Modified => Severity::High,
            IssueType::Outdated => Severity::Medium,
            IssueType::Invalid => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// Severity weights: high=1.0, medium=0.6, low=0.3.
    pub fn weight(self) -> f64 {
        match self {
            Severity::High => 1.0,
            Severity::Medium => 0.6,
            Severity::Low => 0.3,
        }
    }

    /// Ordering for `(severity desc, ...)` tie-break in §4.6.
    fn rank(self) -> u8 {
        match self {
            Severity::High => 0,
            Severity::Medium => 1,
            Severity::Low => 2,
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceIssue {
    pub issue_type: IssueType,
    pub severity: Severity,
    pub template: String,
    pub file: String,
    pub description: String,
    pub recommendation: String,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryCompliance {
    pub repository: String,
    pub applied_templates: Vec<String>,
    pub missing_templates: Vec<String>,
    pub issues: Vec<ComplianceIssue>,
    pub score: u32,
    pub compliant: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MetricPoint {
    pub kind: String,
    pub entity: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
    pub tags: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Hour,
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregations {
    pub count: u64,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetric {
    pub kind: String,
    pub entity: String,
    pub interval: Interval,
    pub bucket_start: DateTime<Utc>,
    pub aggregations: Aggregations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageExecution {
    Parallel,
    Sequential,
    DependencyOrdered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationStage {
    pub name: String,
    pub execution: StageExecution,
    pub actions: Vec<String>,
    /// Only meaningful when `execution == DependencyOrdered`: action id -> ids it depends on.
    pub dependencies: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RepositorySelector {
    All,
    Explicit(Vec<String>),
    Predicate(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationProfile {
    pub name: String,
    pub selector: RepositorySelector,
    pub stages: Vec<OrchestrationStage>,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub rollback_on_failure: bool,
    pub critical_failure_threshold: f64,
    pub notifications: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationState {
    Running,
    Completed,
    Failed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrchestrationRun {
    pub id: Uuid,
    pub profile_name: String,
    pub state: OrchestrationState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_actions: serde_json::Value,
    pub failed_actions: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prefix: String,
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    pub status: Option<DeploymentState>,
    pub repository: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupCounts {
    pub deployments: u64,
    pub deployment_logs: u64,
    pub deployment_files: u64,
    pub pipeline_runs: u64,
    pub metric_points: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StoreHealth {
    pub reachable: bool,
    pub queued: i64,
    pub in_progress: i64,
    pub terminal: i64,
}
