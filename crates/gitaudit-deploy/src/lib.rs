//! Deployment Engine: claims `queued` rows one at a
//! time per `(repository, branch)`, drives them through backup, validate,
//! apply, verify, and rollback-on-failure.

pub mod backup;
pub mod cancel;
pub mod engine;
pub mod health;
pub mod types;
pub mod validate;

pub use backup::Manifest;
pub use cancel::CancelRegistry;
pub use engine::{room_for, DeploymentEngine, DEFAULT_WORKER_POOL_SIZE};
pub use health::{HealthChecker, ReqwestHealthChecker};
pub use types::{DeploymentFileSpec, DeploymentPlan};
pub use validate::ValidationConfig;
