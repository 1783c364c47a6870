//! Pipeline Supervisor: triggers code-host workflow
//! runs, polls them to completion, caches snapshots, and reports
//! per-repository success/failure metrics.

pub mod cache;
pub mod code_host;
pub mod poller;
pub mod supervisor;
pub mod types;

pub use cache::RunCache;
pub use code_host::{CodeHost, ProcessCodeHost, RunStatus};
pub use poller::Backoff;
pub use supervisor::{room_for, PipelineSupervisor};
pub use types::PipelineMetricsSummary;
