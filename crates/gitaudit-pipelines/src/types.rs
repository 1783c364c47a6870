use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct PipelineMetricsSummary {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub avg_duration: f64,
    pub median_duration: f64,
}
