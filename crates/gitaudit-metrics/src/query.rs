//! Query shape for the Metrics Aggregator: filters over kind, entity,
//! time range, tag equality, aggregation, limit, ordering.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use gitaudit_store::{AggregatedMetric, Interval, MetricPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct MetricsQuery {
    pub kind: String,
    pub entity: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub tags: HashMap<String, String>,
    /// `None` returns raw points; `Some(interval)` returns bucketed rollups.
    pub aggregation: Option<Interval>,
    pub limit: usize,
    pub order: SortOrder,
}

impl MetricsQuery {
    pub fn new(kind: impl Into<String>, entity: impl Into<String>, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            kind: kind.into(),
            entity: entity.into(),
            from,
            to,
            tags: HashMap::new(),
            aggregation: None,
            limit: 1000,
            order: SortOrder::Ascending,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_aggregation(mut self, interval: Interval) -> Self {
        self.aggregation = Some(interval);
        self
    }

    pub fn matches_tags(&self, point: &MetricPoint) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        let Some(object) = point.tags.as_object() else { return false };
        self.tags.iter().all(|(key, value)| object.get(key).and_then(|v| v.as_str()) == Some(value.as_str()))
    }
}

#[derive(Debug, Clone)]
pub enum QueryResult {
    Raw(Vec<MetricPoint>),
    Aggregated(Vec<AggregatedMetric>),
}
