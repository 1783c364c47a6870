//! Metrics Aggregator: accepts `MetricPoint` samples
//! and materializes `AggregatedMetric` rollups over fixed intervals.
//! For closed buckets the rollup is cached in the store so repeated
//! queries are stable; the open (in-progress) bucket is recomputed on
//! every call since its contents can still change.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use gitaudit_core::GitopsResult;
use gitaudit_store::{Aggregations, AggregatedMetric, Interval, MetricPoint, Store};

use crate::percentile;
use crate::query::{MetricsQuery, QueryResult, SortOrder};

pub struct MetricsAggregator {
    store: Arc<dyn Store>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn record(&self, point: MetricPoint) -> GitopsResult<()> {
        self.store.insert_metric_point(point).await
    }

    pub async fn query(&self, query: &MetricsQuery) -> GitopsResult<QueryResult> {
        match query.aggregation {
            None => self.query_raw(query).await,
            Some(interval) => self.query_aggregated(query, interval).await,
        }
    }

    async fn query_raw(&self, query: &MetricsQuery) -> GitopsResult<QueryResult> {
        let mut points = self.store.query_metric_points(&query.kind, &query.entity, query.from, query.to).await?;
        points.retain(|point| query.matches_tags(point));
        points.sort_by_key(|point| point.timestamp);
        if query.order == SortOrder::Descending {
            points.reverse();
        }
        points.truncate(query.limit);
        Ok(QueryResult::Raw(points))
    }

    async fn query_aggregated(&self, query: &MetricsQuery, interval: Interval) -> GitopsResult<QueryResult> {
        let mut bucket_start = bucket_floor(query.from, interval);
        let mut buckets = Vec::new();
        while bucket_start < query.to {
            buckets.push(bucket_start);
            bucket_start = bucket_end(bucket_start, interval);
        }

        let mut rollups = Vec::with_capacity(buckets.len());
        for start in buckets {
            rollups.push(self.rollup(&query.kind, &query.entity, interval, start, &query.tags).await?);
        }

        if query.order == SortOrder::Descending {
            rollups.reverse();
        }
        rollups.truncate(query.limit);
        Ok(QueryResult::Aggregated(rollups))
    }

    /// Computes (or returns the cached) rollup for one bucket. A bucket is
    /// closed once `bucket_end <= now`; closed results are cached so two
    /// consecutive calls return an identical `p95`.
    async fn rollup(
        &self,
        kind: &str,
        entity: &str,
        interval: Interval,
        bucket_start: DateTime<Utc>,
        tags: &std::collections::HashMap<String, String>,
    ) -> GitopsResult<AggregatedMetric> {
        let closed = bucket_end(bucket_start, interval) <= Utc::now();

        if closed && tags.is_empty() {
            if let Some(cached) = self.store.get_aggregated_metric(kind, entity, interval, bucket_start).await? {
                return Ok(cached);
            }
        }

        let end = bucket_end(bucket_start, interval);
        let mut points = self.store.query_metric_points(kind, entity, bucket_start, end).await?;
        if !tags.is_empty() {
            let query = MetricsQuery::new(kind, entity, bucket_start, end);
            let query = tags.iter().fold(query, |q, (k, v)| q.with_tag(k.clone(), v.clone()));
            points.retain(|point| query.matches_tags(point));
        }

        let metric = AggregatedMetric {
            kind: kind.to_string(),
            entity: entity.to_string(),
            interval,
            bucket_start,
            aggregations: compute_aggregations(&points),
        };

        if closed && tags.is_empty() {
            self.store.upsert_aggregated_metric(metric.clone()).await?;
        }
        Ok(metric)
    }
}

fn compute_aggregations(points: &[MetricPoint]) -> Aggregations {
    let mut values: Vec<f64> = points.iter().map(|point| point.value).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());

    if values.is_empty() {
        return Aggregations { count: 0, sum: 0.0, avg: 0.0, min: 0.0, max: 0.0, median: 0.0, p95: 0.0, p99: 0.0 };
    }

    let count = values.len() as u64;
    let sum: f64 = values.iter().sum();
    Aggregations {
        count,
        sum,
        avg: sum / count as f64,
        min: values[0],
        max: values[values.len() - 1],
        median: percentile::median(&values),
        p95: percentile::percentile(&values, 95.0),
        p99: percentile::percentile(&values, 99.0),
    }
}

fn bucket_floor(timestamp: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    match interval {
        Interval::Hour => timestamp.with_minute(0).unwrap().with_second(0).unwrap().with_nanosecond(0).unwrap(),
        Interval::Day => timestamp.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc(),
        Interval::Week => {
            let day = timestamp.date_naive();
            let back_to_monday = day.weekday().num_days_from_monday();
            (day - Duration::days(back_to_monday as i64)).and_hms_opt(0, 0, 0).unwrap().and_utc()
        }
        Interval::Month => Utc.with_ymd_and_hms(timestamp.year(), timestamp.month(), 1, 0, 0, 0).unwrap(),
    }
}

fn bucket_end(bucket_start: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    match interval {
        Interval::Hour => bucket_start + Duration::hours(1),
        Interval::Day => bucket_start + Duration::days(1),
        Interval::Week => bucket_start + Duration::weeks(1),
        Interval::Month => {
            let (year, month) = if bucket_start.month() == 12 { (bucket_start.year() + 1, 1) } else { (bucket_start.year(), bucket_start.month() + 1) };
            Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitaudit_store::InMemoryStore;
    use serde_json::json;

    fn point(kind: &str, entity: &str, at: DateTime<Utc>, value: f64) -> MetricPoint {
        MetricPoint { kind: kind.to_string(), entity: entity.to_string(), timestamp: at, value, unit: "ms".to_string(), tags: json!({}) }
    }

    #[tokio::test]
    async fn p95_over_a_closed_bucket_matches_linear_interpolation() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let aggregator = MetricsAggregator::new(store);
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        for (i, value) in (1..=10).map(|n| (n * 10) as f64).enumerate() {
            aggregator.record(point("api.latency", "svc-a", base + Duration::minutes(i as i64), value)).await.unwrap();
        }

        let query = MetricsQuery::new("api.latency", "svc-a", base - Duration::hours(1), base + Duration::hours(25))
            .with_aggregation(Interval::Day);
        let QueryResult::Aggregated(rollups) = aggregator.query(&query).await.unwrap() else { panic!("expected aggregated result") };
        let today = rollups.iter().find(|r| r.bucket_start == bucket_floor(base, Interval::Day)).unwrap();
        assert_eq!(today.aggregations.p95, 95.5);
    }

    #[tokio::test]
    async fn closed_bucket_result_is_stable_across_repeated_calls() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let aggregator = MetricsAggregator::new(store.clone());
        let base = Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap();
        aggregator.record(point("cpu.load", "svc-b", base, 1.0)).await.unwrap();
        aggregator.record(point("cpu.load", "svc-b", base + Duration::minutes(5), 3.0)).await.unwrap();

        let query = MetricsQuery::new("cpu.load", "svc-b", base - Duration::hours(1), base + Duration::hours(2))
            .with_aggregation(Interval::Hour);
        let first = aggregator.query(&query).await.unwrap();
        let second = aggregator.query(&query).await.unwrap();
        let QueryResult::Aggregated(first) = first else { panic!() };
        let QueryResult::Aggregated(second) = second else { panic!() };
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.aggregations.p95, b.aggregations.p95);
        }
    }

    #[tokio::test]
    async fn raw_query_filters_by_tag_equality() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let aggregator = MetricsAggregator::new(store);
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut tagged = point("deploy.duration", "svc-c", base, 42.0);
        tagged.tags = json!({"region": "us-east"});
        aggregator.record(tagged).await.unwrap();
        aggregator.record(point("deploy.duration", "svc-c", base, 7.0)).await.unwrap();

        let query = MetricsQuery::new("deploy.duration", "svc-c", base - Duration::hours(1), base + Duration::hours(1))
            .with_tag("region", "us-east");
        let QueryResult::Raw(points) = aggregator.query(&query).await.unwrap() else { panic!("expected raw result") };
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 42.0);
    }
}
