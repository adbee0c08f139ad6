// ABOUTME: Session aggregator: runs every platform collector concurrently under one deadline
// ABOUTME: Builds per-platform health summaries and seals the MonitoringSession

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collector::{collect, StatusSource};
use crate::error::CollectorError;
use crate::models::{JobStatus, MonitoringSession, Platform, PlatformHealthSummary, PlatformResult};

pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Longer timeouts are clamped to this when the cycle deadline is computed.
pub const MAX_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// `mon_<YYYYmmdd_HHMMSS>_<8 hex>`
pub fn new_session_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("mon_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Single pass over one platform's records.
pub fn summarize(result: &PlatformResult) -> PlatformHealthSummary {
    let mut summary = PlatformHealthSummary {
        platform: result.platform(),
        total: 0,
        succeeded: 0,
        failed: 0,
        running: 0,
        cancelled: 0,
        pending: 0,
        unknown: 0,
        failure_rate: 0.0,
        collection_succeeded: result.collection_succeeded(),
        collection_error: result.collection_error().map(str::to_string),
        dropped_records: result.dropped_records(),
        duplicate_records: result.duplicate_records(),
    };

    for record in result.records() {
        summary.total += 1;
        match record.status {
            JobStatus::Success => summary.succeeded += 1,
            JobStatus::Failed => summary.failed += 1,
            JobStatus::Running => summary.running += 1,
            JobStatus::Cancelled => summary.cancelled += 1,
            JobStatus::Pending => summary.pending += 1,
            JobStatus::Unknown => summary.unknown += 1,
        }
    }

    if summary.total > 0 {
        summary.failure_rate = summary.failed as f64 / summary.total as f64;
    }

    summary
}

/// An open monitoring session. Results are recorded once per platform; the
/// session only becomes visible to readers through `seal`.
#[derive(Debug)]
pub struct SessionBuilder {
    session_id: String,
    started_at: DateTime<Utc>,
    results: Vec<PlatformResult>,
    reported: HashSet<Platform>,
}

impl SessionBuilder {
    pub fn start() -> Self {
        let now = Utc::now();
        Self::with_id(new_session_id(now), now)
    }

    pub fn with_id(session_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at,
            results: Vec::new(),
            reported: HashSet::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns false (and keeps the first result) if the platform already reported.
    pub fn record(&mut self, result: PlatformResult) -> bool {
        if !self.reported.insert(result.platform()) {
            warn!(
                session_id = %self.session_id,
                platform = %result.platform(),
                "Platform reported twice; keeping the first result"
            );
            return false;
        }
        self.results.push(result);
        true
    }

    pub fn seal(self) -> MonitoringSession {
        self.seal_at(Utc::now())
    }

    pub fn seal_at(self, completed_at: DateTime<Utc>) -> MonitoringSession {
        let summaries: BTreeMap<Platform, PlatformHealthSummary> = self
            .results
            .iter()
            .map(|result| (result.platform(), summarize(result)))
            .collect();

        info!(
            session_id = %self.session_id,
            platforms = summaries.len(),
            failed_collections = summaries.values().filter(|s| !s.collection_succeeded).count(),
            duration_ms = (completed_at - self.started_at).num_milliseconds(),
            "Monitoring session sealed"
        );

        MonitoringSession::sealed(
            self.session_id,
            self.started_at,
            completed_at,
            self.results,
            summaries,
        )
    }
}

#[derive(Debug, Clone)]
pub struct SessionAggregator {
    collector_timeout: Duration,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTOR_TIMEOUT)
    }
}

impl SessionAggregator {
    pub fn new(collector_timeout: Duration) -> Self {
        Self { collector_timeout }
    }

    pub fn collector_timeout(&self) -> Duration {
        self.collector_timeout
    }

    /// Run one monitoring cycle across `sources`.
    ///
    /// Each collector is spawned as its own task and owns its result until the
    /// task finishes. Any collector still running at the deadline is cancelled
    /// and recorded as a `timeout` collection failure; results that already
    /// arrived are kept. Results are recorded in completion order.
    pub async fn aggregate(
        &self,
        sources: Vec<(Platform, Arc<dyn StatusSource>)>,
    ) -> MonitoringSession {
        let mut session = SessionBuilder::start();
        let timeout = self.collector_timeout.min(MAX_COLLECTOR_TIMEOUT);
        let deadline = Instant::now() + timeout;

        info!(
            session_id = %session.session_id(),
            platforms = sources.len(),
            timeout_secs = timeout.as_secs_f64(),
            "Starting monitoring cycle"
        );

        let mut scheduled = HashSet::new();
        let mut pending = FuturesUnordered::new();

        for (platform, source) in sources {
            if !scheduled.insert(platform) {
                warn!(platform = %platform, "Platform configured twice; ignoring the duplicate");
                continue;
            }

            let handle = tokio::spawn(async move {
                match tokio::time::timeout_at(deadline, collect(platform, source.as_ref())).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(platform = %platform, "Collector did not finish before the cycle deadline");
                        PlatformResult::failed(platform, &CollectorError::Timeout)
                    }
                }
            });

            pending.push(async move {
                match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(platform = %platform, error = %e, "Collector task aborted");
                        let error = CollectorError::Response(format!("collector task aborted: {}", e));
                        PlatformResult::failed(platform, &error)
                    }
                }
            });
        }

        while let Some(result) = pending.next().await {
            session.record(result);
        }

        session.seal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::source_fn;
    use crate::normalize::RawJobRecord;
    use crate::test_support::record;
    use serde_json::json;

    fn ok_source(records: Vec<RawJobRecord>) -> Arc<dyn StatusSource> {
        Arc::new(source_fn(move || {
            let records = records.clone();
            async move { Ok::<_, CollectorError>(records) }
        }))
    }

    fn slow_source() -> Arc<dyn StatusSource> {
        Arc::new(source_fn(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<Vec<RawJobRecord>, CollectorError>(Vec::new())
        }))
    }

    #[test]
    fn test_summarize_counts_by_status() {
        let result = PlatformResult::collected(
            Platform::Airbyte,
            vec![
                record(Platform::Airbyte, "1", JobStatus::Success),
                record(Platform::Airbyte, "2", JobStatus::Failed),
                record(Platform::Airbyte, "3", JobStatus::Running),
                record(Platform::Airbyte, "4", JobStatus::Unknown),
            ],
            1,
        );
        let summary = summarize(&result);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.running, 1);
        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.dropped_records, 1);
        assert!((summary.failure_rate - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summarize_empty_has_zero_failure_rate() {
        let summary = summarize(&PlatformResult::collected(Platform::SnowflakeTask, Vec::new(), 0));
        assert_eq!(summary.total, 0);
        assert_eq!(summary.failure_rate, 0.0);
        assert!(summary.collection_succeeded);
    }

    #[test]
    fn test_session_id_format() {
        let id = new_session_id(Utc::now());
        assert!(id.starts_with("mon_"));
        assert_eq!(id.len(), "mon_20240115_103500_".len() + 8);
    }

    #[test]
    fn test_builder_keeps_first_result_per_platform() {
        let mut builder = SessionBuilder::with_id("mon_test", Utc::now());
        assert!(builder.record(PlatformResult::collected(Platform::Airbyte, Vec::new(), 0)));
        assert!(!builder.record(PlatformResult::failed(Platform::Airbyte, &CollectorError::Timeout)));

        let session = builder.seal();
        assert_eq!(session.platform_results().len(), 1);
        assert!(session.summaries()[&Platform::Airbyte].collection_succeeded);
    }

    #[tokio::test]
    async fn test_timed_out_collectors_are_recorded_and_others_kept() {
        let aggregator = SessionAggregator::new(Duration::from_millis(200));
        let sources = vec![
            (
                Platform::Airbyte,
                ok_source(vec![json!({"jobId": "1", "status": "succeeded"})]),
            ),
            (Platform::Databricks, slow_source()),
            (Platform::PowerAutomate, slow_source()),
            (Platform::SnowflakeTask, ok_source(Vec::new())),
        ];

        let session = aggregator.aggregate(sources).await;

        assert_eq!(session.summaries().len(), 4);
        let failed: Vec<_> = session
            .summaries()
            .values()
            .filter(|s| !s.collection_succeeded)
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|s| s.collection_error.as_deref() == Some("timeout")));
        assert_eq!(session.summaries()[&Platform::Airbyte].succeeded, 1);
        assert!(session.completed_at() >= session.started_at());
    }

    #[tokio::test]
    async fn test_panicking_collector_is_isolated() {
        let aggregator = SessionAggregator::new(Duration::from_secs(5));
        let panicking: Arc<dyn StatusSource> = Arc::new(source_fn(|| async {
            if true {
                panic!("client bug");
            }
            Ok::<Vec<RawJobRecord>, CollectorError>(Vec::new())
        }));
        let sources = vec![
            (Platform::Airbyte, panicking),
            (
                Platform::Databricks,
                ok_source(vec![json!({"run_id": 1, "state": {"life_cycle_state": "RUNNING"}})]),
            ),
        ];

        let session = aggregator.aggregate(sources).await;

        let airbyte = &session.summaries()[&Platform::Airbyte];
        assert!(!airbyte.collection_succeeded);
        assert!(airbyte
            .collection_error
            .as_deref()
            .unwrap_or_default()
            .contains("collector task aborted"));
        assert_eq!(session.summaries()[&Platform::Databricks].running, 1);
    }

    #[tokio::test]
    async fn test_duplicate_platforms_are_collected_once() {
        let aggregator = SessionAggregator::default();
        let sources = vec![
            (Platform::Airbyte, ok_source(vec![json!({"jobId": "1", "status": "failed"})])),
            (Platform::Airbyte, ok_source(Vec::new())),
        ];
        let session = aggregator.aggregate(sources).await;
        assert_eq!(session.platform_results().len(), 1);
        assert_eq!(session.summaries()[&Platform::Airbyte].failed, 1);
    }

    #[tokio::test]
    async fn test_no_sources_seals_an_empty_session() {
        let session = SessionAggregator::default().aggregate(Vec::new()).await;
        assert!(session.summaries().is_empty());
        assert!(session.platform_results().is_empty());
    }

    #[tokio::test]
    async fn test_unbounded_timeout_is_clamped() {
        let aggregator = SessionAggregator::new(Duration::from_secs(u64::MAX));
        let session = aggregator
            .aggregate(vec![(
                Platform::Airbyte,
                ok_source(vec![json!({"jobId": "1", "status": "succeeded"})]),
            )])
            .await;
        assert_eq!(session.summaries()[&Platform::Airbyte].succeeded, 1);

        let empty = aggregator.aggregate(Vec::new()).await;
        assert!(empty.summaries().is_empty());
    }
}
