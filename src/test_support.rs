// ABOUTME: Shared fixtures for unit tests
// ABOUTME: Builds canonical records and sealed sessions without going through collectors

use chrono::{DateTime, TimeZone, Utc};

use crate::aggregator::SessionBuilder;
use crate::error::CollectorError;
use crate::models::{JobStatus, JobStatusRecord, Metadata, MonitoringSession, Platform, PlatformResult};

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 35, 0).unwrap()
}

pub fn record(platform: Platform, job_id: &str, status: JobStatus) -> JobStatusRecord {
    JobStatusRecord {
        job_id: job_id.to_string(),
        platform,
        job_name: format!("job {}", job_id),
        status,
        last_run_time: Some(fixed_time()),
        duration_seconds: Some(60),
        error_message: (status == JobStatus::Failed).then(|| "boom".to_string()),
        metadata: Metadata::new(),
        checked_at: fixed_time(),
    }
}

/// `counts` is (status, how many) pairs for one platform.
pub fn collected(platform: Platform, counts: &[(JobStatus, usize)]) -> PlatformResult {
    let records = counts
        .iter()
        .flat_map(|(status, n)| std::iter::repeat(*status).take(*n))
        .enumerate()
        .map(|(index, status)| record(platform, &format!("{}-{}", platform, index), status))
        .collect();
    PlatformResult::collected(platform, records, 0)
}

pub fn dropped_out(platform: Platform) -> PlatformResult {
    PlatformResult::failed(platform, &CollectorError::Connection("unreachable".to_string()))
}

pub fn session(results: Vec<PlatformResult>) -> MonitoringSession {
    let mut builder = SessionBuilder::with_id("mon_20240115_103500_deadbeef", fixed_time());
    for result in results {
        builder.record(result);
    }
    builder.seal_at(fixed_time())
}
