// ABOUTME: Platform collector: fetches one platform's raw job records and normalizes them
// ABOUTME: Fetch failures become a failed PlatformResult and never propagate further

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::future::Future;
use tracing::{debug, info, warn};

use crate::error::CollectorError;
use crate::models::{Platform, PlatformResult};
use crate::normalize::{normalize, RawJobRecord};

/// Capability supplied by a platform client: return the platform's raw job
/// records, or fail with a `CollectorError`. Authentication, paging and retries
/// all live behind this call.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawJobRecord>, CollectorError>;
}

/// Adapts an async closure into a `StatusSource`.
pub struct FnSource<F>(F);

pub fn source_fn<F, Fut>(fetch: F) -> FnSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<RawJobRecord>, CollectorError>> + Send,
{
    FnSource(fetch)
}

#[async_trait]
impl<F, Fut> StatusSource for FnSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<RawJobRecord>, CollectorError>> + Send,
{
    async fn fetch(&self) -> Result<Vec<RawJobRecord>, CollectorError> {
        (self.0)().await
    }
}

pub async fn collect(platform: Platform, source: &dyn StatusSource) -> PlatformResult {
    debug!(platform = %platform, "Fetching job statuses");

    match source.fetch().await {
        Ok(raw) => {
            let result = normalize_batch(platform, &raw, Utc::now());
            info!(
                platform = %platform,
                records = result.records().len(),
                dropped = result.dropped_records(),
                duplicates = result.duplicate_records(),
                "Collected job statuses"
            );
            result
        }
        Err(e) => {
            warn!(platform = %platform, error = %e, "Status collection failed");
            PlatformResult::failed(platform, &e)
        }
    }
}

/// Normalize a fetched batch with a single `checked_at`. Records that cannot be
/// normalized are dropped; records repeating a job id already seen in this
/// batch are skipped. Both are counted, separately.
pub fn normalize_batch(
    platform: Platform,
    raw: &[RawJobRecord],
    checked_at: DateTime<Utc>,
) -> PlatformResult {
    let mut records = Vec::with_capacity(raw.len());
    let mut seen = HashSet::new();
    let mut dropped = 0usize;
    let mut duplicates = 0usize;

    for (index, item) in raw.iter().enumerate() {
        match normalize(platform, item, checked_at) {
            Ok(record) => {
                if seen.insert(record.job_id.clone()) {
                    records.push(record);
                } else {
                    debug!(platform = %platform, job_id = %record.job_id, "Duplicate job record in batch");
                    duplicates += 1;
                }
            }
            Err(e) => {
                debug!(platform = %platform, index, reason = %e.reason, "Dropping raw record");
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        warn!(
            platform = %platform,
            dropped,
            kept = records.len(),
            "Some raw records could not be normalized"
        );
    }
    if duplicates > 0 {
        warn!(
            platform = %platform,
            duplicates,
            "Batch repeated job ids; kept the first record of each"
        );
    }

    PlatformResult::collected(platform, records, dropped).with_duplicates(duplicates)
}
