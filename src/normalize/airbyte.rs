// ABOUTME: Airbyte job normalization
// ABOUTME: Accepts both the legacy configId/startedAt shape and the v1 connectionId/startTime shape

use serde::Deserialize;
use serde_json::Value;

use super::{duration_between, lenient, map_status, scalar_metadata, scalar_text, timestamp_value, Draft, StatusTable};
use crate::error::NormalizationDrop;
use crate::models::JobStatus;

const STATUS_TABLE: StatusTable = &[
    ("succeeded", JobStatus::Success),
    ("failed", JobStatus::Failed),
    ("cancelled", JobStatus::Cancelled),
    ("running", JobStatus::Running),
    ("incomplete", JobStatus::Running),
    ("pending", JobStatus::Pending),
];

// The v1 names are separate fields rather than aliases so a payload carrying
// both shapes still deserializes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AirbyteJob {
    job_id: Option<Value>,
    config_id: Option<Value>,
    connection_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    config_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    connection_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    job_type: Option<String>,
    status: Option<Value>,
    created_at: Option<Value>,
    updated_at: Option<Value>,
    last_updated_at: Option<Value>,
    started_at: Option<Value>,
    start_time: Option<Value>,
    ended_at: Option<Value>,
    end_time: Option<Value>,
    rows_synced: Option<Value>,
    bytes_synced: Option<Value>,
}

pub(super) fn normalize(raw: &Value) -> Result<Draft, NormalizationDrop> {
    let job = AirbyteJob::deserialize(raw)
        .map_err(|e| NormalizationDrop::new(format!("airbyte job shape: {}", e)))?;

    let job_id = job
        .job_id
        .as_ref()
        .and_then(scalar_text)
        .ok_or_else(|| NormalizationDrop::new("airbyte job has no jobId"))?;

    let raw_status = job.status.as_ref().and_then(scalar_text);
    let status = raw_status.as_deref().and_then(|s| map_status(STATUS_TABLE, s));

    let started = timestamp_value(job.started_at.as_ref().or(job.start_time.as_ref()));
    let ended = timestamp_value(job.ended_at.as_ref().or(job.end_time.as_ref()));

    let job_name = [job.config_name, job.connection_name]
        .into_iter()
        .flatten()
        .find(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("Job {}", job_id));

    let mut draft = Draft {
        job_id,
        job_name,
        status,
        raw_status,
        last_run_time: started,
        duration_seconds: duration_between(started, ended),
        ..Draft::default()
    };

    let metadata = &mut draft.metadata;
    metadata.insert(
        "config_id".into(),
        scalar_metadata(job.config_id.as_ref().or(job.connection_id.as_ref())),
    );
    metadata.insert("job_type".into(), job.job_type.into());
    metadata.insert("created_at".into(), scalar_metadata(job.created_at.as_ref()));
    metadata.insert(
        "updated_at".into(),
        scalar_metadata(job.updated_at.as_ref().or(job.last_updated_at.as_ref())),
    );
    if job.rows_synced.is_some() {
        metadata.insert("rows_synced".into(), scalar_metadata(job.rows_synced.as_ref()));
    }
    if job.bytes_synced.is_some() {
        metadata.insert("bytes_synced".into(), scalar_metadata(job.bytes_synced.as_ref()));
    }

    Ok(draft)
}
