// ABOUTME: Databricks job run normalization
// ABOUTME: Status comes from the life cycle state plus the result state once terminated

use serde::Deserialize;
use serde_json::Value;

use super::{from_epoch_millis, lenient, map_status, scalar_text, Draft, StatusTable};
use crate::error::NormalizationDrop;
use crate::models::{JobStatus, MetadataValue};

/// Result states, consulted only for TERMINATED runs.
const RESULT_TABLE: StatusTable = &[
    ("success", JobStatus::Success),
    ("failed", JobStatus::Failed),
    ("canceled", JobStatus::Cancelled),
];

/// Life cycle states of runs that have not terminated yet.
const LIFE_CYCLE_TABLE: StatusTable = &[
    ("pending", JobStatus::Running),
    ("running", JobStatus::Running),
];

#[derive(Debug, Deserialize)]
struct DatabricksRun {
    run_id: Option<Value>,
    job_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    run_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    job_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    state: Option<RunState>,
    start_time: Option<Value>,
    end_time: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    setup_duration: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    execution_duration: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    cleanup_duration: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    run_page_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RunState {
    #[serde(default, deserialize_with = "lenient")]
    life_cycle_state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    result_state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    state_message: Option<String>,
}

impl RunState {
    fn status(&self) -> Option<JobStatus> {
        let life_cycle = self.life_cycle_state.as_deref()?;
        if life_cycle.eq_ignore_ascii_case("terminated") {
            return map_status(RESULT_TABLE, self.result_state.as_deref()?);
        }
        map_status(LIFE_CYCLE_TABLE, life_cycle)
    }

    fn raw(&self) -> Option<String> {
        match (&self.life_cycle_state, &self.result_state) {
            (Some(life), Some(result)) => Some(format!("{}/{}", life, result)),
            (Some(life), None) => Some(life.clone()),
            (None, Some(result)) => Some(format!("?/{}", result)),
            (None, None) => None,
        }
    }
}

pub(super) fn normalize(raw: &Value) -> Result<Draft, NormalizationDrop> {
    let run = DatabricksRun::deserialize(raw)
        .map_err(|e| NormalizationDrop::new(format!("databricks run shape: {}", e)))?;

    let run_id = run
        .run_id
        .as_ref()
        .and_then(scalar_text)
        .ok_or_else(|| NormalizationDrop::new("databricks run has no run_id"))?;
    let parent_job = run.job_id.as_ref().and_then(scalar_text);

    let job_id = match &parent_job {
        Some(job) => format!("databricks_{}_{}", job, run_id),
        None => format!("databricks_run_{}", run_id),
    };

    let job_name = run
        .job_name
        .clone()
        .or_else(|| run.run_name.clone())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| match &parent_job {
            Some(job) => format!("Job {}", job),
            None => format!("Run {}", run_id),
        });

    let state = run.state.unwrap_or_default();
    let start_ms = run.start_time.as_ref().and_then(Value::as_i64);
    let end_ms = run.end_time.as_ref().and_then(Value::as_i64);

    let duration_ms = match run.execution_duration {
        Some(ms) if ms > 0 => Some(ms),
        _ => match (start_ms, end_ms) {
            (Some(start), Some(end)) if start > 0 && end >= start => Some(end - start),
            _ => None,
        },
    };

    let mut draft = Draft {
        job_id,
        job_name,
        status: state.status(),
        raw_status: state.raw(),
        last_run_time: start_ms.and_then(from_epoch_millis),
        duration_seconds: duration_ms.and_then(|ms| u64::try_from(ms / 1000).ok()),
        error_message: state.state_message.clone(),
        ..Draft::default()
    };

    let metadata = &mut draft.metadata;
    metadata.insert("job_id".into(), parent_job.into());
    metadata.insert("run_id".into(), MetadataValue::Text(run_id));
    metadata.insert("run_name".into(), run.run_name.into());
    metadata.insert("life_cycle_state".into(), state.life_cycle_state.into());
    metadata.insert("result_state".into(), state.result_state.into());
    metadata.insert("setup_duration".into(), run.setup_duration.into());
    metadata.insert("cleanup_duration".into(), run.cleanup_duration.into());
    if let Some(url) = run.run_page_url {
        metadata.insert("run_page_url".into(), url.into());
    }

    Ok(draft)
}
