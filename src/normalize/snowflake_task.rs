// ABOUTME: Snowflake TASK_HISTORY row normalization
// ABOUTME: Column names are accepted in upper or lower case; offset-less times are UTC

use serde::Deserialize;
use serde_json::Value;

use super::{duration_between, lenient, map_status, scalar_metadata, scalar_text, timestamp_value, Draft, StatusTable};
use crate::error::NormalizationDrop;
use crate::models::JobStatus;

const STATUS_TABLE: StatusTable = &[
    ("succeeded", JobStatus::Success),
    ("failed", JobStatus::Failed),
    ("failed_and_auto_suspended", JobStatus::Failed),
    ("cancelled", JobStatus::Cancelled),
    ("executing", JobStatus::Running),
    ("running", JobStatus::Running),
    ("scheduled", JobStatus::Pending),
    ("skipped", JobStatus::Cancelled),
];

// Alternate column names are separate fields so a row carrying both still
// deserializes; only the upper/lower case spelling of one column is aliased.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct TaskHistoryRow {
    #[serde(alias = "name")]
    name: Option<Value>,
    #[serde(default, alias = "database_name", deserialize_with = "lenient")]
    database_name: Option<String>,
    #[serde(default, alias = "schema_name", deserialize_with = "lenient")]
    schema_name: Option<String>,
    #[serde(alias = "state")]
    state: Option<Value>,
    #[serde(alias = "scheduled_time")]
    scheduled_time: Option<Value>,
    #[serde(alias = "started_time")]
    started_time: Option<Value>,
    #[serde(alias = "query_start_time")]
    query_start_time: Option<Value>,
    #[serde(alias = "completed_time")]
    completed_time: Option<Value>,
    #[serde(alias = "query_id")]
    query_id: Option<Value>,
    #[serde(alias = "root_task_id")]
    root_task_id: Option<Value>,
    #[serde(alias = "graph_run_id")]
    graph_run_id: Option<Value>,
    #[serde(alias = "graph_run_group_id")]
    graph_run_group_id: Option<Value>,
    #[serde(alias = "run_id")]
    run_id: Option<Value>,
    #[serde(alias = "error_code")]
    error_code: Option<Value>,
    #[serde(default, alias = "error_message", deserialize_with = "lenient")]
    error_message: Option<String>,
}

pub(super) fn normalize(raw: &Value) -> Result<Draft, NormalizationDrop> {
    let row = TaskHistoryRow::deserialize(raw)
        .map_err(|e| NormalizationDrop::new(format!("snowflake task row shape: {}", e)))?;

    let name = row
        .name
        .as_ref()
        .and_then(scalar_text)
        .ok_or_else(|| NormalizationDrop::new("snowflake task row has no NAME"))?;

    let run_ref = row
        .run_id
        .as_ref()
        .and_then(scalar_text)
        .or_else(|| row.query_id.as_ref().and_then(scalar_text))
        .unwrap_or_else(|| "unknown".to_string());

    let database = row.database_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let schema = row.schema_name.as_deref().map(str::trim).filter(|s| !s.is_empty());

    // Task names are unique per schema, and every task fired by one schedule
    // shares a RUN_ID, so the id carries the qualified name.
    let job_name = match (database, schema) {
        (Some(db), Some(schema)) => format!("{}.{}.{}", db, schema, name),
        _ => name.clone(),
    };

    let raw_status = row.state.as_ref().and_then(scalar_text);
    let status = raw_status.as_deref().and_then(|s| map_status(STATUS_TABLE, s));

    let started = timestamp_value(row.started_time.as_ref().or(row.query_start_time.as_ref()));
    let completed = timestamp_value(row.completed_time.as_ref());

    let mut draft = Draft {
        job_id: format!("snowflake_task_{}_{}", job_name, run_ref),
        job_name,
        status,
        raw_status,
        last_run_time: started,
        duration_seconds: duration_between(started, completed),
        error_message: row.error_message,
        ..Draft::default()
    };

    let metadata = &mut draft.metadata;
    metadata.insert("database_name".into(), row.database_name.into());
    metadata.insert("schema_name".into(), row.schema_name.into());
    metadata.insert("root_task_id".into(), scalar_metadata(row.root_task_id.as_ref()));
    metadata.insert(
        "graph_run_id".into(),
        scalar_metadata(row.graph_run_id.as_ref().or(row.graph_run_group_id.as_ref())),
    );
    metadata.insert("run_id".into(), scalar_metadata(row.run_id.as_ref()));
    metadata.insert("error_code".into(), scalar_metadata(row.error_code.as_ref()));
    metadata.insert("scheduled_time".into(), scalar_metadata(row.scheduled_time.as_ref()));

    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::super::normalize as normalize_record;
    use crate::models::{JobStatus, Platform};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_failed_task_row() {
        let raw = json!({
            "NAME": "LOAD_ORDERS",
            "DATABASE_NAME": "ANALYTICS",
            "SCHEMA_NAME": "STAGING",
            "STATE": "FAILED",
            "STARTED_TIME": "2024-01-15 10:30:00.000",
            "COMPLETED_TIME": "2024-01-15 10:32:00.000",
            "RUN_ID": 1705314600000i64,
            "ERROR_CODE": "100038",
            "ERROR_MESSAGE": "Numeric value 'abc' is not recognized"
        });
        let record = normalize_record(Platform::SnowflakeTask, &raw, Utc::now()).unwrap();

        assert_eq!(record.job_id, "snowflake_task_ANALYTICS.STAGING.LOAD_ORDERS_1705314600000");
        assert_eq!(record.job_name, "ANALYTICS.STAGING.LOAD_ORDERS");
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.duration_seconds, Some(120));
        assert_eq!(
            record.last_run_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap())
        );
        assert!(record.error_message.is_some());
    }

    #[test]
    fn test_lowercase_columns_and_scheduled_state() {
        let raw = json!({"name": "REFRESH", "state": "scheduled", "query_id": "01b2"});
        let record = normalize_record(Platform::SnowflakeTask, &raw, Utc::now()).unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.job_id, "snowflake_task_REFRESH_01b2");
        assert_eq!(record.job_name, "REFRESH");
    }

    #[test]
    fn test_skipped_is_cancelled_and_error_is_cleared() {
        let raw = json!({"NAME": "T", "STATE": "SKIPPED", "ERROR_MESSAGE": "previous run still executing"});
        let record = normalize_record(Platform::SnowflakeTask, &raw, Utc::now()).unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert_eq!(record.error_message, None);
    }
}
