// ABOUTME: Converts platform-native raw job records into canonical JobStatusRecords
// ABOUTME: Pure and deterministic; bad statuses become Unknown, bad timestamps become None

mod airbyte;
mod databricks;
mod power_automate;
mod snowflake_task;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::NormalizationDrop;
use crate::models::{JobStatus, JobStatusRecord, Metadata, MetadataValue, Platform};

/// A platform-native job record exactly as the platform client returned it.
pub type RawJobRecord = Value;

/// Case-insensitive mapping from a platform's status vocabulary to `JobStatus`.
pub type StatusTable = &'static [(&'static str, JobStatus)];

pub const RAW_STATUS_KEY: &str = "raw_status";

/// Normalize one raw record observed at `checked_at`.
///
/// The only failure is a record with no usable identity (or one that is not the
/// platform's record shape at all). Unmappable statuses and unparseable
/// timestamps are contained in the returned record.
pub fn normalize(
    platform: Platform,
    raw: &RawJobRecord,
    checked_at: DateTime<Utc>,
) -> Result<JobStatusRecord, NormalizationDrop> {
    if !raw.is_object() {
        return Err(NormalizationDrop::new(format!(
            "{} record is not an object",
            platform
        )));
    }

    let draft = match platform {
        Platform::Airbyte => airbyte::normalize(raw)?,
        Platform::Databricks => databricks::normalize(raw)?,
        Platform::PowerAutomate => power_automate::normalize(raw)?,
        Platform::SnowflakeTask => snowflake_task::normalize(raw)?,
    };

    Ok(draft.into_record(platform, checked_at))
}

/// Platform-independent intermediate form; `into_record` applies the rules
/// every platform shares.
#[derive(Debug, Default)]
pub(crate) struct Draft {
    pub job_id: String,
    pub job_name: String,
    pub status: Option<JobStatus>,
    pub raw_status: Option<String>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u64>,
    pub error_message: Option<String>,
    pub metadata: Metadata,
}

impl Draft {
    fn into_record(self, platform: Platform, checked_at: DateTime<Utc>) -> JobStatusRecord {
        let status = self.status.unwrap_or(JobStatus::Unknown);
        let mut metadata = self.metadata;
        if status == JobStatus::Unknown {
            metadata.insert(RAW_STATUS_KEY.to_string(), self.raw_status.into());
        }

        let error_message = match status {
            JobStatus::Failed => self.error_message.filter(|m| !m.trim().is_empty()),
            _ => None,
        };

        JobStatusRecord {
            job_id: self.job_id,
            platform,
            job_name: self.job_name,
            status,
            last_run_time: self.last_run_time,
            duration_seconds: self.duration_seconds,
            error_message,
            metadata,
            checked_at,
        }
    }
}

/// Field deserializer for everything but a record's identity: a value of the
/// wrong type reads as absent instead of rejecting the whole record.
/// Use with `#[serde(default, deserialize_with = "lenient")]`.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

pub(crate) fn map_status(table: StatusTable, raw: &str) -> Option<JobStatus> {
    let needle = raw.trim();
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(needle))
        .map(|(_, status)| *status)
}

/// Render a scalar JSON value as text; ids arrive as strings or numbers
/// depending on the platform API version.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn scalar_metadata(value: Option<&Value>) -> MetadataValue {
    match value {
        Some(Value::String(s)) => MetadataValue::Text(s.clone()),
        Some(Value::Bool(b)) => MetadataValue::Bool(*b),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => MetadataValue::Int(i),
            None => n.as_f64().map(MetadataValue::Float).unwrap_or(MetadataValue::Null),
        },
        Some(other @ (Value::Array(_) | Value::Object(_))) => MetadataValue::Text(other.to_string()),
        Some(Value::Null) | None => MetadataValue::Null,
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Parse a platform timestamp. Values without an offset are read as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub(crate) fn timestamp_value(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value.and_then(Value::as_str).and_then(parse_timestamp)
}

pub(crate) fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}

/// Whole seconds between two instants; a negative span is discarded.
pub(crate) fn duration_between(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<u64> {
    let seconds = (end? - start?).num_seconds();
    u64::try_from(seconds).ok()
}
