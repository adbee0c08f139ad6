// ABOUTME: Canonical data model shared by normalizers, aggregator and assessor
// ABOUTME: Serialized to JSON for persistence, notification requests and CLI output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::CollectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Airbyte,
    Databricks,
    PowerAutomate,
    SnowflakeTask,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Airbyte,
        Platform::Databricks,
        Platform::PowerAutomate,
        Platform::SnowflakeTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Airbyte => "airbyte",
            Platform::Databricks => "databricks",
            Platform::PowerAutomate => "power_automate",
            Platform::SnowflakeTask => "snowflake_task",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Airbyte => "Airbyte",
            Platform::Databricks => "Databricks",
            Platform::PowerAutomate => "Power Automate",
            Platform::SnowflakeTask => "Snowflake Task",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown platform '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
    Cancelled,
    Pending,
    Unknown,
}

/// Scalar value in a record's platform-specific metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(MetadataValue::Null)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// One observed execution of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusRecord {
    pub job_id: String,
    pub platform: Platform,
    pub job_name: String,
    pub status: JobStatus,
    pub last_run_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u64>,
    pub error_message: Option<String>,
    pub metadata: Metadata,
    pub checked_at: DateTime<Utc>,
}

impl JobStatusRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            job_id: self.job_id.clone(),
            platform: self.platform,
            checked_at: self.checked_at,
        }
    }
}

/// Identity of a record within a session and across upserts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub job_id: String,
    pub platform: Platform,
    pub checked_at: DateTime<Utc>,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.platform,
            self.job_id,
            self.checked_at.to_rfc3339()
        )
    }
}

/// Output of one collector. A failed collection never carries records, so an
/// outage cannot be read as "zero jobs observed".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformResult {
    platform: Platform,
    records: Vec<JobStatusRecord>,
    collection_succeeded: bool,
    collection_error: Option<String>,
    dropped_records: usize,
    duplicate_records: usize,
}

impl PlatformResult {
    pub fn collected(platform: Platform, records: Vec<JobStatusRecord>, dropped_records: usize) -> Self {
        Self {
            platform,
            records,
            collection_succeeded: true,
            collection_error: None,
            dropped_records,
            duplicate_records: 0,
        }
    }

    /// Records skipped because their job id already appeared in the batch.
    pub fn with_duplicates(mut self, duplicate_records: usize) -> Self {
        self.duplicate_records = duplicate_records;
        self
    }

    pub fn failed(platform: Platform, error: &CollectorError) -> Self {
        Self {
            platform,
            records: Vec::new(),
            collection_succeeded: false,
            collection_error: Some(error.to_string()),
            dropped_records: 0,
            duplicate_records: 0,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn records(&self) -> &[JobStatusRecord] {
        &self.records
    }

    pub fn collection_succeeded(&self) -> bool {
        self.collection_succeeded
    }

    pub fn collection_error(&self) -> Option<&str> {
        self.collection_error.as_deref()
    }

    pub fn dropped_records(&self) -> usize {
        self.dropped_records
    }

    pub fn duplicate_records(&self) -> usize {
        self.duplicate_records
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformHealthSummary {
    pub platform: Platform,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub running: usize,
    pub cancelled: usize,
    pub pending: usize,
    pub unknown: usize,
    pub failure_rate: f64,
    pub collection_succeeded: bool,
    pub collection_error: Option<String>,
    pub dropped_records: usize,
    #[serde(default)]
    pub duplicate_records: usize,
}

impl PlatformHealthSummary {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

/// One sealed monitoring cycle. Only the aggregator can build one, and nothing
/// about it changes after sealing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringSession {
    session_id: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    platform_results: Vec<PlatformResult>,
    summaries: BTreeMap<Platform, PlatformHealthSummary>,
}

impl MonitoringSession {
    pub(crate) fn sealed(
        session_id: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        platform_results: Vec<PlatformResult>,
        summaries: BTreeMap<Platform, PlatformHealthSummary>,
    ) -> Self {
        Self {
            session_id,
            started_at,
            completed_at,
            platform_results,
            summaries,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn platform_results(&self) -> &[PlatformResult] {
        &self.platform_results
    }

    pub fn summaries(&self) -> &BTreeMap<Platform, PlatformHealthSummary> {
        &self.summaries
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }

    pub fn records(&self) -> impl Iterator<Item = &JobStatusRecord> {
        self.platform_results.iter().flat_map(|r| r.records().iter())
    }

    pub fn total_jobs(&self) -> usize {
        self.summaries.values().map(|s| s.total).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.summaries.values().map(|s| s.failed).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn priority(&self) -> NotificationPriority {
        match self {
            RiskLevel::Critical => NotificationPriority::Urgent,
            RiskLevel::High => NotificationPriority::High,
            RiskLevel::Medium => NotificationPriority::Normal,
            RiskLevel::Low => NotificationPriority::Low,
        }
    }

    pub fn requires_notification(&self) -> bool {
        !matches!(self, RiskLevel::Low)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            "CRITICAL" => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallHealthAssessment {
    pub risk_level: RiskLevel,
    pub requires_notification: bool,
    pub notification_priority: NotificationPriority,
    pub triggering_platforms: BTreeSet<Platform>,
    pub summary_text: String,
    pub jobs_analyzed: usize,
    pub failed_jobs_count: usize,
    pub failed_collections: usize,
    pub issues: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_carries_no_records() {
        let result = PlatformResult::failed(
            Platform::Databricks,
            &CollectorError::Connection("refused".to_string()),
        );
        assert!(!result.collection_succeeded());
        assert!(result.records().is_empty());
        assert_eq!(result.collection_error(), Some("Connection error: refused"));
    }

    #[test]
    fn test_risk_level_ordering_and_priority() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
        assert_eq!(RiskLevel::Critical.priority(), NotificationPriority::Urgent);
        assert_eq!(RiskLevel::Medium.priority(), NotificationPriority::Normal);
        assert!(!RiskLevel::Low.requires_notification());
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("Power_Automate".parse::<Platform>(), Ok(Platform::PowerAutomate));
        assert!("jenkins".parse::<Platform>().is_err());
    }

    #[test]
    fn test_platform_serializes_snake_case() {
        let json = serde_json::to_string(&Platform::SnowflakeTask).unwrap();
        assert_eq!(json, "\"snowflake_task\"");
    }
}
