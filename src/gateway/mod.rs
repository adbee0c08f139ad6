// ABOUTME: Outbound capability interfaces: persistence and notification gateways
// ABOUTME: The core decides what to persist and whether to notify; gateways do the rest

mod file;
mod memory;
mod notify;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use notify::{LogNotifier, MemoryNotifier};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    JobStatusRecord, MonitoringSession, NotificationPriority, OverallHealthAssessment, Platform,
    PlatformHealthSummary, RiskLevel,
};

/// Result of an idempotent upsert. Writing identical input again only ever
/// increments `unchanged`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertAck {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl UpsertAck {
    pub(crate) fn apply<K: Ord, V: PartialEq>(&mut self, map: &mut BTreeMap<K, V>, key: K, value: V) {
        match map.get_mut(&key) {
            Some(existing) if *existing == value => self.unchanged += 1,
            Some(existing) => {
                *existing = value;
                self.updated += 1;
            }
            None => {
                map.insert(key, value);
                self.inserted += 1;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftAck {
    pub draft_id: String,
}

/// Durable summary of one sealed session, keyed by `session_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummaryRow {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub total_jobs: usize,
    pub failed_jobs: usize,
    pub summaries: Vec<PlatformHealthSummary>,
}

impl From<&MonitoringSession> for SessionSummaryRow {
    fn from(session: &MonitoringSession) -> Self {
        Self {
            session_id: session.session_id().to_string(),
            started_at: session.started_at(),
            completed_at: session.completed_at(),
            duration_seconds: session.duration_seconds(),
            total_jobs: session.total_jobs(),
            failed_jobs: session.total_failed(),
            summaries: session.summaries().values().cloned().collect(),
        }
    }
}

/// Everything a notification collaborator needs to compose and route a
/// message. The core never builds the message body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRequest {
    pub session_id: String,
    pub risk_level: RiskLevel,
    pub priority: NotificationPriority,
    pub triggering_platforms: BTreeSet<Platform>,
    pub failed_jobs_count: usize,
    pub jobs_analyzed: usize,
    pub failed_collections: usize,
    pub summary_text: String,
    pub issues: Vec<String>,
    pub session_duration_seconds: i64,
}

impl NotificationRequest {
    pub fn new(assessment: &OverallHealthAssessment, session: &MonitoringSession) -> Self {
        Self {
            session_id: session.session_id().to_string(),
            risk_level: assessment.risk_level,
            priority: assessment.notification_priority,
            triggering_platforms: assessment.triggering_platforms.clone(),
            failed_jobs_count: assessment.failed_jobs_count,
            jobs_analyzed: assessment.jobs_analyzed,
            failed_collections: assessment.failed_collections,
            summary_text: assessment.summary_text.clone(),
            issues: assessment.issues.clone(),
            session_duration_seconds: session.duration_seconds(),
        }
    }
}

/// Idempotent storage of records keyed by `(job_id, platform, checked_at)` and
/// session summaries keyed by `session_id`.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn upsert_records(&self, records: &[JobStatusRecord]) -> Result<UpsertAck>;
    async fn upsert_session_summary(&self, session: &MonitoringSession) -> Result<UpsertAck>;
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn draft_notification(
        &self,
        assessment: &OverallHealthAssessment,
        session: &MonitoringSession,
    ) -> Result<DraftAck>;
}
