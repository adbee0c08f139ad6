// ABOUTME: One monitoring cycle end to end: aggregate, assess, persist, notify
// ABOUTME: Gateway failures are recorded on the outcome and never abort the cycle

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::aggregator::SessionAggregator;
use crate::assessor::HealthAssessor;
use crate::collector::StatusSource;
use crate::gateway::{NotificationGateway, PersistenceGateway, UpsertAck};
use crate::models::{
    JobStatusRecord, MonitoringSession, OverallHealthAssessment, Platform, PlatformHealthSummary,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistenceOutcome {
    Stored { records: UpsertAck, session: UpsertAck },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationOutcome {
    NotRequired,
    /// Required, but no notification gateway is configured.
    Suppressed,
    Drafted { draft_id: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub summaries: Vec<PlatformHealthSummary>,
    pub assessment: OverallHealthAssessment,
    pub persistence: PersistenceOutcome,
    pub notification: NotificationOutcome,
    #[serde(skip)]
    pub session: MonitoringSession,
}

pub struct Monitor {
    aggregator: SessionAggregator,
    assessor: HealthAssessor,
    store: Arc<dyn PersistenceGateway>,
    notifier: Option<Arc<dyn NotificationGateway>>,
}

impl Monitor {
    pub fn new(
        aggregator: SessionAggregator,
        assessor: HealthAssessor,
        store: Arc<dyn PersistenceGateway>,
        notifier: Option<Arc<dyn NotificationGateway>>,
    ) -> Self {
        Self {
            aggregator,
            assessor,
            store,
            notifier,
        }
    }

    pub async fn run_cycle(&self, sources: Vec<(Platform, Arc<dyn StatusSource>)>) -> CycleOutcome {
        let session = self.aggregator.aggregate(sources).await;
        let assessment = self.assessor.assess(&session);

        let persistence = self.persist(&session).await;
        let notification = self.notify(&assessment, &session).await;

        info!(
            session_id = %session.session_id(),
            risk_level = %assessment.risk_level,
            persisted = matches!(persistence, PersistenceOutcome::Stored { .. }),
            notified = matches!(notification, NotificationOutcome::Drafted { .. }),
            "Monitoring cycle complete"
        );

        CycleOutcome {
            session_id: session.session_id().to_string(),
            started_at: session.started_at(),
            completed_at: session.completed_at(),
            summaries: session.summaries().values().cloned().collect(),
            assessment,
            persistence,
            notification,
            session,
        }
    }

    async fn persist(&self, session: &MonitoringSession) -> PersistenceOutcome {
        let records: Vec<JobStatusRecord> = session.records().cloned().collect();

        let records_ack = match self.store.upsert_records(&records).await {
            Ok(ack) => ack,
            Err(e) => {
                error!(session_id = %session.session_id(), error = %format!("{:#}", e), "Failed to persist job records");
                return PersistenceOutcome::Failed {
                    error: format!("{:#}", e),
                };
            }
        };

        match self.store.upsert_session_summary(session).await {
            Ok(session_ack) => PersistenceOutcome::Stored {
                records: records_ack,
                session: session_ack,
            },
            Err(e) => {
                error!(session_id = %session.session_id(), error = %format!("{:#}", e), "Failed to persist session summary");
                PersistenceOutcome::Failed {
                    error: format!("{:#}", e),
                }
            }
        }
    }

    async fn notify(
        &self,
        assessment: &OverallHealthAssessment,
        session: &MonitoringSession,
    ) -> NotificationOutcome {
        if !assessment.requires_notification {
            return NotificationOutcome::NotRequired;
        }

        let Some(notifier) = &self.notifier else {
            info!(session_id = %session.session_id(), "Notification required but notifications are disabled");
            return NotificationOutcome::Suppressed;
        };

        match notifier.draft_notification(assessment, session).await {
            Ok(ack) => NotificationOutcome::Drafted {
                draft_id: ack.draft_id,
            },
            Err(e) => {
                error!(session_id = %session.session_id(), error = %format!("{:#}", e), "Failed to draft notification");
                NotificationOutcome::Failed {
                    error: format!("{:#}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::source_fn;
    use crate::error::CollectorError;
    use crate::gateway::{MemoryNotifier, MemoryStore};
    use crate::models::RiskLevel;
    use crate::normalize::RawJobRecord;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn ok_source(records: Vec<RawJobRecord>) -> Arc<dyn StatusSource> {
        Arc::new(source_fn(move || {
            let records = records.clone();
            async move { Ok::<_, CollectorError>(records) }
        }))
    }

    fn failing_source() -> Arc<dyn StatusSource> {
        Arc::new(source_fn(|| async {
            Err::<Vec<RawJobRecord>, _>(CollectorError::Connection("503 from workspace".to_string()))
        }))
    }

    fn four_platforms() -> Vec<(Platform, Arc<dyn StatusSource>)> {
        vec![
            (
                Platform::Airbyte,
                ok_source(vec![
                    json!({"jobId": "a1", "status": "succeeded"}),
                    json!({"jobId": "a2", "status": "succeeded"}),
                    json!({"jobId": "a3", "status": "succeeded"}),
                ]),
            ),
            (Platform::Databricks, failing_source()),
            (
                Platform::PowerAutomate,
                ok_source(vec![
                    json!({"name": "r1", "flowId": "f", "properties": {"status": "Failed"}}),
                    json!({"name": "r2", "flowId": "f", "properties": {"status": "Succeeded"}}),
                    json!({"name": "r3", "flowId": "f", "properties": {"status": "Succeeded"}}),
                ]),
            ),
            (Platform::SnowflakeTask, ok_source(Vec::new())),
        ]
    }

    struct BrokenStore;

    #[async_trait]
    impl PersistenceGateway for BrokenStore {
        async fn upsert_records(&self, _records: &[JobStatusRecord]) -> Result<UpsertAck> {
            anyhow::bail!("warehouse unavailable")
        }

        async fn upsert_session_summary(&self, _session: &MonitoringSession) -> Result<UpsertAck> {
            anyhow::bail!("warehouse unavailable")
        }
    }

    #[tokio::test]
    async fn test_four_platform_scenario() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let monitor = Monitor::new(
            SessionAggregator::new(Duration::from_secs(5)),
            HealthAssessor::default(),
            store.clone(),
            Some(notifier.clone()),
        );

        let outcome = monitor.run_cycle(four_platforms()).await;

        let summaries = outcome.session.summaries();
        assert_eq!(summaries.len(), 4);
        assert!(!summaries[&Platform::Databricks].collection_succeeded);
        assert_eq!(summaries[&Platform::Airbyte].succeeded, 3);
        assert_eq!(summaries[&Platform::PowerAutomate].failed, 1);
        assert_eq!(summaries[&Platform::SnowflakeTask].total, 0);
        assert!(summaries[&Platform::SnowflakeTask].collection_succeeded);

        assert_eq!(outcome.assessment.risk_level, RiskLevel::Medium);
        assert!(outcome.assessment.requires_notification);
        assert_eq!(
            outcome.assessment.triggering_platforms,
            BTreeSet::from([Platform::PowerAutomate])
        );

        assert!(matches!(outcome.persistence, PersistenceOutcome::Stored { .. }));
        assert_eq!(store.records().await.len(), 6);
        assert_eq!(store.sessions().await.len(), 1);

        assert!(matches!(outcome.notification, NotificationOutcome::Drafted { .. }));
        assert_eq!(notifier.drafts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_healthy_cycle_does_not_notify() {
        let notifier = Arc::new(MemoryNotifier::new());
        let monitor = Monitor::new(
            SessionAggregator::default(),
            HealthAssessor::default(),
            Arc::new(MemoryStore::new()),
            Some(notifier.clone()),
        );

        let outcome = monitor
            .run_cycle(vec![(
                Platform::Airbyte,
                ok_source(vec![json!({"jobId": "1", "status": "running"})]),
            )])
            .await;

        assert_eq!(outcome.assessment.risk_level, RiskLevel::Low);
        assert_eq!(outcome.notification, NotificationOutcome::NotRequired);
        assert!(notifier.drafts().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_does_not_abort_cycle() {
        let notifier = Arc::new(MemoryNotifier::new());
        let monitor = Monitor::new(
            SessionAggregator::default(),
            HealthAssessor::default(),
            Arc::new(BrokenStore),
            Some(notifier.clone()),
        );

        let outcome = monitor.run_cycle(four_platforms()).await;

        match &outcome.persistence {
            PersistenceOutcome::Failed { error } => assert!(error.contains("warehouse unavailable")),
            other => panic!("expected persistence failure, got {:?}", other),
        }
        assert!(matches!(outcome.notification, NotificationOutcome::Drafted { .. }));
    }

    #[tokio::test]
    async fn test_blackout_without_notifier_is_suppressed() {
        let monitor = Monitor::new(
            SessionAggregator::default(),
            HealthAssessor::default(),
            Arc::new(MemoryStore::new()),
            None,
        );

        let outcome = monitor.run_cycle(Vec::new()).await;

        assert_eq!(outcome.assessment.risk_level, RiskLevel::Critical);
        assert_eq!(outcome.notification, NotificationOutcome::Suppressed);
        assert_eq!(outcome.assessment.jobs_analyzed, 0);
    }

    #[test]
    fn test_outcome_status_tags() {
        let json = serde_json::to_value(NotificationOutcome::Drafted {
            draft_id: "d".to_string(),
        })
        .unwrap();
        assert_eq!(json, json!({"status": "drafted", "draft_id": "d"}));
    }
}
