// ABOUTME: Notification gateways that record draft requests instead of sending mail
// ABOUTME: LogNotifier emits the request as a structured log event, MemoryNotifier keeps it

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{DraftAck, NotificationGateway, NotificationRequest};
use crate::models::{MonitoringSession, OverallHealthAssessment};

#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationGateway for LogNotifier {
    async fn draft_notification(
        &self,
        assessment: &OverallHealthAssessment,
        session: &MonitoringSession,
    ) -> Result<DraftAck> {
        let request = NotificationRequest::new(assessment, session);
        let payload = serde_json::to_string(&request).context("Failed to serialize notification request")?;
        let draft_id = format!("draft_{}", Uuid::new_v4().simple());

        info!(
            draft_id = %draft_id,
            session_id = %request.session_id,
            risk_level = %request.risk_level,
            priority = ?request.priority,
            request = %payload,
            "Notification drafted"
        );

        Ok(DraftAck { draft_id })
    }
}

#[derive(Debug, Default)]
pub struct MemoryNotifier {
    drafts: Mutex<Vec<NotificationRequest>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn drafts(&self) -> Vec<NotificationRequest> {
        self.drafts.lock().await.clone()
    }
}

#[async_trait]
impl NotificationGateway for MemoryNotifier {
    async fn draft_notification(
        &self,
        assessment: &OverallHealthAssessment,
        session: &MonitoringSession,
    ) -> Result<DraftAck> {
        let mut drafts = self.drafts.lock().await;
        drafts.push(NotificationRequest::new(assessment, session));
        Ok(DraftAck {
            draft_id: format!("draft_{}", drafts.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessor::HealthAssessor;
    use crate::models::{JobStatus, NotificationPriority, Platform, RiskLevel};
    use crate::test_support::{collected, session};

    #[tokio::test]
    async fn test_memory_notifier_keeps_request_fields() {
        let sealed = session(vec![collected(
            Platform::Airbyte,
            &[(JobStatus::Failed, 1), (JobStatus::Success, 5)],
        )]);
        let assessment = HealthAssessor::default().assess(&sealed);

        let notifier = MemoryNotifier::new();
        let ack = notifier.draft_notification(&assessment, &sealed).await.unwrap();
        let drafts = notifier.drafts().await;

        assert_eq!(ack.draft_id, "draft_1");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].risk_level, RiskLevel::Medium);
        assert_eq!(drafts[0].priority, NotificationPriority::Normal);
        assert_eq!(drafts[0].session_id, sealed.session_id());
    }

    #[tokio::test]
    async fn test_log_notifier_acknowledges() {
        let sealed = session(Vec::new());
        let assessment = HealthAssessor::default().assess(&sealed);
        let ack = LogNotifier.draft_notification(&assessment, &sealed).await.unwrap();
        assert!(ack.draft_id.starts_with("draft_"));
    }
}
