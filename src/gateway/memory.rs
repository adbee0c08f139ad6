// ABOUTME: In-memory persistence gateway
// ABOUTME: Used for dry runs and as the reference fake for idempotency tests

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::{PersistenceGateway, SessionSummaryRow, UpsertAck};
use crate::models::{JobStatusRecord, MonitoringSession, RecordKey};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<RecordKey, JobStatusRecord>>,
    sessions: Mutex<BTreeMap<String, SessionSummaryRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<JobStatusRecord> {
        self.records.lock().await.values().cloned().collect()
    }

    pub async fn sessions(&self) -> Vec<SessionSummaryRow> {
        self.sessions.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn upsert_records(&self, records: &[JobStatusRecord]) -> Result<UpsertAck> {
        let mut stored = self.records.lock().await;
        let mut ack = UpsertAck::default();
        for record in records {
            ack.apply(&mut stored, record.key(), record.clone());
        }
        Ok(ack)
    }

    async fn upsert_session_summary(&self, session: &MonitoringSession) -> Result<UpsertAck> {
        let mut stored = self.sessions.lock().await;
        let mut ack = UpsertAck::default();
        let row = SessionSummaryRow::from(session);
        ack.apply(&mut stored, row.session_id.clone(), row);
        Ok(ack)
    }
}
