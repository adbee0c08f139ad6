// ABOUTME: JSON file persistence gateway
// ABOUTME: Rewrites the whole document through a temp file and rename on every upsert

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::{PersistenceGateway, SessionSummaryRow, UpsertAck};
use crate::models::{JobStatusRecord, MonitoringSession};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    records: BTreeMap<String, JobStatusRecord>,
    #[serde(default)]
    sessions: BTreeMap<String, SessionSummaryRow>,
}

pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoreDocument> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(StoreDocument::default()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse store file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read store file {}", self.path.display())),
        }
    }

    async fn save(&self, document: &StoreDocument) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(document).context("Failed to serialize store")?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace store file {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Store file written");
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for JsonFileStore {
    async fn upsert_records(&self, records: &[JobStatusRecord]) -> Result<UpsertAck> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        let mut ack = UpsertAck::default();

        for record in records {
            ack.apply(&mut document.records, record.key().to_string(), record.clone());
        }

        if ack.inserted + ack.updated > 0 {
            self.save(&document).await?;
        }
        Ok(ack)
    }

    async fn upsert_session_summary(&self, session: &MonitoringSession) -> Result<UpsertAck> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        let mut ack = UpsertAck::default();

        let row = SessionSummaryRow::from(session);
        ack.apply(&mut document.sessions, row.session_id.clone(), row);

        if ack.inserted + ack.updated > 0 {
            self.save(&document).await?;
        }
        Ok(ack)
    }
}
