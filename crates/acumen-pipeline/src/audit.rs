//! Append-only audit trail of stage executions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use acumen_types::{AuditRecord, Result};

/// Shared log of per-stage audit records.
///
/// Clones share the same underlying storage, so the engine can append while
/// a caller holds a handle for inspection after the query finishes.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: AuditRecord) {
        self.records.lock().await.push(record);
    }

    /// Records for one query, in the order the stages ran.
    pub async fn for_query(&self, query_id: Uuid) -> Vec<AuditRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.query_id == query_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Write one query's trail to `<dir>/<query_id>.json` and return the path.
    pub async fn persist_query(&self, query_id: Uuid, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let records = self.for_query(query_id).await;
        tokio::fs::create_dir_all(dir.as_ref()).await?;

        let path = dir.as_ref().join(format!("{query_id}.json"));
        let json = serde_json::to_string_pretty(&records)?;
        tokio::fs::write(&path, json).await?;

        tracing::debug!(
            query_id = %query_id,
            path = %path.display(),
            records = records.len(),
            "persisted audit trail"
        );
        Ok(path)
    }
}
