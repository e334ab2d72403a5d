//! File-based session store implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::store::{SessionRecord, SessionStore, StoreError};

/// File-based session store. One JSON file per session, for local
/// development deployments that must survive a restart.
pub struct FileSessionStore {
    directory: PathBuf,
}

impl FileSessionStore {
    /// Create a new file session store rooted at `directory`.
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", id))
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = name.strip_suffix(".json") {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    async fn read_record(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn put(&self, record: &SessionRecord) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let json = serde_json::to_string_pretty(record)?;
        let path = self.record_path(&record.session.id);
        tokio::fs::write(&path, json).await?;
        debug!("Saved session {} to {:?}", record.session.id, path);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let now = Utc::now();
        Ok(self
            .read_record(session_id)
            .await?
            .filter(|r| !r.is_expired(now)))
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let path = self.record_path(session_id);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
            debug!("Deleted session file: {:?}", path);
        }
        Ok(())
    }

    async fn query_by_project(&self, project_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let now = Utc::now();
        let mut matches = Vec::new();
        for id in self.list_ids().await? {
            if let Some(record) = self.read_record(&id).await? {
                if record.session.project_id == project_id && !record.is_expired(now) {
                    matches.push(record);
                }
            }
        }
        matches.sort_by(|a, b| b.session.created_at.cmp(&a.session.created_at));
        Ok(matches)
    }

    async fn cleanup(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut cleaned = 0;

        for id in self.list_ids().await? {
            if let Some(record) = self.read_record(&id).await? {
                if record.is_expired(now) {
                    self.delete(&id).await?;
                    cleaned += 1;
                    info!("Evicted expired session record: {}", id);
                }
            }
        }

        Ok(cleaned)
    }
}
