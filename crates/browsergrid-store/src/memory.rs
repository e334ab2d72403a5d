//! In-memory session store implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::store::{SessionRecord, SessionStore, StoreError};

/// In-memory session store, for development and tests.
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.session.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let records = self.records.read().await;
        let now = Utc::now();
        Ok(records
            .get(session_id)
            .filter(|r| !r.is_expired(now))
            .cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(session_id);
        Ok(())
    }

    async fn query_by_project(&self, project_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let records = self.records.read().await;
        let now = Utc::now();
        let mut matches: Vec<_> = records
            .values()
            .filter(|r| r.session.project_id == project_id && !r.is_expired(now))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.session.created_at.cmp(&a.session.created_at));
        Ok(matches)
    }

    async fn cleanup(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use browsergrid_core::{CreateSessionOptions, Session};
    use std::time::Duration;

    fn record(project: &str) -> SessionRecord {
        SessionRecord::with_ttl(Session::new(project, CreateSessionOptions::default()), None)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemorySessionStore::new();
        let rec = record("p1");
        let id = rec.session.id.clone();

        store.put(&rec).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_some());

        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemorySessionStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_by_project_newest_first() {
        let store = MemorySessionStore::new();
        let mut first = record("p1");
        first.session.created_at = Utc::now() - chrono::Duration::seconds(10);
        let second = record("p1");
        let other = record("p2");

        store.put(&first).await.unwrap();
        store.put(&second).await.unwrap();
        store.put(&other).await.unwrap();

        let results = store.query_by_project("p1").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].session.id, second.session.id);
        assert_eq!(results[1].session.id, first.session.id);
    }

    #[tokio::test]
    async fn test_expired_record_reads_as_absent() {
        let store = MemorySessionStore::new();
        let mut rec = SessionRecord::with_ttl(
            Session::new("p1", CreateSessionOptions::default()),
            Some(Duration::from_secs(60)),
        );
        rec.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let id = rec.session.id.clone();
        store.put(&rec).await.unwrap();

        assert!(store.get(&id).await.unwrap().is_none());
        assert_eq!(store.cleanup().await.unwrap(), 1);
    }
}
