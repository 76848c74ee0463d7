use crate::db::ReadingStore;
use crate::errors::Result;
use crate::model::{Reading, Snapshot};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process store used when no database URL is configured.
///
/// Keys start with a zero-padded sequence number so they sort in insertion
/// order, like the push ids of the remote store.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Snapshot>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Insert a record under a caller-chosen key.
    #[cfg(test)]
    pub async fn insert(&self, key: &str, reading: Reading) {
        self.records.write().await.insert(key.to_string(), reading);
    }

    fn next_key(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{:012}-{}", seq, Uuid::new_v4().simple())
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn fetch_all(&self) -> Result<Option<Snapshot>> {
        let records = self.records.read().await;
        if records.is_empty() {
            Ok(None)
        } else {
            Ok(Some(records.clone()))
        }
    }

    async fn push(&self, reading: &Reading) -> Result<String> {
        let key = self.next_key();
        self.records.write().await.insert(key.clone(), reading.clone());
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.records.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_fetch_delete() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            assert!(store.fetch_all().await.unwrap().is_none());

            let first = store
                .push(&Reading::gas("2024-05-01 10:00:00".to_string(), json!(1)))
                .await
                .unwrap();
            let second = store
                .push(&Reading::gas("2024-05-01 10:00:01".to_string(), json!(2)))
                .await
                .unwrap();
            assert!(first < second);

            store.delete(&first).await.unwrap();
            store.delete(&first).await.unwrap();

            let snapshot = store.fetch_all().await.unwrap().unwrap();
            assert_eq!(snapshot.len(), 1);
            assert!(snapshot.contains_key(&second));
        });
    }
}
