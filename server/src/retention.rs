//! Size-ceiling enforcement for the reading collection.
//!
//! Every check fetches the whole collection and measures its JSON encoding.
//! When the ceiling is exceeded the collection is fetched again, ordered by
//! timestamp, and everything but the newest `keep_latest` records is deleted
//! one key at a time. A failed delete aborts the pass; records already
//! deleted stay deleted.

use crate::db::ReadingStore;
use crate::errors::Result;
use crate::metrics::{PRUNED_READINGS_TOTAL, STORE_SIZE_BYTES};
use crate::model::Snapshot;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

pub const DEFAULT_MAX_BYTES: usize = 250 * 1024 * 1024;
pub const DEFAULT_KEEP_LATEST: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Serialized collection size above which pruning starts
    pub max_bytes: usize,
    /// Records kept when pruning
    pub keep_latest: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            keep_latest: DEFAULT_KEEP_LATEST,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionOutcome {
    pub size_bytes: usize,
    pub deleted: usize,
}

pub struct RetentionManager {
    store: Arc<dyn ReadingStore>,
    policy: RetentionPolicy,
    // One pass at a time per process.
    pass: Mutex<()>,
}

impl RetentionManager {
    pub fn new(store: Arc<dyn ReadingStore>, policy: RetentionPolicy) -> Self {
        Self {
            store,
            policy,
            pass: Mutex::new(()),
        }
    }

    /// Byte length of the whole collection's JSON encoding.
    pub async fn database_size(&self) -> Result<usize> {
        match self.store.fetch_all().await? {
            Some(snapshot) => serialized_size(&snapshot),
            None => Ok(0),
        }
    }

    pub async fn enforce(&self) -> Result<RetentionOutcome> {
        let _pass = self.pass.lock().await;

        let size_bytes = self.database_size().await?;
        STORE_SIZE_BYTES.set(size_bytes as f64);

        if size_bytes <= self.policy.max_bytes {
            debug!(
                "Collection size {} bytes within ceiling of {} bytes",
                size_bytes, self.policy.max_bytes
            );
            return Ok(RetentionOutcome {
                size_bytes,
                deleted: 0,
            });
        }

        info!(
            "Collection size {} bytes exceeds ceiling of {} bytes, pruning",
            size_bytes, self.policy.max_bytes
        );

        let snapshot = match self.store.fetch_all().await? {
            Some(snapshot) => snapshot,
            None => {
                return Ok(RetentionOutcome {
                    size_bytes,
                    deleted: 0,
                })
            }
        };

        let excess = select_excess(&snapshot, self.policy.keep_latest);
        let mut deleted = 0;
        for key in &excess {
            if let Err(e) = self.store.delete(key).await {
                error!(
                    "Prune aborted after {} of {} deletions: {}",
                    deleted,
                    excess.len(),
                    e
                );
                PRUNED_READINGS_TOTAL.inc_by(deleted as f64);
                return Err(e);
            }
            deleted += 1;
        }

        PRUNED_READINGS_TOTAL.inc_by(deleted as f64);
        info!(
            "Pruned {} readings, kept the newest {}",
            deleted,
            snapshot.len() - deleted
        );

        Ok(RetentionOutcome {
            size_bytes,
            deleted,
        })
    }
}

pub fn serialized_size(snapshot: &Snapshot) -> Result<usize> {
    Ok(serde_json::to_vec(snapshot)?.len())
}

/// Keys of every record older than the newest `keep` by timestamp.
pub fn select_excess(snapshot: &Snapshot, keep: usize) -> Vec<String> {
    let mut entries: Vec<_> = snapshot.iter().collect();
    entries.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp));

    let excess = entries.len().saturating_sub(keep);
    entries
        .into_iter()
        .take(excess)
        .map(|(key, _)| key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::memory::MemoryStore;
    use crate::model::{Reading, TIMESTAMP_FORMAT};
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store whose `fail_on`-th delete (1-based) is refused.
    struct FailingDeleteStore {
        inner: MemoryStore,
        deletes: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl ReadingStore for FailingDeleteStore {
        async fn fetch_all(&self) -> Result<Option<Snapshot>> {
            self.inner.fetch_all().await
        }

        async fn push(&self, reading: &Reading) -> Result<String> {
            self.inner.push(reading).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            if self.deletes.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(Error::StoreStatus {
                    status: 503,
                    body: "delete refused".to_string(),
                });
            }
            self.inner.delete(key).await
        }
    }

    fn timestamp(offset_secs: i64) -> String {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (base + Duration::seconds(offset_secs))
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    fn manager(store: Arc<MemoryStore>, max_bytes: usize, keep_latest: usize) -> RetentionManager {
        RetentionManager::new(
            store,
            RetentionPolicy {
                max_bytes,
                keep_latest,
            },
        )
    }

    #[test]
    fn test_select_excess_orders_by_timestamp_not_key() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("a".to_string(), Reading::gas(timestamp(30), json!(3)));
        snapshot.insert("b".to_string(), Reading::gas(timestamp(10), json!(1)));
        snapshot.insert("c".to_string(), Reading::gas(timestamp(20), json!(2)));

        assert_eq!(select_excess(&snapshot, 1), vec!["b", "c"]);
        assert!(select_excess(&snapshot, 3).is_empty());
        assert!(select_excess(&snapshot, 10).is_empty());
    }

    #[tokio::test]
    async fn test_prunes_down_to_newest_records() {
        let store = Arc::new(MemoryStore::new());
        // Insert newest first so key order and timestamp order disagree.
        for i in (0..10_005).rev() {
            store
                .insert(&format!("k{:05}", 10_005 - i), Reading::gas(timestamp(i), json!(i)))
                .await;
        }

        let retention = manager(store.clone(), 1024, DEFAULT_KEEP_LATEST);
        let outcome = retention.enforce().await.unwrap();
        assert_eq!(outcome.deleted, 5);

        let snapshot = store.fetch_all().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 10_000);
        let oldest = snapshot.values().map(|r| r.timestamp.clone()).min().unwrap();
        assert_eq!(oldest, timestamp(5));
    }

    #[tokio::test]
    async fn test_under_ceiling_deletes_nothing() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..20 {
            store.push(&Reading::gas(timestamp(i), json!(i))).await.unwrap();
        }

        let retention = manager(store.clone(), DEFAULT_MAX_BYTES, 5);
        let outcome = retention.enforce().await.unwrap();

        assert_eq!(outcome.deleted, 0);
        assert!(outcome.size_bytes > 0);
        assert_eq!(store.len().await, 20);
    }

    #[tokio::test]
    async fn test_oversized_record_triggers_prune() {
        let store = Arc::new(MemoryStore::new());
        let mut bulky = Reading::gas(timestamp(0), json!(1));
        bulky
            .fields
            .insert("blob".to_string(), json!("x".repeat(64 * 1024)));
        store.push(&bulky).await.unwrap();
        store.push(&Reading::gas(timestamp(1), json!(2))).await.unwrap();
        store.push(&Reading::gas(timestamp(2), json!(3))).await.unwrap();

        let retention = manager(store.clone(), 32 * 1024, 2);
        assert!(retention.database_size().await.unwrap() > 64 * 1024);

        let outcome = retention.enforce().await.unwrap();
        assert_eq!(outcome.deleted, 1);

        let snapshot = store.fetch_all().await.unwrap().unwrap();
        assert!(snapshot.values().all(|r| !r.fields.contains_key("blob")));
    }

    #[tokio::test]
    async fn test_second_pass_deletes_nothing() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..12 {
            store.push(&Reading::gas(timestamp(i), json!(i))).await.unwrap();
        }

        // Ceiling stays exceeded after pruning; the second pass finds no excess.
        let retention = manager(store.clone(), 1, 10);
        assert_eq!(retention.enforce().await.unwrap().deleted, 2);
        assert_eq!(retention.enforce().await.unwrap().deleted, 0);
        assert_eq!(store.len().await, 10);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let retention = manager(Arc::new(MemoryStore::new()), 0, 0);
        assert_eq!(retention.database_size().await.unwrap(), 0);
        assert_eq!(
            retention.enforce().await.unwrap(),
            RetentionOutcome::default()
        );
    }

    #[tokio::test]
    async fn test_failed_delete_aborts_pass_and_keeps_earlier_deletes() {
        let store = Arc::new(FailingDeleteStore {
            inner: MemoryStore::new(),
            deletes: AtomicUsize::new(0),
            fail_on: 3,
        });
        for i in 0..10 {
            store.push(&Reading::gas(timestamp(i), json!(i))).await.unwrap();
        }

        let pruned_before = PRUNED_READINGS_TOTAL.get();
        let retention = RetentionManager::new(
            store.clone(),
            RetentionPolicy {
                max_bytes: 1,
                keep_latest: 4,
            },
        );

        let err = retention.enforce().await.unwrap_err();
        assert!(matches!(err, Error::StoreStatus { status: 503, .. }));

        // Two of the six excess records went before the refused delete.
        let snapshot = store.fetch_all().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 8);
        let oldest = snapshot.values().map(|r| r.timestamp.clone()).min().unwrap();
        assert_eq!(oldest, timestamp(2));
        assert_eq!(store.deletes.load(Ordering::SeqCst), 3);

        // The counter is process-wide, so other tests may add to it concurrently.
        assert!(PRUNED_READINGS_TOTAL.get() - pruned_before >= 2.0);
    }
}
