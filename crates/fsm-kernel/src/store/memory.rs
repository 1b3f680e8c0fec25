//! In-memory document store with a periodic TTL monitor
//!
//! Documents live in per-collection vectors behind a `parking_lot` lock.
//! Expiry is never applied on read: like a real TTL monitor, removal only
//! happens when a sweep runs, so a workload has to wait for the next pass.

use super::{Document, DocumentStore, FieldValue, Filter, IndexSpec, InsertResult};
use crate::clock::Clock;
use crate::error::StoreError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Sleep between TTL monitor passes unless configured otherwise
pub const DEFAULT_TTL_MONITOR_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct CollectionData {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

/// In-memory store
#[derive(Debug)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, CollectionData>>,
    clock: Clock,
    sweeps: AtomicU64,
    expired: AtomicU64,
}

impl MemoryStore {
    /// Empty store on a fresh clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    /// Empty store sharing `clock`
    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            clock,
            sweeps: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Clock used to judge expiry
    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Number of documents currently in `collection`
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }

    /// Snapshot of the indexes on `collection`
    #[must_use]
    pub fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }

    /// Completed sweep passes
    #[must_use]
    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Documents removed by all sweeps so far
    #[must_use]
    pub fn expired_count(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    /// One TTL monitor pass over every collection.
    ///
    /// A document is removed when its TTL-indexed field holds a timestamp
    /// more than `expireAfterSeconds` in the past. Documents whose field is
    /// missing or not a timestamp are kept.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;

        {
            let mut collections = self.collections.write();
            for (name, data) in collections.iter_mut() {
                let ttls: Vec<(String, i64)> = data
                    .indexes
                    .iter()
                    .filter_map(IndexSpec::ttl_field)
                    .map(|(f, secs)| (f.to_string(), i64::try_from(secs).unwrap_or(i64::MAX)))
                    .collect();
                if ttls.is_empty() {
                    continue;
                }

                let before = data.documents.len();
                data.documents.retain(|doc| {
                    !ttls.iter().any(|(field, secs)| match doc.get(field) {
                        Some(FieldValue::Timestamp(ts)) => {
                            now.signed_duration_since(*ts) > chrono::Duration::seconds(*secs)
                        }
                        _ => false,
                    })
                });
                let gone = before - data.documents.len();
                if gone > 0 {
                    tracing::debug!(collection = %name, removed = gone, "ttl sweep removed documents");
                }
                removed += gone;
            }
        }

        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Run `sweep_expired` every `period`, first pass one period from now.
    ///
    /// The monitor stops when the returned handle is dropped.
    #[must_use]
    pub fn spawn_ttl_monitor(self: &Arc<Self>, period: Duration) -> TtlMonitor {
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = store.sweep_expired();
                tracing::trace!(removed, pass = store.sweep_count(), "ttl monitor pass");
            }
        });
        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(period_ms, "ttl monitor started");
        TtlMonitor { handle }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(
        &self,
        collection: &str,
        document: Document,
    ) -> Result<InsertResult, StoreError> {
        if document.is_empty() {
            return Err(StoreError::Validation("cannot insert an empty document".into()));
        }
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .documents
            .push(document);
        Ok(InsertResult { n_inserted: 1 })
    }

    async fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let data = collections.entry(collection.to_string()).or_default();

        if let Some(existing) = data.indexes.iter().find(|i| i.keys == spec.keys) {
            if existing.expire_after_seconds == spec.expire_after_seconds {
                return Ok(());
            }
            return Err(StoreError::IndexConflict {
                collection: collection.to_string(),
                reason: format!(
                    "index {} already exists with different options",
                    spec.name()
                ),
            });
        }

        tracing::debug!(collection, index = %spec.name(), ttl = ?spec.expire_after_seconds, "index created");
        data.indexes.push(spec);
        Ok(())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let collections = self.collections.read();
        let n = collections
            .get(collection)
            .map_or(0, |c| c.documents.iter().filter(|d| filter.matches(d)).count());
        Ok(n as u64)
    }
}

/// Handle to a running TTL monitor; aborts the task on drop
#[derive(Debug)]
pub struct TtlMonitor {
    handle: JoinHandle<()>,
}

impl TtlMonitor {
    /// Stop the monitor now
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for TtlMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
