//! indexed_insert_ttl
//!
//! Creates a TTL index with a short expiry (5 seconds). Each worker inserts
//! one document per iteration; its first insert carries `first: true`. At
//! the end, every `first` document must have been removed by the store's
//! TTL monitor.

use crate::assertions::assert_inserted;
use crate::construction::{WorkloadBuilder, WorkloadDescriptor};
use crate::convergence::{assert_soon, ttl_convergence_timeout, DEFAULT_TTL_MONITOR_SLEEP_SECS};
use crate::error::{ConfigurationError, WorkloadError};
use crate::store::{Document, Filter, IndexSpec};
use crate::types::{ThreadLocal, WorkloadState};
use crate::workload::{Workload, WorkloadContext};

/// Indexed timestamp field the TTL applies to
pub const TTL_FIELD: &str = "indexed_insert_ttl";

/// Marker set on each worker's first document
pub const FIRST_FIELD: &str = "first";

/// Teardown failure message
pub const NOT_CONVERGED_MESSAGE: &str = "expected oldest documents with TTL fields to be removed";

/// States of the walk: `init` once per worker, then `insert` forever
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TtlState {
    /// Insert the worker's `first: true` document
    Init,
    /// Insert an ordinary timestamped document
    Insert,
}

impl WorkloadState for TtlState {
    const INIT: Self = TtlState::Init;

    fn name(self) -> &'static str {
        match self {
            TtlState::Init => "init",
            TtlState::Insert => "insert",
        }
    }
}

/// Shared data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlData {
    /// `expireAfterSeconds` of the TTL index
    pub ttl_seconds: u64,
}

/// The workload. `Default` gives 20 threads × 200 iterations, 5 s TTL.
#[derive(Debug, Clone)]
pub struct IndexedInsertTtl {
    /// Concurrent workers
    pub thread_count: usize,
    /// Steps per worker
    pub iterations: u64,
    /// `expireAfterSeconds` of the TTL index
    pub ttl_seconds: u64,
    /// Sleep between store TTL monitor passes the teardown budget assumes
    pub monitor_sleep_secs: u64,
}

impl Default for IndexedInsertTtl {
    fn default() -> Self {
        Self {
            thread_count: 20,
            iterations: 200,
            ttl_seconds: 5,
            monitor_sleep_secs: DEFAULT_TTL_MONITOR_SLEEP_SECS,
        }
    }
}

impl IndexedInsertTtl {
    /// Same as `default()`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the worker count
    #[must_use]
    pub fn with_threads(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Override the steps per worker
    #[must_use]
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Override the index TTL
    #[must_use]
    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Teardown budget for this workload, in or out of CI
    #[must_use]
    pub fn convergence_timeout(&self, ci_environment: bool) -> std::time::Duration {
        ttl_convergence_timeout(self.ttl_seconds, self.monitor_sleep_secs, ci_environment)
    }

    async fn insert_one(
        ctx: &WorkloadContext<TtlData>,
        document: Document,
    ) -> Result<(), WorkloadError> {
        let res = ctx.store().insert(ctx.collection(), document).await?;
        assert_inserted(1, &res)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Workload for IndexedInsertTtl {
    type State = TtlState;
    type Data = TtlData;

    fn name(&self) -> &str {
        "indexed_insert_ttl"
    }

    fn descriptor(&self) -> Result<WorkloadDescriptor<TtlState, TtlData>, ConfigurationError> {
        WorkloadBuilder::new(TtlData {
            ttl_seconds: self.ttl_seconds,
        })
        .thread_count(self.thread_count)
        .iterations(self.iterations)
        .states([TtlState::Init, TtlState::Insert])
        .transition(TtlState::Init, TtlState::Insert, 1.0)
        .transition(TtlState::Insert, TtlState::Insert, 1.0)
        .build()
    }

    async fn setup(&self, ctx: &WorkloadContext<TtlData>) -> Result<(), WorkloadError> {
        let spec = IndexSpec::ascending(TTL_FIELD).expire_after(ctx.data().ttl_seconds);
        ctx.store().create_index(ctx.collection(), spec).await?;
        Ok(())
    }

    async fn execute(
        &self,
        state: TtlState,
        ctx: &WorkloadContext<TtlData>,
        local: &mut ThreadLocal,
    ) -> Result<(), WorkloadError> {
        let now = ctx.clock().now();
        match state {
            TtlState::Init => {
                let doc = Document::new().with(TTL_FIELD, now).with(FIRST_FIELD, true);
                Self::insert_one(ctx, doc).await?;
                local.has_initialized = true;
            }
            TtlState::Insert => {
                Self::insert_one(ctx, Document::new().with(TTL_FIELD, now)).await?;
            }
        }
        Ok(())
    }

    async fn teardown(&self, ctx: &WorkloadContext<TtlData>) -> Result<(), WorkloadError> {
        if ctx.config().running_with_balancer {
            // Migrations hold critical sections that make TTL monitor passes
            // fail; stop them so the wait below is not starved.
            let ns = ctx.namespace();
            ctx.balancer().disable_for_collection(&ns).await?;
            ctx.balancer().join_current_round().await?;
        }

        let timeout = self.convergence_timeout(ctx.config().ci_environment);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(timeout_ms, "waiting for first documents to expire");

        let filter = Filter::field(FIRST_FIELD, true);
        let (store, collection, filter) = (ctx.store(), ctx.collection(), &filter);
        assert_soon(
            move || async move {
                let remaining = store.count(collection, filter).await?;
                tracing::trace!(remaining, "first documents left");
                Ok::<_, WorkloadError>(remaining == 0)
            },
            NOT_CONVERGED_MESSAGE,
            timeout,
            ctx.config().poll_interval(),
        )
        .await
    }
}
