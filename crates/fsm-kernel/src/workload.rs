//! Workload contract
//!
//! A workload supplies a validated descriptor, one handler per state (as an
//! exhaustive `match` in [`Workload::execute`]), and optional setup and
//! teardown hooks. The driver owns scheduling, barriers and reporting.

use crate::balancer::Balancer;
use crate::clock::Clock;
use crate::config::HarnessConfig;
use crate::construction::WorkloadDescriptor;
use crate::error::{ConfigurationError, WorkloadError};
use crate::store::DocumentStore;
use crate::types::{ThreadLocal, WorkloadState};
use std::fmt;
use std::sync::Arc;

/// Handles every hook and state function receives
pub struct WorkloadContext<D> {
    store: Arc<dyn DocumentStore>,
    balancer: Arc<dyn Balancer>,
    config: Arc<HarnessConfig>,
    collection: Arc<str>,
    data: Arc<D>,
    clock: Clock,
}

impl<D> WorkloadContext<D> {
    /// Bundle the shared handles one run hands to every state function
    pub fn new(
        store: Arc<dyn DocumentStore>,
        balancer: Arc<dyn Balancer>,
        config: Arc<HarnessConfig>,
        collection: impl Into<Arc<str>>,
        data: Arc<D>,
        clock: Clock,
    ) -> Self {
        Self {
            store,
            balancer,
            config,
            collection: collection.into(),
            data,
            clock,
        }
    }

    /// Store under test
    #[inline]
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Balancer control surface
    #[inline]
    pub fn balancer(&self) -> &dyn Balancer {
        self.balancer.as_ref()
    }

    /// Harness flags for this run
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Collection the workload writes to
    #[inline]
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// `<db>.<collection>`
    #[must_use]
    pub fn namespace(&self) -> String {
        self.config.namespace(&self.collection)
    }

    /// Shared read-only workload data
    #[inline]
    #[must_use]
    pub fn data(&self) -> &D {
        &self.data
    }

    /// Clock used for document timestamps
    #[inline]
    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }
}

impl<D> Clone for WorkloadContext<D> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            balancer: Arc::clone(&self.balancer),
            config: Arc::clone(&self.config),
            collection: Arc::clone(&self.collection),
            data: Arc::clone(&self.data),
            clock: self.clock,
        }
    }
}

impl<D> fmt::Debug for WorkloadContext<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadContext")
            .field("collection", &self.collection)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A workload runnable by [`crate::executor::FsmDriver`]
#[async_trait::async_trait]
pub trait Workload: Send + Sync + 'static {
    /// Closed state set
    type State: WorkloadState;
    /// Data shared read-only by every worker
    type Data: Send + Sync + 'static;

    /// Name for logs and reports
    fn name(&self) -> &str;

    /// Build the validated descriptor. Called once per run, before setup.
    fn descriptor(&self)
        -> Result<WorkloadDescriptor<Self::State, Self::Data>, ConfigurationError>;

    /// Runs once before any worker, with exclusive access to the collection
    async fn setup(&self, _ctx: &WorkloadContext<Self::Data>) -> Result<(), WorkloadError> {
        Ok(())
    }

    /// Handler for one step of a worker's walk
    async fn execute(
        &self,
        state: Self::State,
        ctx: &WorkloadContext<Self::Data>,
        local: &mut ThreadLocal,
    ) -> Result<(), WorkloadError>;

    /// Runs once after every worker has stopped
    async fn teardown(&self, _ctx: &WorkloadContext<Self::Data>) -> Result<(), WorkloadError> {
        Ok(())
    }
}
