//! Testing utilities for the FSM workload harness
//!
//! Scripted stores, a failing balancer, and a small walker workload for
//! exercising the driver without the TTL workload's semantics.

#![allow(missing_docs)]

use fsm_kernel::balancer::Balancer;
use fsm_kernel::construction::{WorkloadBuilder, WorkloadDescriptor};
use fsm_kernel::error::{AssertionError, ConfigurationError, StoreError, WorkloadError};
use fsm_kernel::store::{Document, DocumentStore, Filter, IndexSpec, InsertResult, MemoryStore};
use fsm_kernel::types::{ThreadLocal, WorkloadState};
use fsm_kernel::workload::{Workload, WorkloadContext};
use fsm_kernel::{FsmDriver, HarnessConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store wrapper whose answers and failures are scripted per test
#[derive(Debug)]
pub struct ScriptedStore {
    inner: Arc<MemoryStore>,
    n_inserted: Option<u64>,
    fail_insert_after: Option<u64>,
    fail_create_index: bool,
    fail_count: bool,
    inserts: AtomicU64,
    counts: AtomicU64,
}

impl ScriptedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            n_inserted: None,
            fail_insert_after: None,
            fail_create_index: false,
            fail_count: false,
            inserts: AtomicU64::new(0),
            counts: AtomicU64::new(0),
        }
    }

    /// Acknowledge every insert with this `nInserted` instead of the real one
    #[must_use]
    pub fn reporting_n_inserted(mut self, n: u64) -> Self {
        self.n_inserted = Some(n);
        self
    }

    /// Succeed for the first `n` inserts, then fail with a transport error
    #[must_use]
    pub fn failing_insert_after(mut self, n: u64) -> Self {
        self.fail_insert_after = Some(n);
        self
    }

    #[must_use]
    pub fn failing_create_index(mut self) -> Self {
        self.fail_create_index = true;
        self
    }

    #[must_use]
    pub fn failing_count(mut self) -> Self {
        self.fail_count = true;
        self
    }

    pub fn inner(&self) -> &Arc<MemoryStore> {
        &self.inner
    }

    pub fn inserts_attempted(&self) -> u64 {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn counts_issued(&self) -> u64 {
        self.counts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DocumentStore for ScriptedStore {
    async fn insert(&self, collection: &str, document: Document) -> Result<InsertResult, StoreError> {
        let attempt = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if matches!(self.fail_insert_after, Some(n) if attempt > n) {
            return Err(StoreError::Transport(format!("scripted failure on insert #{attempt}")));
        }
        let res = self.inner.insert(collection, document).await?;
        Ok(match self.n_inserted {
            Some(n_inserted) => InsertResult { n_inserted },
            None => res,
        })
    }

    async fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<(), StoreError> {
        if self.fail_create_index {
            return Err(StoreError::Validation(format!("scripted failure creating {}", spec.name())));
        }
        self.inner.create_index(collection, spec).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        if self.fail_count {
            return Err(StoreError::Transport("scripted failure on count".into()));
        }
        self.inner.count(collection, filter).await
    }
}

/// Balancer whose every call fails
#[derive(Debug, Default)]
pub struct FailingBalancer;

#[async_trait::async_trait]
impl Balancer for FailingBalancer {
    async fn disable_for_collection(&self, namespace: &str) -> Result<(), StoreError> {
        Err(StoreError::Balancer(format!("cannot disable balancing for {namespace}")))
    }

    async fn join_current_round(&self) -> Result<(), StoreError> {
        Err(StoreError::Balancer("balancer round did not finish".into()))
    }
}

/// Memory store sharing `driver`'s clock, plus a driver over it
pub fn memory_driver(config: HarnessConfig) -> (Arc<MemoryStore>, FsmDriver) {
    let store = Arc::new(MemoryStore::new());
    let driver = FsmDriver::new(config, store.clone()).with_clock(store.clock());
    (store, driver)
}

/// Scripted store sharing the driver's clock
pub fn scripted_driver(
    config: HarnessConfig,
    script: impl FnOnce(ScriptedStore) -> ScriptedStore,
) -> (Arc<ScriptedStore>, FsmDriver) {
    let inner = Arc::new(MemoryStore::new());
    let clock = inner.clock();
    let store = Arc::new(script(ScriptedStore::new(inner)));
    let driver = FsmDriver::new(config, store.clone()).with_clock(clock);
    (store, driver)
}

/// States of [`WalkerWorkload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Start,
    Left,
    Right,
    Halt,
}

impl WorkloadState for Step {
    const INIT: Self = Step::Start;

    fn name(self) -> &'static str {
        match self {
            Step::Start => "start",
            Step::Left => "left",
            Step::Right => "right",
            Step::Halt => "halt",
        }
    }
}

/// Small workload with a terminal state and scriptable failures.
///
/// `Start` fans out to `Left`/`Right`, which alternate and reach the
/// terminal `Halt` with weight `halt_weight`.
#[derive(Debug, Default)]
pub struct WalkerWorkload {
    pub thread_count: usize,
    pub iterations: u64,
    pub halt_weight: f64,
    /// Return an assertion failure at `(tid, iteration)`
    pub fail_at: Option<(usize, u64)>,
    /// Panic at `(tid, iteration)`
    pub panic_at: Option<(usize, u64)>,
    pub fail_setup: bool,
    pub fail_teardown: bool,
    /// Sleep before each step so workers interleave
    pub step_delay: Option<Duration>,
    /// Every executed step, in completion order
    pub trace: Mutex<Vec<(usize, Step)>>,
    pub setup_ran: AtomicBool,
    pub teardown_ran: AtomicBool,
}

impl WalkerWorkload {
    pub fn new(thread_count: usize, iterations: u64) -> Self {
        Self {
            thread_count,
            iterations,
            ..Default::default()
        }
    }

    /// Steps executed by worker `tid`
    pub fn steps_of(&self, tid: usize) -> Vec<Step> {
        self.trace
            .lock()
            .iter()
            .filter(|(t, _)| *t == tid)
            .map(|(_, s)| *s)
            .collect()
    }
}

#[async_trait::async_trait]
impl Workload for WalkerWorkload {
    type State = Step;
    type Data = ();

    fn name(&self) -> &str {
        "walker"
    }

    fn descriptor(&self) -> Result<WorkloadDescriptor<Step, ()>, ConfigurationError> {
        let mut builder = WorkloadBuilder::new(())
            .thread_count(self.thread_count)
            .iterations(self.iterations)
            .states([Step::Start, Step::Left, Step::Right, Step::Halt])
            .transition(Step::Start, Step::Left, 1.0)
            .transition(Step::Start, Step::Right, 1.0)
            .transition(Step::Left, Step::Right, 1.0)
            .transition(Step::Right, Step::Left, 1.0)
            .terminal(Step::Halt);
        if self.halt_weight > 0.0 {
            builder = builder
                .transition(Step::Left, Step::Halt, self.halt_weight)
                .transition(Step::Right, Step::Halt, self.halt_weight);
        }
        builder.build()
    }

    async fn setup(&self, _ctx: &WorkloadContext<()>) -> Result<(), WorkloadError> {
        self.setup_ran.store(true, Ordering::SeqCst);
        if self.fail_setup {
            return Err(AssertionError::new("walker setup failed").into());
        }
        Ok(())
    }

    async fn execute(
        &self,
        state: Step,
        _ctx: &WorkloadContext<()>,
        local: &mut ThreadLocal,
    ) -> Result<(), WorkloadError> {
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }
        let here = Some((local.tid, local.iteration));
        if self.panic_at == here {
            panic!("walker panic in worker {}", local.tid);
        }
        if self.fail_at == here {
            return Err(AssertionError::new(format!("walker failure in '{}'", state.name())).into());
        }
        if state == Step::Start {
            local.has_initialized = true;
        }
        self.trace.lock().push((local.tid, state));
        Ok(())
    }

    async fn teardown(&self, _ctx: &WorkloadContext<()>) -> Result<(), WorkloadError> {
        self.teardown_ran.store(true, Ordering::SeqCst);
        if self.fail_teardown {
            return Err(AssertionError::new("walker teardown failed").into());
        }
        Ok(())
    }
}
