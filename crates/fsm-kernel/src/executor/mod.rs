//! FSM Driver
//!
//! Runs one workload end to end:
//! 1. builds and validates the descriptor
//! 2. runs setup alone
//! 3. spawns `thread_count` workers, each walking the transition table for
//!    `iterations` steps from the start state
//! 4. runs teardown alone once every worker has stopped
//!
//! A fatal error or panic in any worker raises a shared abort flag; the
//! other workers notice it before their next step. Teardown still runs so
//! the collection is left in a known state, but the run ends `Aborted`.

pub mod report;

pub use report::{Failure, RunReport, RunStats};

use crate::balancer::{Balancer, NoopBalancer};
use crate::clock::Clock;
use crate::config::HarnessConfig;
use crate::construction::WorkloadDescriptor;
use crate::error::WorkloadError;
use crate::scheduler::TransitionSampler;
use crate::state_machine::{RunPhase, RunStateMachine};
use crate::store::DocumentStore;
use crate::types::{ThreadLocal, WorkloadState};
use crate::workload::{Workload, WorkloadContext};
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Drives workloads against one store
pub struct FsmDriver {
    config: Arc<HarnessConfig>,
    store: Arc<dyn DocumentStore>,
    balancer: Arc<dyn Balancer>,
    clock: Clock,
}

impl FsmDriver {
    /// Driver with no balancing subsystem
    pub fn new(config: HarnessConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            balancer: Arc::new(NoopBalancer),
            clock: Clock::new(),
        }
    }

    /// Replace the balancer handed to workloads
    #[must_use]
    pub fn with_balancer(mut self, balancer: Arc<dyn Balancer>) -> Self {
        self.balancer = balancer;
        self
    }

    /// Share a clock with the store so document timestamps and expiry agree
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Harness flags
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run `workload` against `collection` and report the outcome.
    ///
    /// Never returns an error: every failure is recorded in the report and
    /// reflected in its terminal phase.
    pub async fn run<W: Workload>(&self, workload: Arc<W>, collection: &str) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id, workload = workload.name(), collection);

        async move {
            let started = Instant::now();
            let mut phases = RunStateMachine::new();
            let mut failures = Vec::new();
            let mut stats = RunStats::default();

            self.drive(&workload, collection, &mut phases, &mut failures, &mut stats)
                .await;

            let report = RunReport {
                run_id,
                workload: workload.name().to_string(),
                collection: collection.to_string(),
                outcome: phases.current(),
                phases: phases.history().to_vec(),
                failures,
                stats,
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            };
            tracing::info!(outcome = ?report.outcome, failures = report.failures.len(), "run finished");
            report
        }
        .instrument(span)
        .await
    }

    async fn drive<W: Workload>(
        &self,
        workload: &Arc<W>,
        collection: &str,
        phases: &mut RunStateMachine,
        failures: &mut Vec<Failure>,
        stats: &mut RunStats,
    ) {
        let (descriptor, sampler) = match prepare(workload.as_ref()) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!(error = %e, "descriptor rejected");
                failures.push(Failure::in_phase(RunPhase::NotStarted, &e));
                enter(phases, failures, RunPhase::Aborted);
                return;
            }
        };
        stats.thread_count = descriptor.thread_count();
        stats.iterations_per_thread = descriptor.iterations();

        let ctx = WorkloadContext::new(
            Arc::clone(&self.store),
            Arc::clone(&self.balancer),
            Arc::clone(&self.config),
            collection,
            Arc::clone(descriptor.data()),
            self.clock,
        );

        enter(phases, failures, RunPhase::SetupRunning);
        tracing::info!("setup");
        if let Err(e) = workload.setup(&ctx).await {
            tracing::error!(error = %e, "setup failed");
            failures.push(Failure::in_phase(RunPhase::SetupRunning, &e));
            enter(phases, failures, RunPhase::Aborted);
            return;
        }

        enter(phases, failures, RunPhase::WorkersRunning);
        tracing::info!(
            threads = descriptor.thread_count(),
            iterations = descriptor.iterations(),
            "starting workers"
        );
        let worker_failures = self
            .run_workers(workload, &descriptor, sampler, &ctx, stats)
            .await;
        let workers_failed = !worker_failures.is_empty();
        failures.extend(worker_failures);

        enter(phases, failures, RunPhase::TeardownRunning);
        tracing::info!("teardown");
        let terminal = match workload.teardown(&ctx).await {
            Ok(()) if workers_failed => RunPhase::Aborted,
            Ok(()) => RunPhase::Converged,
            Err(e) => {
                tracing::error!(error = %e, "teardown failed");
                failures.push(Failure::in_phase(RunPhase::TeardownRunning, &e));
                if workers_failed {
                    RunPhase::Aborted
                } else {
                    e.terminal_phase()
                }
            }
        };
        enter(phases, failures, terminal);
    }

    async fn run_workers<W: Workload>(
        &self,
        workload: &Arc<W>,
        descriptor: &WorkloadDescriptor<W::State, W::Data>,
        sampler: TransitionSampler<W::State>,
        ctx: &WorkloadContext<W::Data>,
        stats: &mut RunStats,
    ) -> Vec<Failure> {
        let sampler = Arc::new(sampler);
        let abort = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(descriptor.thread_count());

        for tid in 0..descriptor.thread_count() {
            let worker = Worker {
                tid,
                iterations: descriptor.iterations(),
                seed: self.config.seed.wrapping_add(tid as u64),
                workload: Arc::clone(workload),
                sampler: Arc::clone(&sampler),
                ctx: ctx.clone(),
                abort: Arc::clone(&abort),
            };
            let span = tracing::debug_span!("worker", tid);
            handles.push((tid, tokio::spawn(worker.run().instrument(span))));
        }

        let mut failures = Vec::new();
        for (tid, handle) in handles {
            match handle.await {
                Ok(outcome) => {
                    stats.steps_executed += outcome.steps;
                    for (state, n) in outcome.visits {
                        *stats.visits.entry(state.to_string()).or_default() += n;
                    }
                    if outcome.stopped_early {
                        stats.workers_stopped_early += 1;
                    } else if outcome.failure.is_none() {
                        stats.workers_completed += 1;
                    }
                    failures.extend(outcome.failure);
                }
                Err(join_error) => {
                    abort.store(true, Ordering::Release);
                    let error = WorkloadError::WorkerLost {
                        tid,
                        reason: join_error.to_string(),
                    };
                    tracing::error!(tid, error = %error, "worker lost");
                    failures.push(Failure::in_phase(RunPhase::WorkersRunning, &error));
                }
            }
        }
        failures
    }
}

/// Build the descriptor and its sampler
fn prepare<W: Workload>(
    workload: &W,
) -> Result<(WorkloadDescriptor<W::State, W::Data>, TransitionSampler<W::State>), WorkloadError> {
    let descriptor = workload.descriptor()?;
    let sampler = TransitionSampler::new(descriptor.transitions())?;
    Ok((descriptor, sampler))
}

/// Advance the run phase, recording an illegal edge as a failure
fn enter(phases: &mut RunStateMachine, failures: &mut Vec<Failure>, to: RunPhase) {
    let from = phases.current();
    if let Err(e) = phases.advance(to) {
        let error = WorkloadError::from(e);
        tracing::error!(error = %error, "driver phase bug");
        failures.push(Failure::in_phase(from, &error));
    }
}

struct WorkerOutcome {
    steps: u64,
    visits: BTreeMap<&'static str, u64>,
    failure: Option<Failure>,
    stopped_early: bool,
}

struct Worker<W: Workload> {
    tid: usize,
    iterations: u64,
    seed: u64,
    workload: Arc<W>,
    sampler: Arc<TransitionSampler<W::State>>,
    ctx: WorkloadContext<W::Data>,
    abort: Arc<AtomicBool>,
}

impl<W: Workload> Worker<W> {
    async fn run(self) -> WorkerOutcome {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut local = ThreadLocal::new(self.tid);
        let mut outcome = WorkerOutcome {
            steps: 0,
            visits: BTreeMap::new(),
            failure: None,
            stopped_early: false,
        };
        let mut state = Some(W::State::INIT);

        for iteration in 0..self.iterations {
            if self.abort.load(Ordering::Acquire) {
                tracing::debug!(iteration, "stopping: another worker failed");
                outcome.stopped_early = true;
                break;
            }
            let Some(current) = state else {
                tracing::debug!(iteration, "walk reached a terminal state");
                break;
            };

            local.iteration = iteration;
            let step = AssertUnwindSafe(self.workload.execute(current, &self.ctx, &mut local))
                .catch_unwind()
                .await;
            let error = match step {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => Some(WorkloadError::WorkerLost {
                    tid: self.tid,
                    reason: panic_message(payload.as_ref()),
                }),
            };
            if let Some(e) = error {
                self.abort.store(true, Ordering::Release);
                tracing::error!(state = current.name(), iteration, error = %e, "state function failed");
                outcome.failure = Some(Failure::in_worker(self.tid, current.name(), iteration, &e));
                break;
            }

            outcome.steps += 1;
            *outcome.visits.entry(current.name()).or_default() += 1;
            state = self.sampler.next_state(current, &mut rng);
        }

        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
