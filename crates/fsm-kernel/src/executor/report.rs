//! Run reports

use crate::error::WorkloadError;
use crate::state_machine::RunPhase;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    /// Phase the failure happened in
    pub phase: RunPhase,
    /// Worker id, for failures inside a walk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<usize>,
    /// State being executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    /// Step index within the walk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u64>,
    /// Error kind label, e.g. `AssertionError`
    pub kind: &'static str,
    /// Rendered error
    pub message: String,
}

impl Failure {
    /// Failure outside any worker
    #[must_use]
    pub fn in_phase(phase: RunPhase, error: &WorkloadError) -> Self {
        Self {
            phase,
            tid: None,
            state: None,
            iteration: None,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// Failure inside worker `tid` while executing `state`
    #[must_use]
    pub fn in_worker(tid: usize, state: &'static str, iteration: u64, error: &WorkloadError) -> Self {
        Self {
            phase: RunPhase::WorkersRunning,
            tid: Some(tid),
            state: Some(state),
            iteration: Some(iteration),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Counters aggregated over all workers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Workers spawned
    pub thread_count: usize,
    /// Configured walk length
    pub iterations_per_thread: u64,
    /// Successful state executions across all workers
    pub steps_executed: u64,
    /// Workers that ran every iteration or reached a terminal state
    pub workers_completed: usize,
    /// Workers that stopped because another worker failed
    pub workers_stopped_early: usize,
    /// Successful executions per state name
    pub visits: BTreeMap<String, u64>,
}

/// Final report of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique per run, also recorded on the run's tracing span
    pub run_id: Uuid,
    /// Workload name
    pub workload: String,
    /// Collection the workload ran against
    pub collection: String,
    /// Terminal phase
    pub outcome: RunPhase,
    /// Phases visited, in order
    pub phases: Vec<RunPhase>,
    /// Every recorded failure, workers in `tid` order
    pub failures: Vec<Failure>,
    /// Aggregated worker counters
    pub stats: RunStats,
    /// Wall time of the whole run on tokio's clock
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Only a converged run with no failures passes
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome.is_success() && self.failures.is_empty()
    }

    /// First failure of the given kind, if any
    #[must_use]
    pub fn failure_of_kind(&self, kind: &str) -> Option<&Failure> {
        self.failures.iter().find(|f| f.kind == kind)
    }

    /// Pretty-printed JSON rendering
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== FSM Workload Report ===\n\n");
        report.push_str(&format!("Run: {}\n", self.run_id));
        report.push_str(&format!("Workload: {}\n", self.workload));
        report.push_str(&format!("Collection: {}\n", self.collection));
        report.push_str(&format!("Threads: {}\n", self.stats.thread_count));
        report.push_str(&format!("Iterations/Thread: {}\n", self.stats.iterations_per_thread));
        report.push_str(&format!("Steps Executed: {}\n", self.stats.steps_executed));
        report.push_str(&format!("Workers Completed: {}\n", self.stats.workers_completed));
        report.push_str(&format!("Workers Stopped Early: {}\n", self.stats.workers_stopped_early));
        for (state, n) in &self.stats.visits {
            report.push_str(&format!("  {state}: {n}\n"));
        }
        report.push_str(&format!("Elapsed: {}ms\n", self.elapsed_ms));
        report.push_str(&format!("Outcome: {:?}\n", self.outcome));

        if !self.failures.is_empty() {
            report.push_str("\n=== Failures ===\n");
            for (i, f) in self.failures.iter().enumerate() {
                match (f.tid, f.state, f.iteration) {
                    (Some(tid), Some(state), Some(it)) => report.push_str(&format!(
                        "{}. [{:?}] worker {tid} in '{state}' at step {it}: {}: {}\n",
                        i + 1,
                        f.phase,
                        f.kind,
                        f.message
                    )),
                    _ => report.push_str(&format!(
                        "{}. [{:?}] {}: {}\n",
                        i + 1,
                        f.phase,
                        f.kind,
                        f.message
                    )),
                }
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));

        report
    }
}
