//! Simulator
//!
//! Runs `indexed_insert_ttl` against an in-memory store on one tokio
//! runtime. The store, the driver and the workload share a clock, so
//! simulations under paused tokio time are deterministic.

use crate::balancer::SimulatedBalancer;
use crate::clock::Clock;
use crate::config::HarnessConfig;
use crate::executor::{FsmDriver, RunReport};
use crate::store::{MemoryStore, DEFAULT_TTL_MONITOR_PERIOD};
use crate::workloads::IndexedInsertTtl;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Environment flags, poll interval and seed
    pub harness: HarnessConfig,
    /// Concurrent workers
    pub thread_count: usize,
    /// Steps per worker
    pub iterations: u64,
    /// `expireAfterSeconds` of the TTL index
    pub ttl_seconds: u64,
    /// Period between TTL monitor passes
    pub monitor_period: Duration,
    /// Run the TTL monitor at all. Disabling it forces a teardown timeout.
    pub sweep_enabled: bool,
    /// Collection the workload writes to
    pub collection: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let workload = IndexedInsertTtl::default();
        Self {
            harness: HarnessConfig::default(),
            thread_count: workload.thread_count,
            iterations: workload.iterations,
            ttl_seconds: workload.ttl_seconds,
            monitor_period: DEFAULT_TTL_MONITOR_PERIOD,
            sweep_enabled: true,
            collection: "indexed_insert_ttl".to_string(),
        }
    }
}

/// Store-side counters observed after the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    /// Documents left in the collection after teardown
    pub documents_remaining: usize,
    /// Documents removed by the TTL monitor
    pub documents_expired: u64,
    /// TTL monitor passes
    pub sweeps: u64,
}

/// Simulation results
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    /// Driver report
    pub run: RunReport,
    /// Store counters after the run
    pub store: StoreSummary,
    /// Namespaces the balancer was told to stop migrating
    pub balancer_disabled: Vec<String>,
    /// Balancer rounds teardown waited on
    pub balancer_rounds_joined: u64,
}

impl SimulatorReport {
    /// The run converged
    #[must_use]
    pub fn passed(&self) -> bool {
        self.run.passed()
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = self.run.generate_text();
        report.push_str("\n=== Store ===\n");
        report.push_str(&format!("Documents Remaining: {}\n", self.store.documents_remaining));
        report.push_str(&format!("Documents Expired: {}\n", self.store.documents_expired));
        report.push_str(&format!("TTL Monitor Passes: {}\n", self.store.sweeps));
        if !self.balancer_disabled.is_empty() {
            report.push_str(&format!(
                "Balancer Disabled: {} (rounds joined: {})\n",
                self.balancer_disabled.join(", "),
                self.balancer_rounds_joined
            ));
        }
        report
    }
}

/// Run the simulator with the given configuration
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    tracing::info!(
        seed = config.harness.seed,
        threads = config.thread_count,
        iterations = config.iterations,
        ttl_seconds = config.ttl_seconds,
        sweep = config.sweep_enabled,
        "starting simulation"
    );

    let clock = Clock::new();
    let store = Arc::new(MemoryStore::with_clock(clock));
    let monitor = config
        .sweep_enabled
        .then(|| store.spawn_ttl_monitor(config.monitor_period));

    let balancer = Arc::new(SimulatedBalancer::new());
    let mut driver = FsmDriver::new(config.harness.clone(), store.clone()).with_clock(clock);
    if config.harness.running_with_balancer {
        driver = driver.with_balancer(balancer.clone());
    }

    let workload = IndexedInsertTtl::new()
        .with_threads(config.thread_count)
        .with_iterations(config.iterations)
        .with_ttl_seconds(config.ttl_seconds);
    let run = driver.run(Arc::new(workload), &config.collection).await;

    if let Some(monitor) = monitor {
        monitor.stop();
    }

    SimulatorReport {
        store: StoreSummary {
            documents_remaining: store.len(&config.collection),
            documents_expired: store.expired_count(),
            sweeps: store.sweep_count(),
        },
        balancer_disabled: balancer.disabled_namespaces(),
        balancer_rounds_joined: balancer.rounds_joined(),
        run,
    }
}
