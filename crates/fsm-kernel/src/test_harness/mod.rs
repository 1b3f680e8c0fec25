//! Test harness
//!
//! In-memory simulation of the TTL workload

pub mod simulator;

pub use simulator::*;

/// Runs the simulator across several seeds
pub struct TestHarness;

impl TestHarness {
    /// Run the default simulation once per seed in `seeds`
    pub async fn run_seeds(base: &SimulatorConfig, seeds: std::ops::Range<u64>) -> SeedSweepReport {
        let mut report = SeedSweepReport::default();

        for seed in seeds {
            let config = SimulatorConfig {
                harness: base.harness.clone().with_seed(seed),
                ..base.clone()
            };
            let run = run_simulator(config).await;
            report.seeds_tested += 1;
            if !run.passed() {
                tracing::warn!(seed, outcome = ?run.run.outcome, "seed failed");
                report.failed_seeds.push(seed);
            }
        }

        report
    }
}

/// Outcome of a multi-seed run
#[derive(Debug, Clone, Default)]
pub struct SeedSweepReport {
    /// Seeds run
    pub seeds_tested: u64,
    /// Seeds whose run did not converge
    pub failed_seeds: Vec<u64>,
}

impl SeedSweepReport {
    /// At least one seed ran and none failed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.seeds_tested > 0 && self.failed_seeds.is_empty()
    }
}
