//! Finite-state-machine concurrency workloads.
//!
//! A workload declares a closed set of states, a weighted transition table,
//! and one handler per state. [`executor::FsmDriver`] runs setup once, then
//! `thread_count` concurrent workers that each walk the table for
//! `iterations` steps, then teardown once.

pub mod assertions;
pub mod balancer;
pub mod clock;
pub mod config;
pub mod construction;
pub mod convergence;
pub mod executor;
pub mod scheduler;
pub mod state_machine;
pub mod store;
pub mod test_harness;
pub mod types;
pub mod workload;
pub mod workloads;

pub mod error;

pub use error::*;
pub use types::*;

pub use config::HarnessConfig;
pub use construction::{WorkloadBuilder, WorkloadDescriptor};
pub use executor::{FsmDriver, RunReport};
pub use state_machine::RunPhase;
pub use workload::{Workload, WorkloadContext};

/// Re-export test harness for external use
pub use test_harness::{run_simulator, SimulatorConfig, SimulatorReport, TestHarness};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
