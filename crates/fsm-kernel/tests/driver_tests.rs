//! Driver behavior independent of any particular workload: phase ordering,
//! abort propagation, terminal states and lost workers.

use fsm_kernel::{HarnessConfig, RunPhase};
use fsm_test_utils::{memory_driver, Step, WalkerWorkload};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const COLLECTION: &str = "walker";

#[tokio::test]
async fn every_worker_walks_from_start_for_all_iterations() {
    let (_store, driver) = memory_driver(HarnessConfig::default());
    let workload = Arc::new(WalkerWorkload::new(4, 12));

    let report = driver.run(workload.clone(), COLLECTION).await;

    assert!(report.passed(), "{}", report.generate_text());
    assert_eq!(report.stats.steps_executed, 48);
    assert_eq!(report.stats.workers_completed, 4);
    for tid in 0..4 {
        let steps = workload.steps_of(tid);
        assert_eq!(steps.len(), 12);
        assert_eq!(steps[0], Step::Start);
        assert!(steps[1..].iter().all(|s| *s != Step::Start));
        // Left and Right alternate after the first pick.
        for pair in steps[1..].windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }
    assert!(workload.setup_ran.load(Ordering::SeqCst));
    assert!(workload.teardown_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn terminal_state_ends_walk_early() {
    let (_store, driver) = memory_driver(HarnessConfig::default());
    let workload = Arc::new(WalkerWorkload {
        halt_weight: 1_000_000.0,
        ..WalkerWorkload::new(3, 100)
    });

    let report = driver.run(workload.clone(), COLLECTION).await;

    assert!(report.passed());
    assert_eq!(report.stats.workers_completed, 3);
    for tid in 0..3 {
        let steps = workload.steps_of(tid);
        assert!(steps.len() < 100);
        assert_eq!(steps.last(), Some(&Step::Halt));
    }
}

#[tokio::test]
async fn same_seed_same_walks() {
    let run = |seed| async move {
        let (_store, driver) = memory_driver(HarnessConfig::default().with_seed(seed));
        let workload = Arc::new(WalkerWorkload::new(2, 30));
        driver.run(workload.clone(), COLLECTION).await;
        (workload.steps_of(0), workload.steps_of(1))
    };

    assert_eq!(run(9).await, run(9).await);
}

#[tokio::test(start_paused = true)]
async fn worker_failure_stops_the_others() {
    let (_store, driver) = memory_driver(HarnessConfig::default());
    let workload = Arc::new(WalkerWorkload {
        fail_at: Some((1, 3)),
        step_delay: Some(Duration::from_millis(10)),
        ..WalkerWorkload::new(4, 1_000)
    });

    let report = driver.run(workload.clone(), COLLECTION).await;

    assert_eq!(report.outcome, RunPhase::Aborted);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.kind, "AssertionError");
    assert_eq!(failure.tid, Some(1));
    assert_eq!(failure.iteration, Some(3));
    assert_eq!(report.stats.workers_stopped_early, 3);
    assert!(report.stats.steps_executed < 4 * 10);
    assert!(workload.teardown_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn panicking_worker_is_reported_as_lost() {
    let (_store, driver) = memory_driver(HarnessConfig::default());
    let workload = Arc::new(WalkerWorkload {
        panic_at: Some((0, 0)),
        ..WalkerWorkload::new(2, 5)
    });

    let report = driver.run(workload, COLLECTION).await;

    assert_eq!(report.outcome, RunPhase::Aborted);
    let lost = report.failure_of_kind("WorkerLost").unwrap();
    assert!(lost.message.contains("worker 0"));
}

#[tokio::test(start_paused = true)]
async fn panic_in_last_worker_stops_earlier_workers() {
    let (_store, driver) = memory_driver(HarnessConfig::default());
    let workload = Arc::new(WalkerWorkload {
        panic_at: Some((3, 2)),
        step_delay: Some(Duration::from_millis(10)),
        ..WalkerWorkload::new(4, 1_000)
    });

    let report = driver.run(workload.clone(), COLLECTION).await;

    assert_eq!(report.outcome, RunPhase::Aborted);
    let lost = report.failure_of_kind("WorkerLost").unwrap();
    assert!(lost.message.contains("worker 3"));
    assert_eq!(report.stats.workers_stopped_early, 3);
    assert_eq!(report.stats.workers_completed, 0);
    assert!(report.stats.steps_executed < 4 * 10);
    for tid in 0..3 {
        assert!(workload.steps_of(tid).len() < 10);
    }
}

#[tokio::test]
async fn setup_failure_skips_workers_and_teardown() {
    let (_store, driver) = memory_driver(HarnessConfig::default());
    let workload = Arc::new(WalkerWorkload {
        fail_setup: true,
        ..WalkerWorkload::new(2, 5)
    });

    let report = driver.run(workload.clone(), COLLECTION).await;

    assert_eq!(report.outcome, RunPhase::Aborted);
    assert!(workload.trace.lock().is_empty());
    assert!(!workload.teardown_ran.load(Ordering::SeqCst));
    assert_eq!(report.stats.steps_executed, 0);
}

#[tokio::test]
async fn teardown_failure_aborts_after_clean_walk() {
    let (_store, driver) = memory_driver(HarnessConfig::default());
    let workload = Arc::new(WalkerWorkload {
        fail_teardown: true,
        ..WalkerWorkload::new(2, 5)
    });

    let report = driver.run(workload, COLLECTION).await;

    assert_eq!(report.outcome, RunPhase::Aborted);
    assert_eq!(report.stats.steps_executed, 10);
    assert_eq!(report.failures[0].phase, RunPhase::TeardownRunning);
}

#[tokio::test]
async fn invalid_descriptor_never_runs_setup() {
    let (_store, driver) = memory_driver(HarnessConfig::default());
    let workload = Arc::new(WalkerWorkload::new(0, 5));

    let report = driver.run(workload.clone(), COLLECTION).await;

    assert_eq!(report.outcome, RunPhase::Aborted);
    assert_eq!(report.phases, vec![RunPhase::NotStarted, RunPhase::Aborted]);
    assert_eq!(report.failures[0].kind, "ConfigurationError");
    assert!(!workload.setup_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn report_renders_as_text_and_json() {
    let (_store, driver) = memory_driver(HarnessConfig::default());
    let report = driver.run(Arc::new(WalkerWorkload::new(1, 3)), COLLECTION).await;

    let text = report.generate_text();
    assert!(text.contains("Workload: walker"));
    assert!(text.contains("=== Result: PASS ==="));

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["workload"], "walker");
    assert_eq!(json["stats"]["steps_executed"], 3);
}
