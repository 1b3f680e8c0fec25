//! End-to-end tests for `indexed_insert_ttl`.
//!
//! All tests run on paused tokio time: the TTL monitor, the teardown poll
//! and document timestamps share one virtual clock, so a two-minute
//! convergence window costs nothing.

use fsm_kernel::balancer::{NoopBalancer, SimulatedBalancer};
use fsm_kernel::clock::Clock;
use fsm_kernel::store::{
    DocumentStore, FieldValue, Filter, MemoryStore, DEFAULT_TTL_MONITOR_PERIOD,
};
use fsm_kernel::workloads::indexed_insert_ttl::{
    IndexedInsertTtl, TtlData, TtlState, FIRST_FIELD, TTL_FIELD,
};
use fsm_kernel::{HarnessConfig, RunPhase, ThreadLocal, Workload, WorkloadContext, WorkloadError};
use fsm_test_utils::{memory_driver, scripted_driver, FailingBalancer, ScriptedStore};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const COLLECTION: &str = "indexed_insert_ttl";

#[tokio::test(start_paused = true)]
async fn reference_run_converges_once_monitor_sweeps() {
    let (store, driver) = memory_driver(HarnessConfig::default());
    let _monitor = store.spawn_ttl_monitor(DEFAULT_TTL_MONITOR_PERIOD);

    let report = driver.run(Arc::new(IndexedInsertTtl::default()), COLLECTION).await;

    assert!(report.passed(), "{}", report.generate_text());
    assert_eq!(
        report.phases,
        vec![
            RunPhase::NotStarted,
            RunPhase::SetupRunning,
            RunPhase::WorkersRunning,
            RunPhase::TeardownRunning,
            RunPhase::Converged,
        ]
    );
    assert_eq!(report.stats.steps_executed, 4_000);
    assert_eq!(report.stats.workers_completed, 20);
    assert_eq!(report.stats.visits.get("init"), Some(&20));
    assert_eq!(report.stats.visits.get("insert"), Some(&3_980));

    // Every document is older than the 5 s TTL at the first 60 s pass.
    assert_eq!(store.expired_count(), 4_000);
    assert_eq!(store.len(COLLECTION), 0);
    assert!(report.elapsed_ms >= 60_000 && report.elapsed_ms < 61_000);

    let indexes = store.indexes(COLLECTION);
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name(), "indexed_insert_ttl_1");
    assert_eq!(indexes[0].ttl_field(), Some((TTL_FIELD, 5)));
}

#[tokio::test(start_paused = true)]
async fn each_worker_marks_exactly_one_first_document() {
    let (store, driver) = memory_driver(HarnessConfig::default());

    // No monitor: documents stay put and teardown times out.
    let report = driver
        .run(
            Arc::new(IndexedInsertTtl::new().with_threads(5).with_iterations(10)),
            COLLECTION,
        )
        .await;

    assert_eq!(report.outcome, RunPhase::TimedOut);
    assert_eq!(store.len(COLLECTION), 50);
    let firsts = store
        .count(COLLECTION, &Filter::field(FIRST_FIELD, true))
        .await
        .unwrap();
    assert_eq!(firsts, 5);
}

#[tokio::test(start_paused = true)]
async fn teardown_times_out_at_two_minutes_locally() {
    let (_store, driver) = memory_driver(HarnessConfig::default().with_ci(false));
    let start = Instant::now();

    let report = driver
        .run(
            Arc::new(IndexedInsertTtl::new().with_threads(2).with_iterations(3)),
            COLLECTION,
        )
        .await;

    assert_eq!(start.elapsed(), Duration::from_millis(120_000));
    assert_eq!(report.outcome, RunPhase::TimedOut);
    let failure = report.failure_of_kind("ConvergenceTimeoutError").unwrap();
    assert_eq!(failure.phase, RunPhase::TeardownRunning);
    assert!(failure
        .message
        .contains("expected oldest documents with TTL fields to be removed"));
    assert!(failure.message.contains("120000ms"));
}

#[tokio::test(start_paused = true)]
async fn teardown_times_out_at_ten_minutes_in_ci() {
    let (_store, driver) = memory_driver(HarnessConfig::default().with_ci(true));
    let start = Instant::now();

    let report = driver
        .run(
            Arc::new(IndexedInsertTtl::new().with_threads(1).with_iterations(1)),
            COLLECTION,
        )
        .await;

    assert_eq!(start.elapsed(), Duration::from_millis(600_000));
    assert_eq!(report.outcome, RunPhase::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn documents_younger_than_ttl_survive_a_sweep() {
    let (store, driver) = memory_driver(HarnessConfig::default());
    let _monitor = store.spawn_ttl_monitor(Duration::from_secs(1));

    let report = driver
        .run(
            Arc::new(
                IndexedInsertTtl::new()
                    .with_threads(2)
                    .with_iterations(2)
                    .with_ttl_seconds(30),
            ),
            COLLECTION,
        )
        .await;

    assert!(report.passed());
    // Removal needs strictly more than 30 s of age, so the 31st pass removes them.
    assert!(report.elapsed_ms >= 30_000 && report.elapsed_ms <= 31_200);
    assert!(store.sweep_count() >= 30);
}

#[tokio::test(start_paused = true)]
async fn wrong_insert_count_is_an_assertion_failure() {
    let (store, driver) = scripted_driver(HarnessConfig::default(), |s| s.reporting_n_inserted(0));
    let _monitor = store.inner().spawn_ttl_monitor(DEFAULT_TTL_MONITOR_PERIOD);

    let report = driver
        .run(
            Arc::new(IndexedInsertTtl::new().with_threads(4).with_iterations(50)),
            COLLECTION,
        )
        .await;

    assert_eq!(report.outcome, RunPhase::Aborted);
    let failure = report.failure_of_kind("AssertionError").unwrap();
    assert_eq!(failure.state, Some("init"));
    assert_eq!(failure.iteration, Some(0));
    assert!(failure.message.contains(r#"{"nInserted":0}"#));
    // Teardown still ran against the store.
    assert!(store.counts_issued() >= 1);
}

fn context_over(store: Arc<dyn DocumentStore>) -> WorkloadContext<TtlData> {
    WorkloadContext::new(
        store,
        Arc::new(NoopBalancer),
        Arc::new(HarnessConfig::default()),
        COLLECTION,
        Arc::new(TtlData { ttl_seconds: 5 }),
        Clock::new(),
    )
}

#[tokio::test]
async fn both_states_reject_an_over_reported_insert() {
    let store = Arc::new(ScriptedStore::new(Arc::new(MemoryStore::new())).reporting_n_inserted(2));
    let ctx = context_over(store.clone());
    let workload = IndexedInsertTtl::default();

    for state in [TtlState::Insert, TtlState::Init] {
        let mut local = ThreadLocal::new(0);
        local.iteration = 5;
        let err = workload.execute(state, &ctx, &mut local).await.unwrap_err();
        match err {
            WorkloadError::Assertion(e) => {
                assert!(e.message.contains("unexpected insert count"), "{}", e.message);
                assert!(e.message.contains(r#"{"nInserted":2}"#), "{}", e.message);
            }
            other => panic!("expected an assertion failure, got {other:?}"),
        }
        assert!(!local.has_initialized);
    }
    assert_eq!(store.inserts_attempted(), 2);
}

#[tokio::test]
async fn insert_state_stores_an_unmarked_timestamped_document() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context_over(store.clone());
    let mut local = ThreadLocal::new(3);

    IndexedInsertTtl::default()
        .execute(TtlState::Insert, &ctx, &mut local)
        .await
        .unwrap();

    assert_eq!(store.len(COLLECTION), 1);
    assert_eq!(
        store.count(COLLECTION, &Filter::field(FIRST_FIELD, true)).await.unwrap(),
        0
    );
    assert!(!local.has_initialized);
}

#[tokio::test(start_paused = true)]
async fn store_failure_mid_walk_aborts_run() {
    let (store, driver) = scripted_driver(HarnessConfig::default(), |s| s.failing_insert_after(30));
    let _monitor = store.inner().spawn_ttl_monitor(DEFAULT_TTL_MONITOR_PERIOD);

    let report = driver
        .run(
            Arc::new(IndexedInsertTtl::new().with_threads(4).with_iterations(50)),
            COLLECTION,
        )
        .await;

    assert_eq!(report.outcome, RunPhase::Aborted);
    let failure = report.failure_of_kind("StoreError").unwrap();
    assert_eq!(failure.phase, RunPhase::WorkersRunning);
    assert!(failure.tid.is_some());
    assert!(report.stats.steps_executed < 200);
}

#[tokio::test(start_paused = true)]
async fn index_creation_failure_aborts_before_workers() {
    let (store, driver) = scripted_driver(HarnessConfig::default(), |s| s.failing_create_index());

    let report = driver.run(Arc::new(IndexedInsertTtl::default()), COLLECTION).await;

    assert_eq!(report.outcome, RunPhase::Aborted);
    assert_eq!(
        report.phases,
        vec![RunPhase::NotStarted, RunPhase::SetupRunning, RunPhase::Aborted]
    );
    assert_eq!(store.inserts_attempted(), 0);
    assert_eq!(report.failures[0].phase, RunPhase::SetupRunning);
}

#[tokio::test(start_paused = true)]
async fn count_failure_during_teardown_aborts() {
    let (store, driver) = scripted_driver(HarnessConfig::default(), |s| s.failing_count());
    let start = Instant::now();

    let report = driver
        .run(
            Arc::new(IndexedInsertTtl::new().with_threads(2).with_iterations(2)),
            COLLECTION,
        )
        .await;

    assert_eq!(report.outcome, RunPhase::Aborted);
    assert_eq!(store.counts_issued(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn balancer_is_disabled_before_waiting() {
    let config = HarnessConfig::default().with_balancer(true);
    let (store, driver) = memory_driver(config);
    let balancer = Arc::new(SimulatedBalancer::new());
    let driver = driver.with_balancer(balancer.clone());
    let _monitor = store.spawn_ttl_monitor(DEFAULT_TTL_MONITOR_PERIOD);

    let report = driver
        .run(
            Arc::new(IndexedInsertTtl::new().with_threads(3).with_iterations(5)),
            COLLECTION,
        )
        .await;

    assert!(report.passed());
    assert_eq!(balancer.disabled_namespaces(), vec!["test.indexed_insert_ttl"]);
    assert_eq!(balancer.rounds_joined(), 1);
}

#[tokio::test(start_paused = true)]
async fn balancer_is_left_alone_without_flag() {
    let (store, driver) = memory_driver(HarnessConfig::default());
    let balancer = Arc::new(SimulatedBalancer::new());
    let driver = driver.with_balancer(balancer.clone());
    let _monitor = store.spawn_ttl_monitor(DEFAULT_TTL_MONITOR_PERIOD);

    let report = driver
        .run(Arc::new(IndexedInsertTtl::new().with_threads(1).with_iterations(1)), COLLECTION)
        .await;

    assert!(report.passed());
    assert!(balancer.disabled_namespaces().is_empty());
    assert_eq!(balancer.rounds_joined(), 0);
}

#[tokio::test(start_paused = true)]
async fn balancer_failure_aborts_teardown() {
    let (_store, driver) = memory_driver(HarnessConfig::default().with_balancer(true));
    let driver = driver.with_balancer(Arc::new(FailingBalancer));

    let report = driver
        .run(Arc::new(IndexedInsertTtl::new().with_threads(1).with_iterations(1)), COLLECTION)
        .await;

    assert_eq!(report.outcome, RunPhase::Aborted);
    let failure = report.failure_of_kind("StoreError").unwrap();
    assert_eq!(failure.phase, RunPhase::TeardownRunning);
}

#[tokio::test(start_paused = true)]
async fn first_documents_carry_timestamps_from_the_shared_clock() {
    let (store, driver) = memory_driver(HarnessConfig::default());
    let before = store.clock().now();

    let _ = driver
        .run(Arc::new(IndexedInsertTtl::new().with_threads(1).with_iterations(1)), COLLECTION)
        .await;

    // Single worker, single step: the only document is the first one.
    assert_eq!(store.len(COLLECTION), 1);
    let n = store
        .count(COLLECTION, &Filter::field(TTL_FIELD, FieldValue::Timestamp(before)))
        .await
        .unwrap();
    assert_eq!(n, 1);
}
