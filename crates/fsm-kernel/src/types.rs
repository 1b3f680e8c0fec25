//! Core workload types
//!
//! States are a closed enum per workload. The driver only needs ordering,
//! a stable name, and to know which variant starts every walk.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

/// A workload's state set.
///
/// Implemented by a fieldless enum; the workload's `execute` matches on it
/// exhaustively, so every declared state has a handler at compile time.
pub trait WorkloadState: Copy + Ord + Hash + Debug + Send + Sync + 'static {
    /// State every worker's walk begins in
    const INIT: Self;

    /// Stable name used in reports, logs and error messages
    fn name(self) -> &'static str;
}

/// Weighted outgoing edges, keyed by source state
pub type TransitionTable<S> = BTreeMap<S, BTreeMap<S, f64>>;

/// Per-worker scratch record owned by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadLocal {
    /// Worker index in `0..thread_count`
    pub tid: usize,
    /// Step currently being executed, zero-based
    pub iteration: u64,
    /// Set by the workload once its start state has run for this worker
    pub has_initialized: bool,
}

impl ThreadLocal {
    /// Fresh local state for worker `tid`
    #[inline]
    #[must_use]
    pub fn new(tid: usize) -> Self {
        Self {
            tid,
            iteration: 0,
            has_initialized: false,
        }
    }
}
