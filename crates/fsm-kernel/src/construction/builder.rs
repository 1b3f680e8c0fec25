//! Workload Builder
//!
//! The construction-phase interface. Collects the thread and iteration
//! counts, the state set, the weighted transitions and the shared data, then
//! validates them into an immutable `WorkloadDescriptor`.

use crate::construction::validator::validate_descriptor;
use crate::error::ConfigurationError;
use crate::types::{TransitionTable, WorkloadState};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Builder for validated workload descriptors
///
/// Usage:
/// ```rust,ignore
/// let descriptor = WorkloadBuilder::new(TtlData { ttl_seconds: 5 })
///     .thread_count(20)
///     .iterations(200)
///     .states([State::Init, State::Insert])
///     .transition(State::Init, State::Insert, 1.0)
///     .transition(State::Insert, State::Insert, 1.0)
///     .build()?;
/// ```
pub struct WorkloadBuilder<S: WorkloadState, D> {
    thread_count: usize,
    iterations: u64,
    states: BTreeSet<S>,
    transitions: TransitionTable<S>,
    data: D,
}

impl<S: WorkloadState, D> WorkloadBuilder<S, D> {
    /// Start a builder around the shared data. Counts start at zero and must
    /// be set before `build`.
    pub fn new(data: D) -> Self {
        Self {
            thread_count: 0,
            iterations: 0,
            states: BTreeSet::new(),
            transitions: BTreeMap::new(),
            data,
        }
    }

    /// Number of concurrent workers
    #[must_use]
    pub fn thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Steps each worker takes
    #[must_use]
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Register a state as having a handler
    #[must_use]
    pub fn state(mut self, state: S) -> Self {
        self.states.insert(state);
        self
    }

    /// Register several states at once
    #[must_use]
    pub fn states(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.states.extend(states);
        self
    }

    /// Add a weighted edge. Re-adding an edge replaces its weight.
    #[must_use]
    pub fn transition(mut self, from: S, to: S, weight: f64) -> Self {
        self.transitions.entry(from).or_default().insert(to, weight);
        self
    }

    /// Declare `state` terminal: present in the table with no outgoing edges
    #[must_use]
    pub fn terminal(mut self, state: S) -> Self {
        self.transitions.entry(state).or_default();
        self
    }

    /// Validate and freeze the descriptor
    pub fn build(self) -> Result<WorkloadDescriptor<S, D>, ConfigurationError> {
        validate_descriptor(
            self.thread_count,
            self.iterations,
            &self.states,
            &self.transitions,
        )?;

        Ok(WorkloadDescriptor {
            thread_count: self.thread_count,
            iterations: self.iterations,
            states: self.states,
            transitions: Arc::new(self.transitions),
            data: Arc::new(self.data),
        })
    }
}

/// Validated, read-only workload descriptor
pub struct WorkloadDescriptor<S: WorkloadState, D> {
    thread_count: usize,
    iterations: u64,
    states: BTreeSet<S>,
    transitions: Arc<TransitionTable<S>>,
    data: Arc<D>,
}

impl<S: WorkloadState, D> WorkloadDescriptor<S, D> {
    /// Concurrent workers
    #[inline]
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Steps per worker
    #[inline]
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Declared states
    #[must_use]
    pub fn states(&self) -> &BTreeSet<S> {
        &self.states
    }

    /// Weighted edges by source state
    #[must_use]
    pub fn transitions(&self) -> &TransitionTable<S> {
        &self.transitions
    }

    /// Shared data handle, cloned into every worker
    #[must_use]
    pub fn data(&self) -> &Arc<D> {
        &self.data
    }

    /// Outgoing edges of `state`; empty for a terminal state
    pub fn outgoing(&self, state: S) -> impl Iterator<Item = (S, f64)> + '_ {
        self.transitions
            .get(&state)
            .into_iter()
            .flat_map(|row| row.iter().map(|(&to, &w)| (to, w)))
    }
}

impl<S: WorkloadState, D> Clone for WorkloadDescriptor<S, D> {
    fn clone(&self) -> Self {
        Self {
            thread_count: self.thread_count,
            iterations: self.iterations,
            states: self.states.clone(),
            transitions: Arc::clone(&self.transitions),
            data: Arc::clone(&self.data),
        }
    }
}

impl<S: WorkloadState, D> fmt::Debug for WorkloadDescriptor<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadDescriptor")
            .field("thread_count", &self.thread_count)
            .field("iterations", &self.iterations)
            .field("states", &self.states)
            .field("transitions", &self.transitions)
            .finish_non_exhaustive()
    }
}
