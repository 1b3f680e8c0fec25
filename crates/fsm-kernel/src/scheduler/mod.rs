//! Transition Scheduler
//!
//! Picks each worker's next state. Outgoing weights of a state are
//! normalized into a distribution once, at sampler construction; a state
//! with no outgoing edges ends the walk.

use crate::error::ConfigurationError;
use crate::types::{TransitionTable, WorkloadState};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::collections::BTreeMap;

struct Row<S> {
    targets: Vec<S>,
    index: WeightedIndex<f64>,
}

/// Weighted next-state sampler for one transition table
pub struct TransitionSampler<S: WorkloadState> {
    rows: BTreeMap<S, Row<S>>,
}

impl<S: WorkloadState> TransitionSampler<S> {
    /// Precompute the per-state distributions
    ///
    /// # Errors
    /// `ConfigurationError` if a row cannot form a distribution. Tables from a
    /// built `WorkloadDescriptor` have already passed this check.
    pub fn new(table: &TransitionTable<S>) -> Result<Self, ConfigurationError> {
        let mut rows = BTreeMap::new();

        for (&from, edges) in table {
            if edges.is_empty() {
                continue;
            }
            if !edges.values().sum::<f64>().is_finite() {
                return Err(ConfigurationError::WeightOverflow(from.name()));
            }
            let targets: Vec<S> = edges.keys().copied().collect();
            let index = WeightedIndex::new(edges.values().copied())
                .map_err(|_| ConfigurationError::NoPositiveWeight(from.name()))?;
            rows.insert(from, Row { targets, index });
        }

        Ok(Self { rows })
    }

    /// Sample the successor of `from`, or `None` if `from` is terminal
    pub fn next_state<R: Rng + ?Sized>(&self, from: S, rng: &mut R) -> Option<S> {
        let row = self.rows.get(&from)?;
        Some(row.targets[row.index.sample(rng)])
    }

    /// Whether `state` has at least one outgoing edge
    #[must_use]
    pub fn has_successors(&self, state: S) -> bool {
        self.rows.contains_key(&state)
    }

    /// The states one walk visits in `steps` steps from `S::INIT`.
    ///
    /// Stops early at a terminal state, so the result may be shorter than
    /// `steps`.
    pub fn walk<R: Rng + ?Sized>(&self, steps: u64, rng: &mut R) -> Vec<S> {
        let mut visited = Vec::new();
        let mut current = Some(S::INIT);

        for _ in 0..steps {
            let Some(state) = current else { break };
            visited.push(state);
            current = self.next_state(state, rng);
        }

        visited
    }
}
