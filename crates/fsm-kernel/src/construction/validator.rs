//! Descriptor validation
//!
//! All checks run once at construction. A descriptor that passes is never
//! re-checked by the driver.

use crate::error::ConfigurationError;
use crate::types::{TransitionTable, WorkloadState};
use std::collections::BTreeSet;

/// Checks the raw descriptor parts, in the order the errors are reported:
/// counts, start state, then each transition row.
pub fn validate_descriptor<S: WorkloadState>(
    thread_count: usize,
    iterations: u64,
    states: &BTreeSet<S>,
    transitions: &TransitionTable<S>,
) -> Result<(), ConfigurationError> {
    if thread_count < 1 {
        return Err(ConfigurationError::InvalidThreadCount(thread_count));
    }
    if iterations < 1 {
        return Err(ConfigurationError::InvalidIterations(iterations));
    }
    if !states.contains(&S::INIT) {
        return Err(ConfigurationError::MissingInitState(S::INIT.name()));
    }

    for (&from, row) in transitions {
        if !states.contains(&from) {
            let to = row.keys().next().copied().unwrap_or(from);
            return Err(ConfigurationError::UndefinedState {
                from: from.name(),
                to: to.name(),
                undefined: from.name(),
            });
        }
        validate_row(states, from, row.iter().map(|(&to, &w)| (to, w)))?;
    }

    Ok(())
}

fn validate_row<S: WorkloadState>(
    states: &BTreeSet<S>,
    from: S,
    row: impl Iterator<Item = (S, f64)>,
) -> Result<(), ConfigurationError> {
    let mut total = 0.0;
    let mut edges = 0usize;

    for (to, weight) in row {
        if !states.contains(&to) {
            return Err(ConfigurationError::UndefinedState {
                from: from.name(),
                to: to.name(),
                undefined: to.name(),
            });
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(ConfigurationError::InvalidWeight {
                from: from.name(),
                to: to.name(),
                weight,
            });
        }
        total += weight;
        edges += 1;
    }

    // An empty row is a terminal state; a row of zeros is a typo.
    if edges > 0 && total <= 0.0 {
        return Err(ConfigurationError::NoPositiveWeight(from.name()));
    }
    if !total.is_finite() {
        return Err(ConfigurationError::WeightOverflow(from.name()));
    }
    Ok(())
}
