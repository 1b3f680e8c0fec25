//! Run lifecycle state machine
//!
//! `NotStarted -> SetupRunning -> WorkersRunning -> TeardownRunning`, ending in
//! one of `Converged`, `TimedOut` or `Aborted`. `Aborted` is reachable from
//! every non-terminal phase; `TimedOut` only from `TeardownRunning`.

use crate::error::StateMachineError;
use serde::{Deserialize, Serialize};

/// Phase of a workload run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunPhase {
    /// Descriptor not yet validated
    NotStarted,
    /// Setup hook has exclusive access
    SetupRunning,
    /// Workers are walking the transition table
    WorkersRunning,
    /// Teardown hook has exclusive access
    TeardownRunning,
    /// Teardown observed convergence
    Converged,
    /// Teardown poll exhausted its budget
    TimedOut,
    /// A fatal error stopped the run
    Aborted,
}

impl RunPhase {
    /// No transitions leave a terminal phase
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::TimedOut | Self::Aborted)
    }

    /// Only `Converged` counts as success
    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Converged
    }
}

/// Validates a run phase transition.
pub fn validate_transition(from: RunPhase, to: RunPhase) -> Result<(), StateMachineError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(StateMachineError::IllegalTransition { from, to })
    }
}

/// Phases reachable from `from` in one step
pub fn allowed_transitions(from: RunPhase) -> Vec<RunPhase> {
    use RunPhase::*;
    match from {
        NotStarted => vec![SetupRunning, Aborted],
        SetupRunning => vec![WorkersRunning, Aborted],
        WorkersRunning => vec![TeardownRunning, Aborted],
        TeardownRunning => vec![Converged, TimedOut, Aborted],
        Converged => vec![],
        TimedOut => vec![],
        Aborted => vec![],
    }
}

fn allowed(from: RunPhase, to: RunPhase) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

/// Tracks the current phase and the path taken to reach it
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    current: RunPhase,
    history: Vec<RunPhase>,
}

impl RunStateMachine {
    /// Start in `NotStarted`
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RunPhase::NotStarted,
            history: vec![RunPhase::NotStarted],
        }
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn current(&self) -> RunPhase {
        self.current
    }

    /// Phases visited so far, starting with `NotStarted`
    #[must_use]
    pub fn history(&self) -> &[RunPhase] {
        &self.history
    }

    /// Move to `to`, rejecting edges the machine does not have
    pub fn advance(&mut self, to: RunPhase) -> Result<(), StateMachineError> {
        validate_transition(self.current, to)?;
        tracing::debug!(from = ?self.current, to = ?to, "run phase transition");
        self.current = to;
        self.history.push(to);
        Ok(())
    }
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
