//! Error types for the FSM kernel
//!
//! Every error in this crate is fatal to the run it occurs in:
//! - `ConfigurationError`: malformed descriptor or harness config, raised
//!   before any hook runs
//! - `AssertionError`: a state-function postcondition did not hold
//! - `StoreError`: the backing store rejected a call
//! - `ConvergenceTimeoutError`: the teardown poll exhausted its budget

use crate::state_machine::RunPhase;
use std::time::Duration;

/// Top-level error for a workload run
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    /// Descriptor or harness configuration is malformed
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// State function postcondition violated
    #[error("assertion failed: {0}")]
    Assertion(#[from] AssertionError),

    /// Store call failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Teardown poll timed out
    #[error("convergence timeout: {0}")]
    ConvergenceTimeout(#[from] ConvergenceTimeoutError),

    /// Driver attempted an illegal run phase transition
    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    /// Worker task panicked or was cancelled
    #[error("worker {tid} did not complete: {reason}")]
    WorkerLost {
        /// Worker thread id
        tid: usize,
        /// Panic payload or cancellation reason
        reason: String,
    },
}

impl WorkloadError {
    /// Every workload error aborts the run it belongs to
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        true
    }

    /// Nothing at this layer is retried; the convergence poll retries its
    /// own check internally and only surfaces the final timeout.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Terminal run phase this error drives the run into
    #[must_use]
    pub fn terminal_phase(&self) -> RunPhase {
        match self {
            Self::ConvergenceTimeout(_) => RunPhase::TimedOut,
            _ => RunPhase::Aborted,
        }
    }

    /// Short stable label for reports and logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::Assertion(_) => "AssertionError",
            Self::Store(_) => "StoreError",
            Self::ConvergenceTimeout(_) => "ConvergenceTimeoutError",
            Self::StateMachine(_) => "StateMachineError",
            Self::WorkerLost { .. } => "WorkerLost",
        }
    }
}

/// Malformed descriptor or harness configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    /// `thread_count` must be at least 1
    #[error("thread count must be positive, got {0}")]
    InvalidThreadCount(usize),

    /// `iterations` must be at least 1
    #[error("iteration count must be positive, got {0}")]
    InvalidIterations(u64),

    /// The state set has no handler for the start state
    #[error("states lack an entry for the start state '{0}'")]
    MissingInitState(&'static str),

    /// A transition names a state with no handler
    #[error("transition {from} -> {to} references undefined state '{undefined}'")]
    UndefinedState {
        /// Source state of the offending transition
        from: &'static str,
        /// Target state of the offending transition
        to: &'static str,
        /// The endpoint missing from the state set
        undefined: &'static str,
    },

    /// A weight is negative, NaN or infinite
    #[error("transition {from} -> {to} has invalid weight {weight}")]
    InvalidWeight {
        /// Source state
        from: &'static str,
        /// Target state
        to: &'static str,
        /// Rejected weight
        weight: f64,
    },

    /// A non-empty transition row sums to zero
    #[error("transitions out of '{0}' have no positive weight")]
    NoPositiveWeight(&'static str),

    /// The weights of one row sum past `f64::MAX`
    #[error("transition weights out of '{0}' overflow")]
    WeightOverflow(&'static str),

    /// Harness config file could not be parsed
    #[error("invalid harness config: {0}")]
    Parse(String),

    /// A harness config value is out of range
    #[error("invalid harness config value for {field}: {reason}")]
    Invalid {
        /// Config key
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Harness config file could not be read
    #[error("cannot read harness config {path}: {reason}")]
    Read {
        /// File path
        path: String,
        /// Underlying I/O error text
        reason: String,
    },
}

impl From<toml::de::Error> for ConfigurationError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Postcondition of a state function did not hold
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AssertionError {
    /// Human-readable failure, includes the serialized store result
    pub message: String,
}

impl AssertionError {
    /// Create a new assertion error
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure reported by the store or balancer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Could not reach the store
    #[error("transport failure: {0}")]
    Transport(String),

    /// Store rejected the request
    #[error("validation failure: {0}")]
    Validation(String),

    /// Index creation conflicted with an existing index
    #[error("index conflict on {collection}: {reason}")]
    IndexConflict {
        /// Collection name
        collection: String,
        /// Conflict description
        reason: String,
    },

    /// Balancer call failed
    #[error("balancer failure: {0}")]
    Balancer(String),
}

/// Convergence poll ran out of time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (timed out after {}ms)", .timeout.as_millis())]
pub struct ConvergenceTimeoutError {
    /// What was expected to converge
    pub message: String,
    /// Budget that was exhausted
    pub timeout: Duration,
}

/// Illegal run phase transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// `from -> to` is not an edge of the run phase machine
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current phase
        from: RunPhase,
        /// Requested phase
        to: RunPhase,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_timed_out_phase() {
        let err = WorkloadError::from(ConvergenceTimeoutError {
            message: "expected oldest documents with TTL fields to be removed".into(),
            timeout: Duration::from_millis(120_000),
        });
        assert_eq!(err.terminal_phase(), RunPhase::TimedOut);
        assert_eq!(err.kind(), "ConvergenceTimeoutError");
        assert!(err.to_string().contains("120000ms"));
    }

    #[test]
    fn everything_else_aborts() {
        let errs = [
            WorkloadError::from(AssertionError::new("unexpected insert count")),
            WorkloadError::from(StoreError::Transport("connection reset".into())),
            WorkloadError::from(ConfigurationError::InvalidThreadCount(0)),
        ];
        for err in errs {
            assert!(err.is_fatal());
            assert!(!err.is_retryable());
            assert_eq!(err.terminal_phase(), RunPhase::Aborted);
        }
    }

    #[test]
    fn toml_errors_become_parse_errors() {
        let bad = toml::from_str::<toml::Value>("= nope").unwrap_err();
        assert!(matches!(
            ConfigurationError::from(bad),
            ConfigurationError::Parse(_)
        ));
    }
}
