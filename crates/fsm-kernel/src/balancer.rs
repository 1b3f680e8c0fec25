//! Balancer control surface
//!
//! Chunk migrations can hold critical sections that make a TTL monitor pass
//! fail, so teardown turns balancing off for its collection before it
//! waits for expiry. Deployments without a balancer use [`NoopBalancer`].

use crate::error::StoreError;
use parking_lot::Mutex;

/// Chunk-migration control the TTL teardown quiesces
#[async_trait::async_trait]
pub trait Balancer: Send + Sync {
    /// Stop balancing `namespace` (`<db>.<collection>`)
    async fn disable_for_collection(&self, namespace: &str) -> Result<(), StoreError>;

    /// Wait for the in-flight balancing round, if any, to finish
    async fn join_current_round(&self) -> Result<(), StoreError>;
}

/// No balancing subsystem: both calls succeed immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBalancer;

#[async_trait::async_trait]
impl Balancer for NoopBalancer {
    async fn disable_for_collection(&self, _namespace: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn join_current_round(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Balancer stand-in for simulations; remembers what it was asked to do
#[derive(Debug, Default)]
pub struct SimulatedBalancer {
    disabled: Mutex<Vec<String>>,
    rounds_joined: Mutex<u64>,
}

impl SimulatedBalancer {
    /// A balancer with nothing disabled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespaces disabled so far, in call order
    #[must_use]
    pub fn disabled_namespaces(&self) -> Vec<String> {
        self.disabled.lock().clone()
    }

    /// Whether `disable_for_collection` was called for `namespace`
    #[must_use]
    pub fn is_disabled(&self, namespace: &str) -> bool {
        self.disabled.lock().iter().any(|ns| ns == namespace)
    }

    /// Number of `join_current_round` calls
    #[must_use]
    pub fn rounds_joined(&self) -> u64 {
        *self.rounds_joined.lock()
    }
}

#[async_trait::async_trait]
impl Balancer for SimulatedBalancer {
    async fn disable_for_collection(&self, namespace: &str) -> Result<(), StoreError> {
        tracing::info!(namespace, "balancing disabled");
        let mut disabled = self.disabled.lock();
        if !disabled.iter().any(|ns| ns == namespace) {
            disabled.push(namespace.to_string());
        }
        Ok(())
    }

    async fn join_current_round(&self) -> Result<(), StoreError> {
        *self.rounds_joined.lock() += 1;
        Ok(())
    }
}
