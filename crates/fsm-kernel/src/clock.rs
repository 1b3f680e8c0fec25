//! Wall-clock timestamps that follow tokio's clock.
//!
//! Documents carry wall-clock timestamps while the TTL monitor and the
//! convergence poll run on tokio timers. Anchoring one to the other keeps
//! them consistent when tests pause or advance tokio time.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Shared clock; cheap to clone
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall_anchor: DateTime<Utc>,
    mono_anchor: Instant,
}

impl Clock {
    /// Anchor a clock at the current wall time
    #[must_use]
    pub fn new() -> Self {
        Self {
            wall_anchor: Utc::now(),
            mono_anchor: Instant::now(),
        }
    }

    /// Current wall-clock time as seen through tokio's clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.mono_anchor);
        match chrono::Duration::from_std(elapsed) {
            Ok(d) => self.wall_anchor + d,
            Err(_) => self.wall_anchor,
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
