//! Harness configuration
//!
//! Process-wide test flags live here instead of in globals. The config is
//! assembled once (defaults, then TOML file, then environment, then CLI
//! flags) and handed to every hook read-only.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Env var: run teardown's balancer quiescing step
pub const ENV_RUNNING_WITH_BALANCER: &str = "FSM_RUNNING_WITH_BALANCER";
/// Env var: scale timeouts for slow shared CI hosts
pub const ENV_IN_CI: &str = "FSM_IN_CI";
/// Conventional CI marker honored as a fallback for `ENV_IN_CI`
pub const ENV_CI: &str = "CI";

/// Flags and knobs shared by every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// The store runs under a balancer that must be quiesced in teardown
    pub running_with_balancer: bool,
    /// CI-like execution; stretches convergence timeouts
    pub ci_environment: bool,
    /// Database name used to form `<db>.<collection>` namespaces
    pub db_name: String,
    /// Sleep between convergence poll checks
    pub poll_interval_ms: u64,
    /// Base seed; worker `tid` walks with `seed + tid`
    pub seed: u64,
}

impl HarnessConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `running_with_balancer`
    #[inline]
    #[must_use]
    pub fn with_balancer(mut self, running_with_balancer: bool) -> Self {
        self.running_with_balancer = running_with_balancer;
        self
    }

    /// Set `ci_environment`
    #[inline]
    #[must_use]
    pub fn with_ci(mut self, ci_environment: bool) -> Self {
        self.ci_environment = ci_environment;
        self
    }

    /// Set the base seed
    #[inline]
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the convergence poll interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the database name
    #[inline]
    #[must_use]
    pub fn with_db_name(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = db_name.into();
        self
    }

    /// `poll_interval_ms` as a `Duration`
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Full namespace of `collection`
    #[must_use]
    pub fn namespace(&self, collection: &str) -> String {
        format!("{}.{collection}", self.db_name)
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(s)?;
        config.check()?;
        Ok(config)
    }

    /// Read a TOML file, apply environment overrides and check the values
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply environment overrides from the process environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (tests inject a map here)
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup(ENV_RUNNING_WITH_BALANCER) {
            self.running_with_balancer = truthy(&v);
        }
        match lookup(ENV_IN_CI) {
            Some(v) => self.ci_environment = truthy(&v),
            None => {
                if let Some(v) = lookup(ENV_CI) {
                    self.ci_environment = self.ci_environment || truthy(&v);
                }
            }
        }
        self
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::Invalid {
                field: "poll_interval_ms",
                reason: "must be positive".into(),
            });
        }
        if self.db_name.is_empty() {
            return Err(ConfigurationError::Invalid {
                field: "db_name",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            running_with_balancer: false,
            ci_environment: false,
            db_name: "test".to_string(),
            poll_interval_ms: 200,
            seed: 42,
        }
    }
}

fn truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults() {
        let c = HarnessConfig::default();
        assert!(!c.running_with_balancer);
        assert!(!c.ci_environment);
        assert_eq!(c.poll_interval(), Duration::from_millis(200));
        assert_eq!(c.namespace("coll"), "test.coll");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = HarnessConfig::from_toml_str("ci_environment = true\nseed = 7\n").unwrap();
        assert!(c.ci_environment);
        assert_eq!(c.seed, 7);
        assert_eq!(c.db_name, "test");
    }

    #[test]
    fn out_of_range_values_are_invalid_not_parse_errors() {
        assert!(matches!(
            HarnessConfig::from_toml_str("poll_interval_ms = 0"),
            Err(ConfigurationError::Invalid { field: "poll_interval_ms", .. })
        ));
        assert!(matches!(
            HarnessConfig::from_toml_str("db_name = \"\""),
            Err(ConfigurationError::Invalid { field: "db_name", .. })
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            HarnessConfig::from_toml_str("poll_interval_ms = \"fast\""),
            Err(ConfigurationError::Parse(_))
        ));
    }

    #[test]
    fn reads_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "running_with_balancer = true\ndb_name = \"fsm\"").unwrap();
        let c = HarnessConfig::from_file(f.path()).unwrap();
        assert!(c.running_with_balancer);
        assert_eq!(c.namespace("x"), "fsm.x");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            HarnessConfig::from_file("/definitely/not/here.toml"),
            Err(ConfigurationError::Read { .. })
        ));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> =
            [(ENV_RUNNING_WITH_BALANCER, "true"), (ENV_CI, "1")].into();
        let c = HarnessConfig::new().with_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert!(c.running_with_balancer);
        assert!(c.ci_environment);

        // explicit flag wins over the generic CI marker
        let env: HashMap<&str, &str> = [(ENV_IN_CI, "0"), (ENV_CI, "true")].into();
        let c = HarnessConfig::new()
            .with_ci(true)
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert!(!c.ci_environment);
    }
}
