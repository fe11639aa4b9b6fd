//! Runtime configuration for the coordinator and supervisor.

pub mod loader;

pub use loader::{deep_merge, load_yaml_config, load_yaml_file};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tooling::config::get_env_parse_or;

use crate::error::{OrchestratorError, Result};
use crate::executor::RetryConfig;

/// Tunables that parameterize otherwise-fixed thresholds: max loop length,
/// the strategy-loop detector's complexity cutoff and warm-up period, and
/// the timeouts the supervisor enforces around lock acquisition and group
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub max_iterations: u32,
    pub max_parallel_groups: usize,
    #[serde(with = "duration_millis")]
    pub lock_wait_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub group_deadline: Duration,
    #[serde(with = "duration_millis")]
    pub reproduction_timeout: Duration,
    pub strategy_loop_threshold: i64,
    pub strategy_loop_min_iteration: u32,
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_parallel_groups: 4,
            lock_wait_timeout: Duration::from_secs(30),
            group_deadline: Duration::from_secs(60 * 30),
            reproduction_timeout: Duration::from_secs(120),
            strategy_loop_threshold: 15,
            strategy_loop_min_iteration: 4,
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Reads `CI_REPAIR_*` environment variables over the defaults; any
    /// variable that's absent or fails to parse falls back silently.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let to_duration = |secs: u64| Duration::from_secs(secs);

        Ok(Self {
            max_iterations: env_parse_or(
                "CI_REPAIR_MAX_ITERATIONS",
                defaults.max_iterations,
            )?,
            max_parallel_groups: env_parse_or(
                "CI_REPAIR_MAX_PARALLEL_GROUPS",
                defaults.max_parallel_groups,
            )?,
            lock_wait_timeout: to_duration(env_parse_or(
                "CI_REPAIR_LOCK_WAIT_TIMEOUT_SECS",
                defaults.lock_wait_timeout.as_secs(),
            )?),
            group_deadline: to_duration(env_parse_or(
                "CI_REPAIR_GROUP_DEADLINE_SECS",
                defaults.group_deadline.as_secs(),
            )?),
            reproduction_timeout: to_duration(env_parse_or(
                "CI_REPAIR_REPRODUCTION_TIMEOUT_SECS",
                defaults.reproduction_timeout.as_secs(),
            )?),
            strategy_loop_threshold: env_parse_or(
                "CI_REPAIR_STRATEGY_LOOP_THRESHOLD",
                defaults.strategy_loop_threshold,
            )?,
            strategy_loop_min_iteration: env_parse_or(
                "CI_REPAIR_STRATEGY_LOOP_MIN_ITERATION",
                defaults.strategy_loop_min_iteration,
            )?,
            retry: defaults.retry,
        })
    }

    /// Loads a YAML or JSON config document, honoring `$include` and
    /// `${VAR:default}` directives the same way the loader applies them
    /// to pattern/workflow documents.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        loader::load_yaml_config(path)
    }
}

fn env_parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_parse_or(key, default).map_err(|e| OrchestratorError::General(e.to_string()))
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_expected_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.max_parallel_groups, 4);
        assert_eq!(config.strategy_loop_threshold, 15);
        assert_eq!(config.strategy_loop_min_iteration, 4);
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        std::env::remove_var("CI_REPAIR_MAX_ITERATIONS");
        let config = OrchestratorConfig::from_env().unwrap();
        assert_eq!(config.max_iterations, 5);
    }

    #[test]
    fn from_env_reads_overrides() {
        std::env::set_var("CI_REPAIR_MAX_ITERATIONS", "9");
        let config = OrchestratorConfig::from_env().unwrap();
        assert_eq!(config.max_iterations, 9);
        std::env::remove_var("CI_REPAIR_MAX_ITERATIONS");
    }
}
