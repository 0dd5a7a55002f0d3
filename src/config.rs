use std::time::Duration;

use crate::error::ExplorationError;

/// Runtime configuration for the exploration engine, loaded from the
/// environment with documented defaults (see `from_env`).
#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    pub worker_count: usize,
    pub max_calls: usize,
    pub max_wall_time: Duration,
    pub similarity_threshold: f64,
    pub breadth_cap: usize,
    pub task_retry_max: u32,
    pub llm_retry_max: u32,
    pub call_timeout: Duration,
    pub plateau_window: usize,
    pub random_seed: u64,
    pub target_phone_number: Option<String>,
    pub scenario_description: String,
    pub grace_shutdown: Duration,
    pub bind_addr: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_calls: 100,
            max_wall_time: Duration::from_secs(3600),
            similarity_threshold: 0.85,
            breadth_cap: 10,
            task_retry_max: 3,
            llm_retry_max: 2,
            call_timeout: Duration::from_secs(300),
            plateau_window: 20,
            random_seed: 0,
            target_phone_number: None,
            scenario_description: "A customer calling to resolve an account issue".to_string(),
            grace_shutdown: Duration::from_secs(10),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ExplorerConfig {
    /// Build a config from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ExplorationError> {
        let defaults = Self::default();

        Ok(Self {
            worker_count: env_parse("EXPLORER_WORKER_COUNT", defaults.worker_count)?,
            max_calls: env_parse("EXPLORER_MAX_CALLS", defaults.max_calls)?,
            max_wall_time: Duration::from_secs(env_parse(
                "EXPLORER_MAX_WALL_TIME_S",
                defaults.max_wall_time.as_secs(),
            )?),
            similarity_threshold: env_parse(
                "EXPLORER_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            )?,
            breadth_cap: env_parse("EXPLORER_BREADTH_CAP", defaults.breadth_cap)?,
            task_retry_max: env_parse("EXPLORER_TASK_RETRY_MAX", defaults.task_retry_max)?,
            llm_retry_max: env_parse("EXPLORER_LLM_RETRY_MAX", defaults.llm_retry_max)?,
            call_timeout: Duration::from_secs(env_parse(
                "EXPLORER_CALL_TIMEOUT_S",
                defaults.call_timeout.as_secs(),
            )?),
            plateau_window: env_parse("EXPLORER_PLATEAU_WINDOW", defaults.plateau_window)?,
            random_seed: env_parse("EXPLORER_RANDOM_SEED", defaults.random_seed)?,
            target_phone_number: std::env::var("EXPLORER_TARGET_PHONE_NUMBER").ok(),
            scenario_description: std::env::var("EXPLORER_SCENARIO_DESCRIPTION")
                .unwrap_or(defaults.scenario_description),
            grace_shutdown: Duration::from_secs(env_parse(
                "EXPLORER_GRACE_SHUTDOWN_S",
                defaults.grace_shutdown.as_secs(),
            )?),
            bind_addr: std::env::var("EXPLORER_BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }
}

/// Parse an environment variable with `FromStr`, falling back to `default`
/// when unset, and surfacing a typed config error when set-but-invalid.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ExplorationError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ExplorationError::Config(format!("{key} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ExplorerConfig::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.max_calls, 100);
        assert_eq!(config.similarity_threshold, 0.85);
        assert_eq!(config.breadth_cap, 10);
        assert_eq!(config.plateau_window, 20);
    }

    #[test]
    fn env_parse_falls_back_to_default_when_unset() {
        unsafe {
            std::env::remove_var("EXPLORER_TEST_UNSET_KEY");
        }
        let value: usize = env_parse("EXPLORER_TEST_UNSET_KEY", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn env_parse_rejects_invalid_numeric_value() {
        unsafe {
            std::env::set_var("EXPLORER_TEST_BAD_KEY", "not-a-number");
        }
        let result: Result<usize, _> = env_parse("EXPLORER_TEST_BAD_KEY", 7);
        assert!(result.is_err());
        unsafe {
            std::env::remove_var("EXPLORER_TEST_BAD_KEY");
        }
    }
}
