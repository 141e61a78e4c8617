use std::str::FromStr;
use std::time::Duration;

use arcana_core::error::CoreError;
use arcana_core::generation::{
    validate_clip_seconds, validate_style, DEFAULT_CLIP_SECONDS, DEFAULT_STYLE,
};

use crate::retry::RetryBudgets;
use crate::scheduler::PollTiming;

/// Default backend base URL for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";
/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Reveal controller configuration.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct RevealConfig {
    /// Base URL of the generation backend.
    pub api_url: String,
    /// Visual style requested for every clip.
    pub style: String,
    /// Requested clip length in seconds.
    pub seconds: u32,
    pub timing: PollTiming,
    pub budgets: RetryBudgets,
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            style: DEFAULT_STYLE.to_string(),
            seconds: DEFAULT_CLIP_SECONDS,
            timing: PollTiming::default(),
            budgets: RetryBudgets::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl RevealConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                             | Default                 |
    /// |-------------------------------------|-------------------------|
    /// | `REVEAL_API_URL`                    | `http://localhost:3000` |
    /// | `REVEAL_STYLE`                      | `cinematic`             |
    /// | `REVEAL_SECONDS`                    | `5`                     |
    /// | `REVEAL_INITIAL_DELAY_MS`           | `2500`                  |
    /// | `REVEAL_POLL_INTERVAL_MS`           | `5000`                  |
    /// | `REVEAL_DEADLINE_MS`                | `120000`                |
    /// | `REVEAL_REQUEST_TIMEOUT_SECS`       | `30`                    |
    /// | `REVEAL_NOT_FOUND_RETRIES`          | `4`                     |
    /// | `REVEAL_HTTP_RETRIES`               | `3`                     |
    /// | `REVEAL_NETWORK_RETRIES`            | `2`                     |
    /// | `REVEAL_RESET_NOT_FOUND_ON_SUCCESS` | `false`                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_url = var("REVEAL_API_URL").unwrap_or(defaults.api_url);
        let style = var("REVEAL_STYLE").unwrap_or(defaults.style);
        let seconds = parse(&var, "REVEAL_SECONDS", defaults.seconds)?;

        let timing = PollTiming {
            initial_delay: parse_millis(&var, "REVEAL_INITIAL_DELAY_MS", defaults.timing.initial_delay)?,
            interval: parse_millis(&var, "REVEAL_POLL_INTERVAL_MS", defaults.timing.interval)?,
            deadline: parse_millis(&var, "REVEAL_DEADLINE_MS", defaults.timing.deadline)?,
        };
        if timing.interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: "REVEAL_POLL_INTERVAL_MS",
                value: "0".into(),
            });
        }

        let budgets = RetryBudgets {
            not_found: parse(&var, "REVEAL_NOT_FOUND_RETRIES", defaults.budgets.not_found)?,
            http: parse(&var, "REVEAL_HTTP_RETRIES", defaults.budgets.http)?,
            network: parse(&var, "REVEAL_NETWORK_RETRIES", defaults.budgets.network)?,
            reset_not_found_on_success: parse(
                &var,
                "REVEAL_RESET_NOT_FOUND_ON_SUCCESS",
                defaults.budgets.reset_not_found_on_success,
            )?,
        };

        let request_timeout = Duration::from_secs(parse(
            &var,
            "REVEAL_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?);

        validate_style(&style)?;
        validate_clip_seconds(seconds)?;

        Ok(Self {
            api_url,
            style,
            seconds,
            timing,
            budgets,
            request_timeout,
        })
    }
}

fn parse<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&'static str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn parse_millis<F>(var: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    parse(var, name, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = RevealConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.style, DEFAULT_STYLE);
        assert_eq!(config.seconds, DEFAULT_CLIP_SECONDS);
        assert_eq!(config.timing, PollTiming::default());
        assert_eq!(config.budgets, RetryBudgets::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = RevealConfig::from_lookup(lookup(&[
            ("REVEAL_API_URL", "https://cards.example"),
            ("REVEAL_DEADLINE_MS", "60000"),
            ("REVEAL_NOT_FOUND_RETRIES", "6"),
            ("REVEAL_RESET_NOT_FOUND_ON_SUCCESS", "true"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://cards.example");
        assert_eq!(config.timing.deadline, Duration::from_secs(60));
        assert_eq!(config.budgets.not_found, 6);
        assert!(config.budgets.reset_not_found_on_success);
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let err = RevealConfig::from_lookup(lookup(&[("REVEAL_HTTP_RETRIES", "three")])).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "REVEAL_HTTP_RETRIES", .. });
    }

    #[test]
    fn zero_interval_rejected() {
        assert!(RevealConfig::from_lookup(lookup(&[("REVEAL_POLL_INTERVAL_MS", "0")])).is_err());
    }

    #[test]
    fn out_of_range_clip_length_rejected() {
        assert_matches!(
            RevealConfig::from_lookup(lookup(&[("REVEAL_SECONDS", "90")])),
            Err(ConfigError::Core(CoreError::Validation(_)))
        );
    }
}
