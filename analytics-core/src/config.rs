use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use crate::retry::RetryPolicy;

pub const DEFAULT_HOST: &str = "https://api.segment.io";

/// Flush intervals below this are raised to it.
pub const MIN_FLUSH_INTERVAL: time::Duration = time::Duration::from_millis(1000);

/// Delivery client defaults, overridable from the environment.
#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "ANALYTICS_HOST", default = "https://api.segment.io")]
    pub host: String,

    #[envconfig(from = "ANALYTICS_FLUSH_AT", default = "20")]
    pub flush_at: usize,

    #[envconfig(from = "ANALYTICS_FLUSH_INTERVAL", default = "10000")]
    pub flush_interval: EnvMsDuration,

    #[envconfig(from = "ANALYTICS_MAX_RETRIES", default = "3")]
    pub max_retries: u32,

    #[envconfig(from = "ANALYTICS_REQUEST_TIMEOUT", default = "10000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(nested = true)]
    pub retry_policy: RetryPolicyConfig,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_policy.backoff_coefficient,
            self.retry_policy.initial_interval.0,
            Some(self.retry_policy.maximum_interval.0),
            self.max_retries,
        )
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct RetryPolicyConfig {
    #[envconfig(from = "ANALYTICS_RETRY_BACKOFF_COEFFICIENT", default = "2")]
    pub backoff_coefficient: u32,

    #[envconfig(from = "ANALYTICS_RETRY_INITIAL_INTERVAL", default = "100")]
    pub initial_interval: EnvMsDuration,

    #[envconfig(from = "ANALYTICS_RETRY_MAXIMUM_INTERVAL", default = "10000")]
    pub maximum_interval: EnvMsDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl std::fmt::Display for ParseEnvMsDurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("expected a duration in milliseconds")
    }
}

impl std::error::Error for ParseEnvMsDurationError {}

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();

        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.flush_at, 20);
        assert_eq!(config.flush_interval.0, time::Duration::from_secs(10));
        assert_eq!(config.request_timeout.0, time::Duration::from_secs(10));
        assert_eq!(config.retry_policy().max_retries(), 3);
    }

    #[test]
    fn test_overrides_from_environment() {
        let env = HashMap::from([
            ("ANALYTICS_FLUSH_AT".to_owned(), "1".to_owned()),
            ("ANALYTICS_MAX_RETRIES".to_owned(), "0".to_owned()),
            ("ANALYTICS_RETRY_INITIAL_INTERVAL".to_owned(), "5".to_owned()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();

        assert_eq!(config.flush_at, 1);
        assert_eq!(config.retry_policy.initial_interval.0, time::Duration::from_millis(5));
        assert!(!config.retry_policy().should_retry(0));
    }

    #[test]
    fn test_ms_duration_rejects_garbage() {
        assert_eq!(
            "1500".parse::<EnvMsDuration>(),
            Ok(EnvMsDuration(time::Duration::from_millis(1500)))
        );
        assert_eq!("1.5s".parse::<EnvMsDuration>(), Err(ParseEnvMsDurationError));
    }
}
