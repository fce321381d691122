use std::time::Duration;

use analytics_core::config::Config;
use analytics_core::{ClientBuilder, EventDescriptor};
use serde::Deserialize;

use crate::error::RunError;

/// The `--input` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliInput {
    pub write_key: String,
    pub api_host: String,
    pub sequences: Vec<EventSequence>,
    #[serde(default)]
    pub config: Option<CliConfig>,
}

/// Events submitted back to back after waiting `delay_ms`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSequence {
    #[serde(default)]
    pub delay_ms: i64,
    pub events: Vec<EventDescriptor>,
}

impl EventSequence {
    /// How long to wait before submitting this sequence, if at all.
    pub fn delay(&self) -> Option<Duration> {
        u64::try_from(self.delay_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Client tuning. Anything left out falls back to the environment defaults.
/// Values are read as signed integers so out-of-range input is clamped rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    pub flush_at: Option<i64>,
    /// Milliseconds.
    pub flush_interval: Option<i64>,
    pub max_retries: Option<i64>,
    /// Seconds.
    pub timeout: Option<i64>,
}

impl CliConfig {
    /// Negative values become zero; the client raises zero to one.
    pub fn flush_at(&self) -> Option<usize> {
        self.flush_at
            .map(|n| usize::try_from(n.max(0)).unwrap_or(usize::MAX))
    }

    /// Negative values become zero; the client raises anything below its floor to the floor.
    pub fn flush_interval(&self) -> Option<Duration> {
        self.flush_interval
            .map(|ms| Duration::from_millis(u64::try_from(ms.max(0)).unwrap_or_default()))
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
            .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX))
    }

    /// Non-positive timeouts are ignored.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
            .filter(|secs| *secs > 0)
            .and_then(|secs| u64::try_from(secs).ok())
            .map(Duration::from_secs)
    }
}

impl CliInput {
    pub fn parse(raw: &str) -> Result<Self, RunError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// A client builder for this run: environment defaults overridden by the input's config.
    pub fn client_builder(&self, defaults: &Config) -> ClientBuilder {
        let config = self.config.clone().unwrap_or_default();

        let mut builder = ClientBuilder::from_config(&self.write_key, defaults)
            .host(&self.api_host)
            .flush_at(config.flush_at().unwrap_or(defaults.flush_at))
            .flush_interval(
                config
                    .flush_interval()
                    .unwrap_or(defaults.flush_interval.0),
            );

        if let Some(max_retries) = config.max_retries() {
            builder = builder.max_retries(max_retries);
        }
        if let Some(timeout) = config.timeout() {
            builder = builder.request_timeout(timeout);
        }

        builder
    }
}
