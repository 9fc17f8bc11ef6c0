use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::change_detector::DetectorPolicy;
use crate::error::ConfigError;
use crate::health_store::Target;

/// Tunables for the health monitoring subsystem, loaded from the
/// environment with built-in defaults.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Default polling period per target.
    pub base_interval: Duration,
    /// Per-provider overrides of the polling period.
    pub provider_intervals: HashMap<String, Duration>,
    pub degraded_threshold: u32,
    pub down_threshold: u32,
    pub hysteresis_count: u32,
    /// Sliding window during which repeated identical notifications are
    /// suppressed.
    pub dedupe_window: Duration,
    /// Cap on the exponential polling backoff under sustained failures.
    pub max_backoff_multiplier: u32,
    /// Bound on a single check invocation.
    pub check_timeout: Duration,
    /// Targets registered at startup, e.g. "aws:compute,azure:storage".
    pub targets: Vec<Target>,
    /// Health endpoint base URL per provider, e.g. "aws=http://...".
    pub provider_urls: HashMap<String, String>,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            base_interval: Duration::from_millis(env_u64("BASE_INTERVAL_MS", 30_000)?),
            provider_intervals: parse_provider_intervals(&env_string(
                "PROVIDER_INTERVALS_MS",
                "",
            ))?,
            degraded_threshold: env_u32("DEGRADED_THRESHOLD", 1)?,
            down_threshold: env_u32("DOWN_THRESHOLD", 3)?,
            hysteresis_count: env_u32("HYSTERESIS_COUNT", 2)?,
            dedupe_window: Duration::from_millis(env_u64("DEDUPE_WINDOW_MS", 60_000)?),
            max_backoff_multiplier: env_u32("MAX_BACKOFF_MULTIPLIER", 8)?,
            check_timeout: Duration::from_millis(env_u64("CHECK_TIMEOUT_MS", 10_000)?),
            targets: parse_target_list(&env_string("MONITOR_TARGETS", ""))?,
            provider_urls: parse_provider_urls(&env_string("PROVIDER_HEALTH_URLS", ""))?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.base_interval.is_zero() {
            return Err(ConfigError::ZeroValue {
                name: "BASE_INTERVAL_MS",
            });
        }
        if self.check_timeout.is_zero() {
            return Err(ConfigError::ZeroValue {
                name: "CHECK_TIMEOUT_MS",
            });
        }
        if self.dedupe_window.is_zero() {
            return Err(ConfigError::ZeroValue {
                name: "DEDUPE_WINDOW_MS",
            });
        }
        if self.hysteresis_count == 0 {
            return Err(ConfigError::ZeroValue {
                name: "HYSTERESIS_COUNT",
            });
        }
        if self.degraded_threshold == 0 {
            return Err(ConfigError::ZeroValue {
                name: "DEGRADED_THRESHOLD",
            });
        }
        if self.max_backoff_multiplier == 0 {
            return Err(ConfigError::ZeroValue {
                name: "MAX_BACKOFF_MULTIPLIER",
            });
        }
        if self.down_threshold < self.degraded_threshold {
            return Err(ConfigError::ThresholdOrder);
        }
        for interval in self.provider_intervals.values() {
            if interval.is_zero() {
                return Err(ConfigError::ZeroValue {
                    name: "PROVIDER_INTERVALS_MS",
                });
            }
        }
        Ok(())
    }

    /// Polling period for a provider: its override, or the base interval.
    pub fn interval_for(&self, provider: &str) -> Duration {
        self.provider_intervals
            .get(provider)
            .copied()
            .unwrap_or(self.base_interval)
    }

    pub fn detector_policy(&self) -> DetectorPolicy {
        DetectorPolicy {
            degraded_threshold: self.degraded_threshold,
            down_threshold: self.down_threshold,
            hysteresis_count: self.hysteresis_count,
        }
    }

    pub fn log_configuration(&self) {
        info!("Health monitor configuration:");
        info!("  Base interval: {:?}", self.base_interval);
        info!("  Provider interval overrides: {:?}", self.provider_intervals);
        info!("  Degraded threshold: {}", self.degraded_threshold);
        info!("  Down threshold: {}", self.down_threshold);
        info!("  Hysteresis count: {}", self.hysteresis_count);
        info!("  Dedupe window: {:?}", self.dedupe_window);
        info!("  Max backoff multiplier: {}x", self.max_backoff_multiplier);
        info!("  Check timeout: {:?}", self.check_timeout);
        info!("  Targets: {}", self.targets.len());
        info!("  Provider health URLs: {:?}", self.provider_urls);
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

fn env_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

/// Parses "aws:compute,azure:storage" into targets.
fn parse_target_list(raw: &str) -> Result<Vec<Target>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once(':')
                .filter(|(provider, service)| !provider.is_empty() && !service.is_empty())
                .map(|(provider, service)| Target::new(provider.trim(), service.trim()))
                .ok_or_else(|| ConfigError::InvalidValue {
                    name: "MONITOR_TARGETS",
                    value: entry.to_string(),
                })
        })
        .collect()
}

/// Parses "aws=5000,azure=10000" into per-provider intervals.
fn parse_provider_intervals(raw: &str) -> Result<HashMap<String, Duration>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (provider, millis) =
                entry.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
                    name: "PROVIDER_INTERVALS_MS",
                    value: entry.to_string(),
                })?;
            let millis = millis
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "PROVIDER_INTERVALS_MS",
                    value: entry.to_string(),
                })?;
            Ok((
                provider.trim().to_string(),
                Duration::from_millis(millis),
            ))
        })
        .collect()
}

/// Parses "aws=http://aws.internal,azure=http://azure.internal".
fn parse_provider_urls(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .filter(|(provider, url)| !provider.is_empty() && !url.is_empty())
                .map(|(provider, url)| (provider.trim().to_string(), url.trim().to_string()))
                .ok_or_else(|| ConfigError::InvalidValue {
                    name: "PROVIDER_HEALTH_URLS",
                    value: entry.to_string(),
                })
        })
        .collect()
}
