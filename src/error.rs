use thiserror::Error;

use crate::health_store::Target;

/// Registration failures reported synchronously by the scheduler.
///
/// Fatal only to the offending `register` call, never to the subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("target {0} is already registered")]
    DuplicateTarget(Target),
    #[error("poll interval for {0} must be greater than zero")]
    InvalidInterval(Target),
}

/// Configuration errors raised while loading or validating `MonitorConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    ZeroValue { name: &'static str },
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("DOWN_THRESHOLD must be greater than or equal to DEGRADED_THRESHOLD")]
    ThresholdOrder,
}
