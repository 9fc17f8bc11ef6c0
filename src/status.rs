use serde::{Deserialize, Serialize};
use std::fmt;

/// Recorded health of a monitored target.
///
/// Every target starts at `Unknown` until its first check resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Down,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
        }
    }

    /// Severity rank used for worst-of aggregation: down > degraded > healthy > unknown.
    pub fn severity_rank(&self) -> u8 {
        match self {
            HealthStatus::Unknown => 0,
            HealthStatus::Healthy => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Down => 3,
        }
    }

    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.severity_rank() > self.severity_rank() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation tokens for a status, consumed by the console's status icons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusVisual {
    pub color_token: &'static str,
    pub icon_token: &'static str,
}

/// Pure, total mapping from status to visual tokens.
pub fn status_visual(status: HealthStatus) -> StatusVisual {
    match status {
        HealthStatus::Unknown => StatusVisual {
            color_token: "neutral",
            icon_token: "status-unknown",
        },
        HealthStatus::Healthy => StatusVisual {
            color_token: "success",
            icon_token: "status-healthy",
        },
        HealthStatus::Degraded => StatusVisual {
            color_token: "warning",
            icon_token: "status-degraded",
        },
        HealthStatus::Down => StatusVisual {
            color_token: "danger",
            icon_token: "status-down",
        },
    }
}
