use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::health_store::{Target, TransitionEvent};
use crate::status::HealthStatus;

/// Toast severity, mapped from the status a target transitioned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Success => f.write_str("success"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A user-facing notification, ready for the console's toast system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Toast {
    pub severity: Severity,
    pub message: String,
    pub target_key: String,
}

/// Downstream toast channel. Delivery is fire-and-forget: a sink must not
/// block and must tolerate an absent consumer.
pub trait ToastSink: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Sink that writes toasts to the log, severity-for-severity.
pub struct TracingToastSink;

impl ToastSink for TracingToastSink {
    fn notify(&self, toast: Toast) {
        match toast.severity {
            Severity::Success => info!("[{}] {}", toast.target_key, toast.message),
            Severity::Warning => warn!("[{}] {}", toast.target_key, toast.message),
            Severity::Error => error!("[{}] {}", toast.target_key, toast.message),
        }
    }
}

/// Bounded channel sink for a mounted toast UI. When the consumer is gone
/// or the channel is full the toast is dropped, never blocked on.
pub struct ChannelToastSink {
    tx: mpsc::Sender<Toast>,
}

impl ChannelToastSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Toast>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ToastSink for ChannelToastSink {
    fn notify(&self, toast: Toast) {
        if let Err(e) = self.tx.try_send(toast) {
            debug!("toast channel unavailable, dropping notification: {e}");
        }
    }
}

/// Recording sink for tests.
pub struct MockToastSink {
    toasts: Mutex<Vec<Toast>>,
}

impl MockToastSink {
    pub fn new() -> Self {
        Self {
            toasts: Mutex::new(Vec::new()),
        }
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap().clone()
    }
}

impl Default for MockToastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ToastSink for MockToastSink {
    fn notify(&self, toast: Toast) {
        self.toasts.lock().unwrap().push(toast);
    }
}

/// Converts accepted transitions into deduplicated toasts.
///
/// A given (target, to-status) pair fires at most once per sliding window;
/// identical transitions re-delivered inside the window are swallowed.
pub struct NotificationDispatcher {
    sink: Arc<dyn ToastSink>,
    window_ms: i64,
    recent: Mutex<HashMap<(Target, HealthStatus), chrono::DateTime<chrono::Utc>>>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn ToastSink>, dedupe_window: Duration) -> Self {
        Self {
            sink,
            window_ms: i64::try_from(dedupe_window.as_millis()).unwrap_or(i64::MAX),
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn dispatch(&self, event: &TransitionEvent) {
        // Targets falling back to unknown (reset/teardown) are never notified.
        let severity = match event.to {
            HealthStatus::Healthy => Severity::Success,
            HealthStatus::Degraded => Severity::Warning,
            HealthStatus::Down => Severity::Error,
            HealthStatus::Unknown => return,
        };

        let key = (event.target.clone(), event.to);
        {
            let mut recent = self.recent.lock().unwrap();
            if let Some(fired_at) = recent.get(&key) {
                let elapsed_ms = event.at.signed_duration_since(*fired_at).num_milliseconds();
                if elapsed_ms < self.window_ms {
                    debug!(
                        "Suppressing duplicate {} notification for {}",
                        event.to, event.target
                    );
                    return;
                }
            }
            let now = event.at;
            let window_ms = self.window_ms;
            recent.retain(|_, fired_at| {
                now.signed_duration_since(*fired_at).num_milliseconds() < window_ms
            });
            recent.insert(key, event.at);
        }

        self.sink.notify(Toast {
            severity,
            message: format!(
                "{} {} is {}",
                event.target.provider, event.target.service, event.to
            ),
            target_key: event.target.key(),
        });
    }
}
