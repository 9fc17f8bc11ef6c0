use std::sync::Arc;
use tracing::{debug, info};

use crate::health_store::{HealthRecord, HealthStore, RawResult, TransitionEvent};
use crate::notifier::NotificationDispatcher;
use crate::status::HealthStatus;
use crate::subscription::SubscriptionHub;

/// Thresholds governing classification and hysteresis.
#[derive(Debug, Clone)]
pub struct DetectorPolicy {
    /// Consecutive failures before a target reads as degraded.
    pub degraded_threshold: u32,
    /// Consecutive failures before a target reads as down.
    pub down_threshold: u32,
    /// Agreeing raw classifications required to accept a transition.
    pub hysteresis_count: u32,
}

impl Default for DetectorPolicy {
    fn default() -> Self {
        Self {
            degraded_threshold: 1,
            down_threshold: 3,
            hysteresis_count: 2,
        }
    }
}

/// Decides when the recorded status actually changes.
///
/// Raw results stream in from the scheduler; each one is classified and
/// either accepted as a transition (store updated, event fanned out) or
/// absorbed as bookkeeping. A transition needs the candidate status to
/// differ from the stored one and to repeat `hysteresis_count` raw
/// classifications in a row, so a single transient failure among healthy
/// checks never flips the visible status. The exception is a target's
/// first-ever result, which applies immediately so nothing lingers on
/// `unknown`.
///
/// Runs synchronously once invoked: no suspension between the store read
/// and the fan-out.
pub struct ChangeDetector {
    store: Arc<HealthStore>,
    policy: DetectorPolicy,
    notifier: Arc<NotificationDispatcher>,
    hub: Arc<SubscriptionHub>,
}

impl ChangeDetector {
    pub fn new(
        store: Arc<HealthStore>,
        policy: DetectorPolicy,
        notifier: Arc<NotificationDispatcher>,
        hub: Arc<SubscriptionHub>,
    ) -> Self {
        Self {
            store,
            policy,
            notifier,
            hub,
        }
    }

    /// Evaluate one raw result. Returns the transition if one was accepted.
    pub fn evaluate(&self, raw: &RawResult) -> Option<TransitionEvent> {
        let before = self.store.get(&raw.target);
        let candidate = self.classify(&before, raw);
        let observation = self.store.record_check(raw, candidate);

        if candidate == observation.record.status {
            return None;
        }

        let accepted = observation.first_check
            || observation.record.consecutive_same_raw >= self.policy.hysteresis_count;
        if !accepted {
            debug!(
                "Transition candidate {} for {} rejected by hysteresis ({} agreeing)",
                candidate, raw.target, observation.record.consecutive_same_raw
            );
            return None;
        }

        let event = TransitionEvent {
            target: raw.target.clone(),
            from: observation.record.status,
            to: candidate,
            at: raw.observed_at,
        };
        self.store.apply_transition(&event);
        info!(
            "Status transition for {}: {} -> {}",
            event.target, event.from, event.to
        );
        self.notifier.dispatch(&event);
        self.hub.publish(&event);
        Some(event)
    }

    fn classify(&self, before: &HealthRecord, raw: &RawResult) -> HealthStatus {
        if raw.ok {
            return HealthStatus::Healthy;
        }
        let failures = before.consecutive_failures.saturating_add(1);
        if failures >= self.policy.down_threshold {
            HealthStatus::Down
        } else if failures >= self.policy.degraded_threshold {
            HealthStatus::Degraded
        } else {
            // Too few failures to reclassify yet.
            before.status
        }
    }
}
