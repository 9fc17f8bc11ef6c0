use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use crate::status::HealthStatus;

/// One monitored unit: a (provider, service) pair.
///
/// Provider ids form an open set ("aws", "azure", "microsoft365", ...);
/// service ids are provider-defined ("compute", "storage", "directory").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub provider: String,
    pub service: String,
}

impl Target {
    pub fn new(provider: &str, service: &str) -> Self {
        Self {
            provider: provider.to_string(),
            service: service.to_string(),
        }
    }

    /// Stable string key, e.g. "aws/compute".
    pub fn key(&self) -> String {
        format!("{}/{}", self.provider, self.service)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.service)
    }
}

/// Outcome of a single check, as handed to the change detector.
///
/// Ephemeral: never stored beyond the evaluation it triggers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawResult {
    pub target: Target,
    pub ok: bool,
    pub observed_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Persisted per-target health state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    pub target: Target,
    pub status: HealthStatus,
    /// How many consecutive raw classifications agreed with `last_candidate`.
    pub consecutive_same_raw: u32,
    /// The most recent raw classification, compared by the hysteresis rule.
    pub last_candidate: Option<HealthStatus>,
    pub last_transition_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl HealthRecord {
    fn unknown(target: Target) -> Self {
        Self {
            target,
            status: HealthStatus::Unknown,
            consecutive_same_raw: 0,
            last_candidate: None,
            last_transition_at: None,
            last_checked_at: None,
            consecutive_failures: 0,
        }
    }
}

/// An accepted status change. The only unit the dispatcher and hub consume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub target: Target,
    pub from: HealthStatus,
    pub to: HealthStatus,
    pub at: DateTime<Utc>,
}

/// Point-in-time copy of all records. Does not update live.
pub type Snapshot = HashMap<Target, HealthRecord>;

/// Result of recording a check against the store.
#[derive(Debug, Clone)]
pub(crate) struct CheckObservation {
    /// The record after bookkeeping, before any transition is applied.
    pub record: HealthRecord,
    /// True when this was the target's first-ever check.
    pub first_check: bool,
}

/// Authoritative in-memory map of current status per monitored target.
///
/// Reads are open to all consumers; mutation is crate-internal so status can
/// only change through the change detector's accepted transitions.
#[derive(Debug, Default)]
pub struct HealthStore {
    records: RwLock<HashMap<Target, HealthRecord>>,
}

impl HealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record for a target. Never fails; targets that have not been
    /// checked yet read as the `unknown` record.
    pub fn get(&self, target: &Target) -> HealthRecord {
        let records = self.records.read().unwrap();
        records
            .get(target)
            .cloned()
            .unwrap_or_else(|| HealthRecord::unknown(target.clone()))
    }

    /// Point-in-time copy of every known record.
    pub fn snapshot_all(&self) -> Snapshot {
        self.records.read().unwrap().clone()
    }

    /// Worst status among all targets of a provider, recomputed on demand.
    pub fn provider_summary(&self, provider: &str) -> HealthStatus {
        let records = self.records.read().unwrap();
        records
            .values()
            .filter(|record| record.target.provider == provider)
            .fold(HealthStatus::Unknown, |worst, record| {
                worst.worst(record.status)
            })
    }

    /// Seed the unknown record for a registered target so snapshots include
    /// it before its first check resolves.
    pub(crate) fn register_target(&self, target: &Target) {
        let mut records = self.records.write().unwrap();
        records
            .entry(target.clone())
            .or_insert_with(|| HealthRecord::unknown(target.clone()));
    }

    /// Unconditional bookkeeping for a completed check: `last_checked_at`
    /// (monotonically non-decreasing), `consecutive_failures`, and the raw
    /// classification agreement counters. Does not touch `status`.
    pub(crate) fn record_check(
        &self,
        raw: &RawResult,
        candidate: HealthStatus,
    ) -> CheckObservation {
        let mut records = self.records.write().unwrap();
        let record = records
            .entry(raw.target.clone())
            .or_insert_with(|| HealthRecord::unknown(raw.target.clone()));

        let first_check = record.last_checked_at.is_none();

        record.last_checked_at = Some(match record.last_checked_at {
            Some(prev) if prev > raw.observed_at => prev,
            _ => raw.observed_at,
        });
        record.consecutive_failures = if raw.ok {
            0
        } else {
            record.consecutive_failures.saturating_add(1)
        };
        if record.last_candidate == Some(candidate) {
            record.consecutive_same_raw = record.consecutive_same_raw.saturating_add(1);
        } else {
            record.last_candidate = Some(candidate);
            record.consecutive_same_raw = 1;
        }

        CheckObservation {
            record: record.clone(),
            first_check,
        }
    }

    /// Apply an accepted transition. Invoked exclusively by the change
    /// detector.
    pub(crate) fn apply_transition(&self, event: &TransitionEvent) {
        let mut records = self.records.write().unwrap();
        if let Some(record) = records.get_mut(&event.target) {
            record.status = event.to;
            record.last_transition_at = Some(event.at);
            record.consecutive_same_raw = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn raw(target: &Target, ok: bool, observed_at: DateTime<Utc>) -> RawResult {
        RawResult {
            target: target.clone(),
            ok,
            observed_at,
            error: if ok { None } else { Some("refused".to_string()) },
        }
    }

    #[test]
    fn test_get_returns_unknown_default() {
        let store = HealthStore::new();
        let target = Target::new("aws", "compute");

        let record = store.get(&target);
        assert_eq!(record.status, HealthStatus::Unknown);
        assert_eq!(record.consecutive_failures, 0);
        assert!(record.last_checked_at.is_none());
        // Reading must not create an entry.
        assert!(store.snapshot_all().is_empty());
    }

    #[test]
    fn test_register_target_seeds_unknown_record() {
        let store = HealthStore::new();
        let target = Target::new("azure", "storage");

        store.register_target(&target);

        let snapshot = store.snapshot_all();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&target].status, HealthStatus::Unknown);
    }

    #[test]
    fn test_record_check_tracks_failures_and_first_check() {
        let store = HealthStore::new();
        let target = Target::new("aws", "compute");
        let t0 = Utc::now();

        let obs = store.record_check(&raw(&target, false, t0), HealthStatus::Degraded);
        assert!(obs.first_check);
        assert_eq!(obs.record.consecutive_failures, 1);
        assert_eq!(obs.record.consecutive_same_raw, 1);

        let obs = store.record_check(
            &raw(&target, false, t0 + Duration::seconds(1)),
            HealthStatus::Degraded,
        );
        assert!(!obs.first_check);
        assert_eq!(obs.record.consecutive_failures, 2);
        assert_eq!(obs.record.consecutive_same_raw, 2);

        let obs = store.record_check(
            &raw(&target, true, t0 + Duration::seconds(2)),
            HealthStatus::Healthy,
        );
        assert_eq!(obs.record.consecutive_failures, 0);
        assert_eq!(obs.record.consecutive_same_raw, 1);
        assert_eq!(obs.record.last_candidate, Some(HealthStatus::Healthy));
    }

    #[test]
    fn test_last_checked_at_is_monotonic() {
        let store = HealthStore::new();
        let target = Target::new("aws", "compute");
        let t0 = Utc::now();

        store.record_check(&raw(&target, true, t0), HealthStatus::Healthy);
        // A result carrying an older timestamp must not move the clock back.
        store.record_check(
            &raw(&target, true, t0 - Duration::seconds(30)),
            HealthStatus::Healthy,
        );

        assert_eq!(store.get(&target).last_checked_at, Some(t0));
    }

    #[test]
    fn test_apply_transition_updates_status_and_resets_agreement() {
        let store = HealthStore::new();
        let target = Target::new("aws", "compute");
        let t0 = Utc::now();

        store.record_check(&raw(&target, false, t0), HealthStatus::Degraded);
        store.apply_transition(&TransitionEvent {
            target: target.clone(),
            from: HealthStatus::Unknown,
            to: HealthStatus::Degraded,
            at: t0,
        });

        let record = store.get(&target);
        assert_eq!(record.status, HealthStatus::Degraded);
        assert_eq!(record.last_transition_at, Some(t0));
        assert_eq!(record.consecutive_same_raw, 0);
        // Check bookkeeping is untouched by the transition.
        assert_eq!(record.consecutive_failures, 1);
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let store = HealthStore::new();
        let target = Target::new("aws", "compute");
        let t0 = Utc::now();

        store.record_check(&raw(&target, true, t0), HealthStatus::Healthy);
        let snapshot = store.snapshot_all();

        store.record_check(
            &raw(&target, false, t0 + Duration::seconds(1)),
            HealthStatus::Degraded,
        );

        assert_eq!(snapshot[&target].consecutive_failures, 0);
        assert_eq!(store.get(&target).consecutive_failures, 1);
    }

    #[test]
    fn test_provider_summary_is_worst_of() {
        let store = HealthStore::new();
        let compute = Target::new("aws", "compute");
        let storage = Target::new("aws", "storage");
        let azure = Target::new("azure", "directory");
        let t0 = Utc::now();

        store.record_check(&raw(&compute, true, t0), HealthStatus::Healthy);
        store.apply_transition(&TransitionEvent {
            target: compute.clone(),
            from: HealthStatus::Unknown,
            to: HealthStatus::Healthy,
            at: t0,
        });
        store.record_check(&raw(&storage, false, t0), HealthStatus::Degraded);
        store.apply_transition(&TransitionEvent {
            target: storage.clone(),
            from: HealthStatus::Unknown,
            to: HealthStatus::Degraded,
            at: t0,
        });
        store.register_target(&azure);

        assert_eq!(store.provider_summary("aws"), HealthStatus::Degraded);
        assert_eq!(store.provider_summary("azure"), HealthStatus::Unknown);
        assert_eq!(store.provider_summary("microsoft365"), HealthStatus::Unknown);
    }
}
