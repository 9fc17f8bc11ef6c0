use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::change_detector::ChangeDetector;
use crate::check_port::{HealthCheckPort, RawCheckOutcome};
use crate::error::SchedulerError;
use crate::health_store::{HealthStore, RawResult, Target};

struct Registration {
    epoch: u64,
    handle: JoinHandle<()>,
}

/// Drives periodic checks for every registered target.
///
/// Each target gets its own polling loop with at most one outstanding
/// check: the next tick cannot fire until the previous check has returned,
/// so slow endpoints never build a backlog. Registrations are tagged with
/// an epoch; a result whose epoch no longer matches the live registration
/// is discarded on arrival, which keeps `unregister` from racing an
/// in-flight check into the store.
#[derive(Clone)]
pub struct Scheduler {
    port: Arc<dyn HealthCheckPort>,
    detector: Arc<ChangeDetector>,
    store: Arc<HealthStore>,
    check_timeout: Duration,
    max_backoff_multiplier: u32,
    targets: Arc<Mutex<HashMap<Target, Registration>>>,
    next_epoch: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new(
        port: Arc<dyn HealthCheckPort>,
        detector: Arc<ChangeDetector>,
        store: Arc<HealthStore>,
        check_timeout: Duration,
        max_backoff_multiplier: u32,
    ) -> Self {
        Self {
            port,
            detector,
            store,
            check_timeout,
            max_backoff_multiplier,
            targets: Arc::new(Mutex::new(HashMap::new())),
            next_epoch: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Add a target to the rotation and start polling it.
    pub fn register(&self, target: Target, interval: Duration) -> Result<(), SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval(target));
        }

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let mut targets = self.targets.lock().unwrap();
        if targets.contains_key(&target) {
            return Err(SchedulerError::DuplicateTarget(target));
        }

        // Seed the unknown record so snapshots list the target before its
        // first check resolves.
        self.store.register_target(&target);

        let handle = tokio::spawn(self.clone().poll_loop(target.clone(), epoch, interval));
        targets.insert(target.clone(), Registration { epoch, handle });
        info!("Registered {} (interval {:?})", target, interval);
        Ok(())
    }

    /// Stop future checks for a target. An in-flight check may still
    /// complete, but its result is discarded by the epoch guard.
    pub fn unregister(&self, target: &Target) -> bool {
        let removed = self.targets.lock().unwrap().remove(target);
        match removed {
            Some(registration) => {
                registration.handle.abort();
                info!("Unregistered {}", target);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, target: &Target) -> bool {
        self.targets.lock().unwrap().contains_key(target)
    }

    pub fn registered(&self) -> Vec<Target> {
        self.targets.lock().unwrap().keys().cloned().collect()
    }

    /// Stop polling everything. Used at session teardown.
    pub fn shutdown(&self) {
        let mut targets = self.targets.lock().unwrap();
        for (target, registration) in targets.drain() {
            registration.handle.abort();
            debug!("Stopped polling {}", target);
        }
        info!("Scheduler shut down");
    }

    async fn poll_loop(self, target: Target, epoch: u64, base_interval: Duration) {
        let mut failures_in_a_row: u32 = 0;
        loop {
            if !self.is_current(&target, epoch) {
                return;
            }

            let outcome = match timeout(self.check_timeout, self.port.check(&target)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!("Health check for {} timed out", target);
                    RawCheckOutcome::failed("timeout")
                }
            };
            let raw = RawResult {
                target: target.clone(),
                ok: outcome.ok,
                observed_at: Utc::now(),
                error: outcome.error,
            };

            // Arrival-side epoch guard: a result for an unregistered target
            // must not touch the store or emit events.
            if !self.is_current(&target, epoch) {
                debug!("Discarding stale check result for {}", target);
                return;
            }
            self.detector.evaluate(&raw);

            failures_in_a_row = if raw.ok {
                0
            } else {
                failures_in_a_row.saturating_add(1)
            };
            tokio::time::sleep(self.effective_interval(base_interval, failures_in_a_row)).await;
        }
    }

    fn is_current(&self, target: &Target, epoch: u64) -> bool {
        self.targets
            .lock()
            .unwrap()
            .get(target)
            .is_some_and(|registration| registration.epoch == epoch)
    }

    /// Base interval stretched by a capped exponential factor while a
    /// target keeps failing; back to base after one success.
    fn effective_interval(&self, base: Duration, failures_in_a_row: u32) -> Duration {
        if failures_in_a_row == 0 {
            return base;
        }
        let factor = 2u32
            .saturating_pow(failures_in_a_row)
            .min(self.max_backoff_multiplier.max(1));
        base.saturating_mul(factor)
    }
}
