use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::error;

use crate::health_store::{HealthStore, Snapshot, TransitionEvent};

/// Callback invoked with the current snapshot and, after the initial
/// delivery, the transition that produced it.
pub type Listener = dyn Fn(&Snapshot, Option<&TransitionEvent>) + Send + Sync;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct ListenerEntry {
    id: u64,
    callback: Arc<Listener>,
}

/// Publish/subscribe layer over the health store.
///
/// UI consumers subscribe once and receive the full snapshot immediately,
/// then again for every accepted transition, without polling the store.
pub struct SubscriptionHub {
    store: Arc<HealthStore>,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_id: AtomicU64,
}

impl SubscriptionHub {
    pub fn new(store: Arc<HealthStore>) -> Self {
        Self {
            store,
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener. It is invoked with the current snapshot before
    /// this call returns, so new subscribers are never left without data.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Snapshot, Option<&TransitionEvent>) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Arc<Listener> = Arc::new(listener);
        self.listeners.lock().unwrap().push(ListenerEntry {
            id,
            callback: callback.clone(),
        });

        let snapshot = self.store.snapshot_all();
        Self::invoke(&callback, &snapshot, None);
        SubscriptionId(id)
    }

    /// Remove a listener. Takes effect for all subsequent events; a fan-out
    /// already in flight still delivers to listeners it captured.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id.0);
        listeners.len() != before
    }

    /// Same data as `HealthStore::snapshot_all`.
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot_all()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Fan an accepted transition out to all listeners in subscription
    /// order. The listener list is cloned out of the lock first, so
    /// listeners may subscribe/unsubscribe from within their callback.
    pub(crate) fn publish(&self, event: &TransitionEvent) {
        let callbacks: Vec<Arc<Listener>> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.callback.clone())
            .collect();

        let snapshot = self.store.snapshot_all();
        for callback in &callbacks {
            Self::invoke(callback, &snapshot, Some(event));
        }
    }

    fn invoke(callback: &Arc<Listener>, snapshot: &Snapshot, event: Option<&TransitionEvent>) {
        if catch_unwind(AssertUnwindSafe(|| callback(snapshot, event))).is_err() {
            error!("subscription listener panicked, continuing fan-out");
        }
    }
}
