// src/events/bus.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{EventMessage, EventName};

/// Handle identifying one registered subscriber.
pub type SubscriberId = u64;

/// A registered subscriber and the receiving half of its channel.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<EventMessage>,
}

/// In-memory pub/sub keyed by run id.
///
/// Delivery never waits: each subscriber gets a `try_send`. A subscriber whose
/// channel is closed or full is dropped from the run's set and the remaining
/// subscribers still receive the message. Publishing holds the subscriber lock
/// for the whole fan-out, so messages for a run reach every subscriber in
/// publish order.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<(SubscriberId, mpsc::Sender<EventMessage>)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(
        &self,
    ) -> MutexGuard<'_, HashMap<String, Vec<(SubscriberId, mpsc::Sender<EventMessage>)>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `sender` for events of `run_id`.
    pub fn subscribe(&self, run_id: &str, sender: mpsc::Sender<EventMessage>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers()
            .entry(run_id.to_string())
            .or_default()
            .push((id, sender));
        debug!(run_id, subscriber = id, "subscriber registered");
        id
    }

    /// Create a bounded channel and register it.
    pub fn subscribe_channel(&self, run_id: &str, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.subscribe(run_id, tx);
        Subscription { id, receiver: rx }
    }

    /// Register a new channel whose first message is built by `snapshot`.
    ///
    /// `snapshot` runs under the subscriber lock, so no message published for
    /// `run_id` can slip between the snapshot and the registration.
    pub fn subscribe_with_snapshot<F>(
        &self,
        run_id: &str,
        capacity: usize,
        snapshot: F,
    ) -> Subscription
    where
        F: FnOnce() -> Value,
    {
        let (tx, rx) = mpsc::channel(capacity.max(2));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers();
        let message = EventMessage::new(EventName::Snapshot, snapshot());
        // Fresh channel with spare capacity: cannot fail.
        let _ = tx.try_send(message);
        subscribers
            .entry(run_id.to_string())
            .or_default()
            .push((id, tx));
        drop(subscribers);

        debug!(run_id, subscriber = id, "subscriber attached with snapshot");
        Subscription { id, receiver: rx }
    }

    pub fn unsubscribe(&self, run_id: &str, id: SubscriberId) {
        let mut subscribers = self.subscribers();
        if let Some(set) = subscribers.get_mut(run_id) {
            set.retain(|(sid, _)| *sid != id);
            if set.is_empty() {
                subscribers.remove(run_id);
            }
        }
    }

    pub fn subscriber_count(&self, run_id: &str) -> usize {
        self.subscribers().get(run_id).map_or(0, Vec::len)
    }

    /// Deliver `event` to every subscriber of `run_id`.
    pub fn publish(&self, run_id: &str, event: EventName, payload: Value) {
        let mut subscribers = self.subscribers();
        let Some(set) = subscribers.get_mut(run_id) else {
            return;
        };

        let message = EventMessage::new(event, payload);
        set.retain(|(id, tx)| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(err) => {
                warn!(run_id, subscriber = *id, %event, error = %err, "dropping subscriber after failed delivery");
                false
            }
        });

        if set.is_empty() {
            subscribers.remove(run_id);
        }
    }
}
