// ── Downstream relay hub ──
//
// Owns the live subscriber set. Attachment and broadcast-time pruning run
// from different tasks, so the set is a `DashMap` and broadcast never holds
// a map guard while calling into a subscriber: targets are collected
// first, failures removed afterwards.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::envelope::OutboundEnvelope;

// ── Subscriber ───────────────────────────────────────────────────────

/// Identity of an attached subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    /// The subscriber cannot take more right now; this message is lost.
    #[error("subscriber queue is full")]
    Full,
    #[error("subscriber is closed")]
    Closed,
    #[error("send failed: {0}")]
    Transport(String),
}

/// Anything that can take text frames. `send` must not block.
pub trait Subscriber: Send + Sync {
    fn send(&self, text: Arc<str>) -> Result<(), SendError>;

    /// Tear down the underlying transport. Called once, on removal.
    fn close(&self) {}
}

/// Subscriber backed by a bounded channel; a writer task drains the
/// receiver into the real transport.
pub struct ChannelSubscriber {
    tx: ArcSwapOption<mpsc::Sender<Arc<str>>>,
}

impl ChannelSubscriber {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx: ArcSwapOption::from_pointee(tx),
            },
            rx,
        )
    }
}

impl Subscriber for ChannelSubscriber {
    fn send(&self, text: Arc<str>) -> Result<(), SendError> {
        let guard = self.tx.load();
        let Some(tx) = guard.as_ref() else {
            return Err(SendError::Closed);
        };
        tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Dropping the sender ends the writer's receive loop.
    fn close(&self) {
        self.tx.store(None);
    }
}

// ── RelayHub ─────────────────────────────────────────────────────────

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub attempted: usize,
    pub delivered: usize,
    /// Full queues; the subscriber stays attached.
    pub dropped: usize,
    pub pruned: usize,
}

#[derive(Default)]
pub struct RelayHub {
    subscribers: DashMap<SubscriberId, Arc<dyn Subscriber>>,
    /// Held across attach, status publication and close, so a late joiner
    /// never receives an older status last and never slips in after
    /// `close_all`.
    gate: Mutex<Gate>,
}

#[derive(Default)]
struct Gate {
    /// Latest `connection_status` frame.
    status_frame: Option<Arc<str>>,
    closed: bool,
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber and send it the current connection status.
    ///
    /// Attaching a subscriber that is already in the set returns its
    /// existing id and sends nothing. After [`close_all`](Self::close_all)
    /// the subscriber is closed at once and never enters the set.
    pub fn attach(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(id) = self.find(&subscriber) {
            debug!(subscriber = %id, "subscriber already attached");
            return id;
        }

        let id = SubscriberId::new();
        if gate.closed {
            debug!(subscriber = %id, "hub is closed, rejecting subscriber");
            subscriber.close();
            return id;
        }

        if let Some(frame) = gate.status_frame.as_ref() {
            if let Err(e) = subscriber.send(Arc::clone(frame)) {
                warn!(subscriber = %id, error = %e, "subscriber failed on attach");
                subscriber.close();
                return id;
            }
        }
        self.subscribers.insert(id, subscriber);
        info!(subscriber = %id, subscribers = self.subscribers.len(), "subscriber attached");
        id
    }

    /// Subscriber's transport closed. Idempotent.
    pub fn on_close(&self, id: SubscriberId) -> bool {
        let removed = self.remove(id);
        if removed {
            info!(subscriber = %id, subscribers = self.subscribers.len(), "subscriber detached");
        }
        removed
    }

    /// Subscriber's transport failed. Logged here, never propagated.
    pub fn on_error(&self, id: SubscriberId, error: &dyn fmt::Display) -> bool {
        warn!(subscriber = %id, error = %error, "subscriber error");
        self.remove(id)
    }

    /// Serialize once and deliver to every subscriber.
    pub fn broadcast(&self, envelope: &OutboundEnvelope) -> Delivery {
        match envelope.to_text() {
            Ok(text) => {
                let kind: &'static str = envelope.kind.into();
                let delivery = self.broadcast_text(&text);
                debug!(
                    kind,
                    delivered = delivery.delivered,
                    dropped = delivery.dropped,
                    pruned = delivery.pruned,
                    "broadcast"
                );
                delivery
            }
            Err(e) => {
                warn!(error = %e, "could not serialize envelope");
                Delivery::default()
            }
        }
    }

    /// Remember and broadcast a `connection_status` envelope.
    pub fn publish_status(&self, envelope: &OutboundEnvelope) -> Delivery {
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "could not serialize connection status");
                return Delivery::default();
            }
        };
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        gate.status_frame = Some(Arc::clone(&text));
        self.broadcast_text(&text)
    }

    /// Close and forget every subscriber. Later attaches are rejected
    /// until [`reopen`](Self::reopen).
    pub fn close_all(&self) {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        gate.closed = true;
        let ids: Vec<SubscriberId> = self.subscribers.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.remove(id);
        }
        info!("all subscribers closed");
    }

    /// Accept subscribers again after [`close_all`](Self::close_all).
    pub fn reopen(&self) {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner).closed = false;
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Identity is the allocation, not the vtable.
    fn find(&self, subscriber: &Arc<dyn Subscriber>) -> Option<SubscriberId> {
        let target = Arc::as_ptr(subscriber).cast::<()>();
        self.subscribers
            .iter()
            .find(|entry| Arc::as_ptr(entry.value()).cast::<()>() == target)
            .map(|entry| *entry.key())
    }

    fn broadcast_text(&self, text: &Arc<str>) -> Delivery {
        let targets: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut delivery = Delivery {
            attempted: targets.len(),
            ..Delivery::default()
        };
        let mut failed = Vec::new();

        for (id, subscriber) in targets {
            match subscriber.send(Arc::clone(text)) {
                Ok(()) => delivery.delivered += 1,
                Err(SendError::Full) => {
                    delivery.dropped += 1;
                    debug!(subscriber = %id, "subscriber queue full, message dropped");
                }
                Err(e) => {
                    warn!(subscriber = %id, error = %e, "pruning subscriber after failed send");
                    failed.push(id);
                }
            }
        }

        for id in failed {
            if self.remove(id) {
                delivery.pruned += 1;
            }
        }
        delivery
    }

    fn remove(&self, id: SubscriberId) -> bool {
        match self.subscribers.remove(&id) {
            Some((_, subscriber)) => {
                subscriber.close();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::envelope::EnvelopeType;

    /// Records every send; optionally fails them.
    #[derive(Default)]
    struct Recorder {
        sends: AtomicUsize,
        closes: AtomicUsize,
        fail: bool,
    }

    impl Subscriber for Recorder {
        fn send(&self, _text: Arc<str>) -> Result<(), SendError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SendError::Transport("socket reset".into()))
            } else {
                Ok(())
            }
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn envelope() -> OutboundEnvelope {
        OutboundEnvelope::new(EnvelopeType::MonitorDeleted, json!({ "monitorId": 1 }))
    }

    #[test]
    fn broadcast_attempts_every_subscriber_once() {
        let hub = RelayHub::new();
        let recorders: Vec<Arc<Recorder>> =
            (0..5).map(|_| Arc::new(Recorder::default())).collect();
        for recorder in &recorders {
            hub.attach(recorder.clone());
        }

        let delivery = hub.broadcast(&envelope());
        assert_eq!(
            delivery,
            Delivery {
                attempted: 5,
                delivered: 5,
                dropped: 0,
                pruned: 0
            }
        );
        assert!(recorders.iter().all(|p| p.sends.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn failing_subscriber_is_pruned() {
        let hub = RelayHub::new();
        let good = Arc::new(Recorder::default());
        let bad = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let good_id = hub.attach(good.clone());
        let bad_id = hub.attach(bad.clone());

        let delivery = hub.broadcast(&envelope());
        assert_eq!(delivery.attempted, 2);
        assert_eq!(delivery.pruned, 1);
        assert!(hub.contains(good_id));
        assert!(!hub.contains(bad_id));
        assert_eq!(bad.closes.load(Ordering::SeqCst), 1);

        hub.broadcast(&envelope());
        assert_eq!(bad.sends.load(Ordering::SeqCst), 1, "never retried");
        assert_eq!(good.sends.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn attach_sends_current_status_first() {
        let hub = RelayHub::new();
        hub.publish_status(&OutboundEnvelope::connection_status(true, true));

        let (subscriber, mut rx) = ChannelSubscriber::new(4);
        hub.attach(Arc::new(subscriber));

        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "connection_status");
        assert_eq!(first["data"], json!({ "connected": true, "upstreamConnected": true }));
    }

    #[test]
    fn full_queue_drops_without_pruning() {
        let hub = RelayHub::new();
        let (subscriber, mut rx) = ChannelSubscriber::new(1);
        let id = hub.attach(Arc::new(subscriber));

        assert_eq!(hub.broadcast(&envelope()).delivered, 1);
        let delivery = hub.broadcast(&envelope());
        assert_eq!(delivery.dropped, 1);
        assert!(hub.contains(id));

        rx.try_recv().unwrap();
        assert_eq!(hub.broadcast(&envelope()).delivered, 1);
    }

    #[test]
    fn closed_channel_is_pruned() {
        let hub = RelayHub::new();
        let (subscriber, rx) = ChannelSubscriber::new(4);
        let id = hub.attach(Arc::new(subscriber));
        drop(rx);

        assert_eq!(hub.broadcast(&envelope()).pruned, 1);
        assert!(!hub.contains(id));
    }

    #[test]
    fn close_and_error_are_idempotent() {
        let hub = RelayHub::new();
        let recorder = Arc::new(Recorder::default());
        let id = hub.attach(recorder.clone());

        assert!(hub.on_error(id, &"boom"));
        assert!(!hub.on_close(id));
        assert!(hub.is_empty());
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn attaching_twice_keeps_one_entry() {
        let hub = RelayHub::new();
        hub.publish_status(&OutboundEnvelope::connection_status(false, false));
        let recorder = Arc::new(Recorder::default());

        let first = hub.attach(recorder.clone());
        let second = hub.attach(recorder.clone());

        assert_eq!(first, second);
        assert_eq!(hub.len(), 1);
        assert_eq!(recorder.sends.load(Ordering::SeqCst), 1, "one status snapshot");

        assert_eq!(hub.broadcast(&envelope()).attempted, 1);
        assert_eq!(recorder.sends.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reattach_after_detach_gets_a_new_id() {
        let hub = RelayHub::new();
        let recorder = Arc::new(Recorder::default());

        let first = hub.attach(recorder.clone());
        hub.on_close(first);
        let second = hub.attach(recorder.clone());

        assert_ne!(first, second);
        assert!(hub.contains(second));
    }

    #[test]
    fn attach_after_close_all_is_rejected() {
        let hub = RelayHub::new();
        hub.close_all();

        let recorder = Arc::new(Recorder::default());
        let id = hub.attach(recorder.clone());
        assert!(!hub.contains(id));
        assert!(hub.is_empty());
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);

        hub.reopen();
        let id = hub.attach(recorder.clone());
        assert!(hub.contains(id));
    }

    #[tokio::test]
    async fn close_all_ends_channel_writers() {
        let hub = RelayHub::new();
        let (subscriber, mut rx) = ChannelSubscriber::new(4);
        hub.attach(Arc::new(subscriber));

        hub.close_all();
        assert!(hub.is_empty());
        assert!(rx.recv().await.is_none());
    }
}
