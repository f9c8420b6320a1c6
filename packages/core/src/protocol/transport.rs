// Realtime delivery
//
// The core never waits on delivery. Events go into a bounded queue; a worker
// drains it and calls the notifier under a timeout. A full queue drops the
// event with a warning.

use crate::protocol::messages::DeliveryEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Pushes an event to a user's live connection, if there is one.
///
/// A user without a connection is not an error.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &str, event: DeliveryEvent);
}

/// One queued event and its addressee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub user_id: String,
    pub event: DeliveryEvent,
}

/// Cloneable, non-blocking handle to the delivery queue.
#[derive(Debug, Clone)]
pub struct DeliveryDispatcher {
    tx: Option<mpsc::Sender<Envelope>>,
}

impl DeliveryDispatcher {
    /// Handle plus the receiving end, for callers that drain the queue themselves.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Starts a worker on the current tokio runtime that feeds `notifier`.
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize, timeout: Duration) -> (Self, JoinHandle<()>) {
        let (dispatcher, rx) = Self::channel(capacity);
        let handle = tokio::spawn(run_delivery(rx, notifier, timeout));
        (dispatcher, handle)
    }

    /// Dispatcher that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queues `event` for `user_id`. Never blocks.
    pub fn dispatch(&self, user_id: &str, event: DeliveryEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        let kind = event.kind();
        match tx.try_send(Envelope {
            user_id: user_id.to_string(),
            event,
        }) {
            Ok(()) => debug!(target: "delivery", user_id, kind, "event queued"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(target: "delivery", user_id, kind, "delivery queue full, event dropped")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(target: "delivery", user_id, kind, "delivery worker stopped, event dropped")
            }
        }
    }
}

/// Drains `rx` until every sender is gone, one bounded notifier call per event.
pub async fn run_delivery(mut rx: mpsc::Receiver<Envelope>, notifier: Arc<dyn Notifier>, timeout: Duration) {
    while let Some(envelope) = rx.recv().await {
        let kind = envelope.event.kind();
        let call = notifier.notify(&envelope.user_id, envelope.event);
        if tokio::time::timeout(timeout, call).await.is_err() {
            warn!(
                target: "delivery",
                user_id = %envelope.user_id,
                kind,
                timeout_ms = timeout.as_millis() as u64,
                "notifier timed out, event dropped"
            );
        }
    }
    debug!(target: "delivery", "delivery worker finished");
}

/// In-process connection registry: one unbounded channel per connected user.
#[derive(Debug, Default)]
pub struct LocalConnections {
    connections: DashMap<String, mpsc::UnboundedSender<DeliveryEvent>>,
}

impl LocalConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection, replacing any previous one for the same user.
    pub fn connect(&self, user_id: &str) -> mpsc::UnboundedReceiver<DeliveryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(user_id.to_string(), tx);
        rx
    }

    pub fn disconnect(&self, user_id: &str) {
        self.connections.remove(user_id);
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }
}

#[async_trait]
impl Notifier for LocalConnections {
    async fn notify(&self, user_id: &str, event: DeliveryEvent) {
        let tx = match self.connections.get(user_id) {
            Some(tx) => tx.clone(),
            None => {
                debug!(target: "delivery", user_id, "no live connection, event skipped");
                return;
            }
        };

        if tx.send(event).is_err() {
            // Receiver dropped without a disconnect
            self.connections.remove(user_id);
        }
    }
}
