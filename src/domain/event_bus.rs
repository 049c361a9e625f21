//! Broadcast channel for engine events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Settlement,
//! escrow and reconciliation publish an [`EngineEvent`] after every
//! ledger-affecting operation, and every WebSocket connection subscribes.

use tokio::sync::broadcast;

use super::EngineEvent;

/// Broadcast bus for [`EngineEvent`]s.
///
/// When the ring buffer is full, the oldest events are dropped for
/// lagging receivers. Publishing never blocks an engine operation.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event; with no
    /// active receivers the event is dropped.
    pub fn publish(&self, event: EngineEvent) -> usize {
        tracing::debug!(event_type = event.event_type_str(), topic = ?event.topic(), network = %event.network(), "engine event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver for all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
