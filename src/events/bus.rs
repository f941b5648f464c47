//! # Runtime event bus.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] carrying lifecycle
//! [`Event`]s from the registry, supervisors and gates to observers.
//!
//! ```text
//! Publishers (many):                  Consumer (one):
//!   Registry    ──┐
//!   Supervisor  ──┼──────► Bus ───────► Station listener ────► SubscriberSet
//!   EnableGate  ──┤  (broadcast chan)
//!   Station     ──┘
//! ```
//!
//! Not to be confused with the message broker the registry mirrors entities to
//! (see [`crate::broker`]); this bus never leaves the process.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: slow receivers get `RecvError::Lagged(n)` and skip `n` events.
//! - **No persistence**: events are dropped when nobody is subscribed.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}
