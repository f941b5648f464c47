//! # Runtime event subscribers.
//!
//! Implement [`Subscribe`] to receive station events, for example to forward worker
//! crashes to the watchdog.
//!
//! A subscriber runs on its own task behind a queue of
//! [`Subscribe::queue_capacity`] events owned by the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet). A slow subscriber only
//! delays itself; once its queue is full it loses events and a
//! `SubscriberOverflow` event is published.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use stationkit::{Event, EventKind, Subscribe};
//!
//! struct WatchdogFeed;
//!
//! #[async_trait]
//! impl Subscribe for WatchdogFeed {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerFailed {
//!             // notify the watchdog MCU...
//!         }
//!     }
//!     fn name(&self) -> &'static str { "watchdog-feed" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime (prefer async I/O and cooperative waits).
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
