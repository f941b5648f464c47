//! # Runtime events emitted by the registry, supervisors, gates and the station.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Worker events**: supervised worker lifecycle (starting, started, failed, stopped)
//! - **Entity events**: registry side effects (registered, ack expired, write/publish failures)
//! - **Broker events**: bus connection transitions
//! - **Shutdown events**: station teardown progress
//!
//! The [`Event`] struct carries the metadata: timestamp, worker or entity id,
//! reason and attempt number.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use stationkit::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::WorkerFailed)
//!     .with_worker("aprs_is")
//!     .with_reason("connection refused")
//!     .with_attempt(3);
//!
//! assert_eq!(ev.kind, EventKind::WorkerFailed);
//! assert_eq!(ev.worker.as_deref(), Some("aprs_is"));
//! assert_eq!(ev.reason.as_deref(), Some("connection refused"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `worker` (subscriber name) and `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `worker` (subscriber name) and `reason` (`full` / `closed`).
    SubscriberOverflow,

    // === Worker lifecycle ===
    /// A start attempt begins.
    ///
    /// Sets `worker` and `attempt` (1-based, monotonic per worker).
    WorkerStarting,

    /// A start attempt succeeded; the worker is running.
    ///
    /// Sets `worker` and `attempt`.
    WorkerStarted,

    /// A start attempt failed; the worker was stopped and will be retried.
    ///
    /// Sets `worker`, `attempt`, `reason` and `delay_ms` (time until the next tick).
    WorkerFailed,

    /// The worker was stopped (disabled, shutdown, or explicit stop).
    ///
    /// Sets `worker`.
    WorkerStopped,

    /// A stop call failed; resources may have been left behind.
    ///
    /// Sets `worker` and `reason`.
    StopFailed,

    // === Entity side effects ===
    /// An entity was bound to the store and the broker.
    ///
    /// Sets `entity`.
    EntityRegistered,

    /// A pending ack-required change expired without confirmation.
    ///
    /// Sets `entity`.
    AckExpired,

    /// Writing an entity value to the store failed.
    ///
    /// Sets `entity` and `reason`.
    StoreWriteFailed,

    /// Publishing an entity value to the broker failed.
    ///
    /// Sets `entity` and `reason`.
    PublishFailed,

    // === Broker connection ===
    /// The registry connected and subscribed to its topic tree.
    BrokerConnected,

    /// The broker session ended or could not be opened.
    ///
    /// Sets `reason` and `delay_ms` (backoff before the next attempt).
    BrokerDisconnected,

    // === Shutdown ===
    /// Shutdown requested (OS signal or explicit call).
    ShutdownRequested,

    /// Every worker stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some workers did not stop in time.
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Worker (or subscriber) name, if applicable.
    pub worker: Option<Arc<str>>,
    /// Entity id, if applicable.
    pub entity: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Start attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Delay before the next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            entity: None,
            reason: None,
            attempt: None,
            delay_ms: None,
        }
    }

    /// Attaches a worker name.
    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Attaches an entity id.
    #[inline]
    pub fn with_entity(mut self, entity: impl Into<Arc<str>>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_worker(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_worker(subscriber)
            .with_reason(info)
    }
}
