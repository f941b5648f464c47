//! # Entity: an observable, optionally persisted, optionally mirrored value cell.
//!
//! ## Change protocol
//! ```text
//! request_change(v)
//!   ├─ ack required ──► pending = v ──► ChangeRequested{value, requested: v, seq}
//!   │                       │
//!   │                       ├─ confirm_or_force(v) ──► value = v ──► ValueChanged
//!   │                       └─ ack timeout (registry) ──► pending cleared, value kept
//!   │
//!   └─ no ack ──► v != value ? value = v ──► ValueChanged : no-op
//! ```
//!
//! ## Rules
//! - At most one pending value; a new request supersedes the previous one.
//! - Authoritative records fire only on an actual change (`PartialEq`), unless forced.
//! - Every mutation happens under the cell lock and its record is sent before the
//!   lock is released, so records are observed in mutation order.
//! - A value must read back equal from its JSON form; others (`NaN`, infinities)
//!   are logged and dropped before any state changes.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::event::{ChangeRequested, ValueChanged};
use super::stream::EntityStream;
use super::value::{EntityFlags, EntityValue};

/// Default capacity of each entity stream.
pub const DEFAULT_STREAM_CAPACITY: usize = 64;

/// Shared handle to an entity.
pub type EntityRef<T> = Arc<Entity<T>>;

struct CellState<T> {
    value: T,
    previous: T,
    pending: Option<T>,
    generation: u64,
}

/// A single addressable station value.
///
/// ## Example
/// ```rust
/// use stationkit::Entity;
///
/// let wifi = Entity::new("gpio/wifi", false).persist().publish().require_ack();
/// wifi.request_change(true);
/// assert_eq!(wifi.get(), false);
/// assert_eq!(wifi.pending(), Some(true));
///
/// wifi.confirm_or_force(true);
/// assert_eq!(wifi.get(), true);
/// assert_eq!(wifi.pending(), None);
/// ```
pub struct Entity<T: EntityValue> {
    id: Arc<str>,
    flags: EntityFlags,
    initial: T,
    state: Mutex<CellState<T>>,
    changed: broadcast::Sender<ValueChanged<T>>,
    requested: broadcast::Sender<ChangeRequested<T>>,
}

impl<T: EntityValue> Entity<T> {
    /// Creates an in-memory entity with no persistence, publishing or ack.
    pub fn new(id: impl Into<Arc<str>>, initial: T) -> Self {
        Self::with_capacity(id, initial, DEFAULT_STREAM_CAPACITY)
    }

    /// Same as [`Entity::new`] with an explicit stream capacity (min 1).
    pub fn with_capacity(id: impl Into<Arc<str>>, initial: T, capacity: usize) -> Self {
        let (changed, _) = broadcast::channel(capacity.max(1));
        let (requested, _) = broadcast::channel(capacity.max(1));
        Self {
            id: id.into(),
            flags: EntityFlags::default(),
            state: Mutex::new(CellState {
                value: initial.clone(),
                previous: initial.clone(),
                pending: None,
                generation: 0,
            }),
            initial,
            changed,
            requested,
        }
    }

    /// Mirrors the value to the persistent store.
    pub fn persist(mut self) -> Self {
        self.flags.persist = true;
        self
    }

    /// Mirrors the value to the broker.
    pub fn publish(mut self) -> Self {
        self.flags.publish = true;
        self
    }

    /// Makes changes two-phase: requested, then confirmed.
    pub fn require_ack(mut self) -> Self {
        self.flags.ack_required = true;
        self
    }

    /// Replaces all flags at once.
    pub fn with_flags(mut self, flags: EntityFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Wraps the entity into a shared [`EntityRef`].
    pub fn into_ref(self) -> EntityRef<T> {
        Arc::new(self)
    }

    /// Stable id, used as store key and topic suffix.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Flags fixed at construction.
    pub fn flags(&self) -> EntityFlags {
        self.flags
    }

    /// Current authoritative value.
    pub fn get(&self) -> T {
        self.state.lock().value.clone()
    }

    /// Value before the last authoritative change.
    pub fn previous(&self) -> T {
        self.state.lock().previous.clone()
    }

    /// Outstanding requested value, if any.
    pub fn pending(&self) -> Option<T> {
        self.state.lock().pending.clone()
    }

    /// Value captured at construction.
    pub fn initial(&self) -> &T {
        &self.initial
    }

    /// Requests a change; honors the ack protocol.
    ///
    /// Re-requesting the value that is already pending is a no-op. Values without a
    /// faithful string form (`NaN`, infinities) are logged and ignored.
    pub fn request_change(&self, value: T) {
        if !self.accepts(&value) {
            return;
        }
        let mut state = self.state.lock();
        self.apply_locked(&mut state, value, false);
    }

    /// Makes `value` authoritative immediately, bypassing the ack protocol.
    ///
    /// Used by the ingestion path when hardware reports its actual state. Clears any
    /// pending request and always emits a [`ValueChanged`] record, even when the
    /// value is unchanged.
    pub fn confirm_or_force(&self, value: T) {
        if !self.accepts(&value) {
            return;
        }
        let mut state = self.state.lock();
        self.apply_locked(&mut state, value, true);
    }

    /// Requests the construction-time value.
    pub fn reset(&self) {
        self.request_change(self.initial.clone());
    }

    /// Drops the pending value without touching the authoritative one.
    pub fn clear_pending(&self) {
        self.state.lock().pending = None;
    }

    /// Drops the pending value only if it still belongs to request `seq`.
    ///
    /// Returns `true` when a pending value was dropped.
    pub fn expire_request(&self, seq: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation == seq && state.pending.is_some() {
            state.pending = None;
            true
        } else {
            false
        }
    }

    /// JSON encoding of the current value.
    pub fn as_string(&self) -> String {
        encode(&self.id, &self.get())
    }

    /// JSON encoding of the pending value, if any.
    pub fn pending_string(&self) -> Option<String> {
        self.pending().map(|v| encode(&self.id, &v))
    }

    /// Parses `payload` as JSON and requests it when it differs from the current value.
    ///
    /// Returns `false` for empty or malformed payloads, for unchanged values and for a
    /// re-request of the pending value.
    pub fn set_from_string(&self, payload: &str) -> bool {
        let payload = payload.trim();
        if payload.is_empty() {
            return false;
        }
        let parsed: T = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(err) => {
                tracing::debug!(entity = %self.id, error = %err, "ignoring malformed payload");
                return false;
            }
        };

        if !self.accepts(&parsed) {
            return false;
        }

        let mut state = self.state.lock();
        if parsed == state.value {
            return false;
        }
        self.apply_locked(&mut state, parsed, false)
    }

    /// `true` when the value encodes as JSON `true`.
    pub fn is_true(&self) -> bool {
        self.as_string() == "true"
    }

    /// `true` when the value encodes as JSON `false`.
    pub fn is_false(&self) -> bool {
        self.as_string() == "false"
    }

    /// Subscribes to authoritative changes.
    pub fn changes(&self, only_if_different: bool) -> EntityStream<ValueChanged<T>> {
        EntityStream::new(self.changed.subscribe(), only_if_different)
    }

    /// Subscribes to change requests.
    pub fn change_requests(&self, only_if_different: bool) -> EntityStream<ChangeRequested<T>> {
        EntityStream::new(self.requested.subscribe(), only_if_different)
    }

    /// A value is accepted only if it survives its JSON string form unchanged.
    fn accepts(&self, value: &T) -> bool {
        let faithful = serde_json::to_string(value)
            .ok()
            .and_then(|raw| serde_json::from_str::<T>(&raw).ok())
            .is_some_and(|back| back == *value);
        if !faithful {
            tracing::warn!(entity = %self.id, ?value, "ignoring value without a faithful JSON form");
        }
        faithful
    }

    /// Returns `true` when a record was emitted.
    fn apply_locked(&self, state: &mut CellState<T>, value: T, force: bool) -> bool {
        if self.flags.ack_required && !force {
            if state.pending.as_ref() == Some(&value) {
                return false;
            }
            state.generation += 1;
            state.pending = Some(value.clone());
            let _ = self.requested.send(ChangeRequested {
                id: Arc::clone(&self.id),
                value: state.value.clone(),
                requested: value,
                seq: state.generation,
            });
            return true;
        }

        state.pending = None;
        if !force && state.value == value {
            return false;
        }
        let previous = std::mem::replace(&mut state.value, value.clone());
        state.previous = previous.clone();
        let _ = self.changed.send(ValueChanged {
            id: Arc::clone(&self.id),
            previous,
            value,
        });
        true
    }
}

fn encode<T: EntityValue>(id: &str, value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| {
        tracing::warn!(entity = %id, error = %err, "value is not JSON-encodable");
        String::from("null")
    })
}

impl<T: EntityValue> fmt::Display for Entity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pending_string() {
            Some(pending) => write!(f, "{} => ({}) => {}", self.id, pending, self.as_string()),
            None => write!(f, "{} => {}", self.id, self.as_string()),
        }
    }
}

impl<T: EntityValue> fmt::Debug for Entity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("value", &state.value)
            .field("pending", &state.pending)
            .finish()
    }
}
