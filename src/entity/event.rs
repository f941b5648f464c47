//! Typed records carried by an entity's two streams.

use std::sync::Arc;

/// An authoritative value change (`previous` → `value`).
///
/// A forced write of an unchanged value also produces a record, with
/// `previous == value`; see [`StreamEvent::is_different`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChanged<T> {
    /// Entity id.
    pub id: Arc<str>,
    /// Value before the change.
    pub previous: T,
    /// Value after the change.
    pub value: T,
}

/// A change request waiting for confirmation (ack-required entities only).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRequested<T> {
    /// Entity id.
    pub id: Arc<str>,
    /// Authoritative value at the time of the request.
    pub value: T,
    /// Requested value, now held as pending.
    pub requested: T,
    /// Request generation; a newer request supersedes every lower one.
    pub seq: u64,
}

/// Common view over stream records used by [`EntityStream`](super::EntityStream) filtering.
pub trait StreamEvent: Clone + Send + 'static {
    /// Entity the record belongs to.
    fn entity_id(&self) -> &str;

    /// `true` when the record describes an actual difference.
    fn is_different(&self) -> bool;
}

impl<T: Clone + PartialEq + Send + 'static> StreamEvent for ValueChanged<T> {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn is_different(&self) -> bool {
        self.previous != self.value
    }
}

impl<T: Clone + PartialEq + Send + 'static> StreamEvent for ChangeRequested<T> {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn is_different(&self) -> bool {
        self.value != self.requested
    }
}
