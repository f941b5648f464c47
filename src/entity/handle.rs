//! Type-erased view over entities of any value type.
//!
//! The registry stores heterogeneous entities behind [`DynEntity`] and routes inbound
//! broker payloads through the string interface.

use std::sync::Arc;

use super::cell::Entity;
use super::value::{EntityFlags, EntityValue};

/// Value-type-independent operations on an entity.
pub trait EntityHandle: Send + Sync + 'static {
    /// Stable entity id.
    fn id(&self) -> &str;

    /// Flags fixed at construction.
    fn flags(&self) -> EntityFlags;

    /// JSON encoding of the current value.
    fn as_string(&self) -> String;

    /// JSON encoding of the pending value, if any.
    fn pending_string(&self) -> Option<String>;

    /// Parses and requests a change; see [`Entity::set_from_string`].
    fn set_from_string(&self, payload: &str) -> bool;

    /// Drops the pending value.
    fn clear_pending(&self);

    /// `true` when the value encodes as JSON `true`.
    fn is_true(&self) -> bool {
        self.as_string() == "true"
    }

    /// `true` when the value encodes as JSON `false`.
    fn is_false(&self) -> bool {
        self.as_string() == "false"
    }
}

/// Shared, type-erased entity handle.
pub type DynEntity = Arc<dyn EntityHandle>;

impl<T: EntityValue> EntityHandle for Entity<T> {
    fn id(&self) -> &str {
        Entity::id(self)
    }

    fn flags(&self) -> EntityFlags {
        Entity::flags(self)
    }

    fn as_string(&self) -> String {
        Entity::as_string(self)
    }

    fn pending_string(&self) -> Option<String> {
        Entity::pending_string(self)
    }

    fn set_from_string(&self, payload: &str) -> bool {
        Entity::set_from_string(self, payload)
    }

    fn clear_pending(&self) {
        Entity::clear_pending(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heterogeneous_entities_share_one_interface() {
        let handles: Vec<DynEntity> = vec![
            Entity::new("gpio/wifi", false).persist().into_ref() as DynEntity,
            Entity::new("mppt/power_on_voltage", 12_500).into_ref() as DynEntity,
            Entity::new("mcu/status", String::from("ok")).into_ref() as DynEntity,
        ];

        assert!(handles[0].is_false());
        assert!(handles[0].flags().persist);
        assert!(handles[1].set_from_string("12600"));
        assert_eq!(handles[1].as_string(), "12600");
        assert_eq!(handles[2].as_string(), "\"ok\"");
        assert_eq!(handles[2].id(), "mcu/status");
    }

    #[test]
    fn pending_is_visible_through_handle() {
        let e: DynEntity = Entity::new("gpio/npr", false).require_ack().into_ref();

        assert!(e.set_from_string("true"));
        assert_eq!(e.pending_string().as_deref(), Some("true"));
        assert!(e.is_false());

        e.clear_pending();
        assert_eq!(e.pending_string(), None);
    }
}
