use serde::Serialize;
use serde::de::DeserializeOwned;

/// Bound satisfied by every type an [`Entity`](super::Entity) can hold.
///
/// Blanket-implemented; equality is structural (`PartialEq`), the string form is JSON.
pub trait EntityValue:
    Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> EntityValue for T where
    T: Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Side-effect flags fixed when an entity is built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityFlags {
    /// Write every authoritative change to the store; restore it on registration.
    pub persist: bool,
    /// Publish every authoritative change to the broker (retained when `persist`).
    pub publish: bool,
    /// Changes are two-phase: requested, then confirmed or expired.
    pub ack_required: bool,
}
