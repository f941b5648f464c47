//! # Message broker transport.
//!
//! The publish/subscribe transport the registry mirrors entities to. Topic addressed
//! (`{base}/{entity id}`), with retained messages and per-subscription suppression of
//! the client's own publishes ("no local").
//!
//! - [`Broker`] async trait implemented by transports
//! - [`BrokerMessage`] topic + payload + retain flag
//! - [`MemoryBroker`] / [`MemoryClient`] in-process broker hub
//! - `MqttBroker` MQTT 5 client (feature `mqtt`)
//! - [`topic`] topic filter matching and entity topic helpers

mod memory;
#[cfg(feature = "mqtt")]
mod mqtt;
pub mod topic;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BrokerError;

pub use memory::{MemoryBroker, MemoryClient};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttBroker;

/// Shared handle to a broker transport.
pub type BrokerRef = Arc<dyn Broker>;

/// A single message on the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Full topic, e.g. `station/gpio/wifi`.
    pub topic: String,
    /// UTF-8 payload; entity values are JSON.
    pub payload: String,
    /// Keep as the last known value for late subscribers.
    pub retain: bool,
}

impl BrokerMessage {
    /// Creates a non-retained message.
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    /// Sets the retain flag.
    pub fn retained(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// Client side of a broker session.
///
/// ## Rules
/// - `connect()` opens a session and returns the inbound receiver; the receiver
///   closes when the session ends, which is how callers observe a disconnect.
/// - `subscribe` and `publish` fail with [`BrokerError::NotConnected`] outside a session.
/// - `disconnect()` is idempotent.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Opens a session.
    async fn connect(&self) -> Result<mpsc::Receiver<BrokerMessage>, BrokerError>;

    /// Subscribes the current session to `filter`; with `no_local`, messages this
    /// client published are never delivered back to it.
    async fn subscribe(&self, filter: &str, no_local: bool) -> Result<(), BrokerError>;

    /// Publishes a message.
    async fn publish(&self, message: BrokerMessage) -> Result<(), BrokerError>;

    /// Closes the current session, if any.
    async fn disconnect(&self);

    /// `true` while a session is open.
    fn is_connected(&self) -> bool;
}
