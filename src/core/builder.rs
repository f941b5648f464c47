use std::sync::Arc;

use crate::broker::BrokerRef;
use crate::config::StationConfig;
use crate::error::StoreError;
use crate::events::Bus;
use crate::registry::Registry;
use crate::store::{MemoryStore, StoreRef};
use crate::subscribers::{Subscribe, SubscriberSet};

use super::station::Station;

/// Builder for a [`Station`].
pub struct StationBuilder {
    cfg: StationConfig,
    store: Option<StoreRef>,
    broker: Option<BrokerRef>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl StationBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: StationConfig) -> Self {
        Self {
            cfg,
            store: None,
            broker: None,
            subscribers: Vec::new(),
        }
    }

    /// Uses `store` instead of the one described by `cfg.store`.
    pub fn with_store(mut self, store: StoreRef) -> Self {
        self.store = Some(store);
        self
    }

    /// Mirrors published entities to `broker` instead of the one described by
    /// `cfg.broker`. Without either, entities stay local.
    pub fn with_broker(mut self, broker: BrokerRef) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive runtime events (worker lifecycle, entity side effects,
    /// broker connection) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the station. Must be called inside a tokio runtime.
    ///
    /// Without an explicit store, `cfg.store.path` selects a SQLite file (feature
    /// `sqlite`); otherwise an in-memory store is used. Without an explicit broker,
    /// `cfg.broker.host` selects an MQTT broker (feature `mqtt`).
    pub fn build(self) -> Result<Arc<Station>, StoreError> {
        let store = match self.store {
            Some(store) => store,
            None => default_store(&self.cfg)?,
        };
        let broker = self.broker.or_else(|| default_broker(&self.cfg));
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let registry = Registry::new(self.cfg.registry.clone(), store, broker, bus.clone());
        Ok(Station::new_internal(self.cfg, bus, subs, registry))
    }
}

#[cfg(feature = "sqlite")]
fn default_store(cfg: &StationConfig) -> Result<StoreRef, StoreError> {
    match &cfg.store.path {
        Some(path) => {
            tracing::info!(path = %path.display(), "opening sqlite store");
            Ok(Arc::new(crate::store::SqliteStore::open(path)?))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(not(feature = "sqlite"))]
fn default_store(cfg: &StationConfig) -> Result<StoreRef, StoreError> {
    if let Some(path) = &cfg.store.path {
        tracing::warn!(path = %path.display(), "sqlite support disabled, using in-memory store");
    }
    Ok(Arc::new(MemoryStore::new()))
}

#[cfg(feature = "mqtt")]
fn default_broker(cfg: &StationConfig) -> Option<BrokerRef> {
    let host = cfg.broker.host.as_deref()?;
    tracing::info!(host, port = cfg.broker.port, client = %cfg.registry.client_id, "using mqtt broker");
    Some(Arc::new(crate::broker::MqttBroker::new(
        &cfg.registry.client_id,
        host,
        &cfg.broker,
    )))
}

#[cfg(not(feature = "mqtt"))]
fn default_broker(cfg: &StationConfig) -> Option<BrokerRef> {
    if let Some(host) = &cfg.broker.host {
        tracing::warn!(host = %host, "mqtt support disabled, entities stay local");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::registry::ConnectionState;

    #[test]
    fn broker_host_selects_a_broker() {
        let mut cfg = StationConfig::default();
        assert!(default_broker(&cfg).is_none());

        cfg.broker.host = Some("127.0.0.1".to_string());
        let broker = default_broker(&cfg);
        assert_eq!(broker.is_some(), cfg!(feature = "mqtt"));
        assert!(broker.is_none_or(|b| !b.is_connected()));
    }

    #[tokio::test]
    async fn explicit_broker_wins_over_config() {
        let mut cfg = StationConfig::default();
        cfg.broker.host = Some("127.0.0.1".to_string());
        let hub = MemoryBroker::new();

        let station = StationBuilder::new(cfg)
            .with_broker(Arc::new(hub.client("station")))
            .build()
            .unwrap();
        station.registry().start();
        station
            .registry()
            .watch_connection()
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();

        assert_eq!(hub.session_count(), 1);
        station.registry().shutdown().await;
    }
}
