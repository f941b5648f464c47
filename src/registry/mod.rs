//! # Entity registry: binds entities to the store and the broker.
//!
//! ```text
//!                 register(entity)
//!                        │
//!      ┌─────────────────┼───────────────────────────┐
//!      ▼                 ▼                           ▼
//!  ack watcher      store lookup                change link
//!  (ack_required)   row absent → insert         (persist | publish)
//!                   row present → restore       changes() ──► store upsert
//!                                                         └─► broker publish (retain = persist)
//!
//!  connection loop:  broker ──{base}/#──► route(topic) ──► entity.set_from_string(payload)
//! ```
//!
//! ## Rules
//! - Ids are unique; a second registration of the same id fails.
//! - The registry is the only writer to the store and the only publisher to the broker.
//! - Exactly one change link and one ack watcher per entity; side effects for one
//!   entity are applied in change order.
//! - Store and broker failures are logged and reported on the event bus; they never
//!   roll back an in-memory value.
//! - The ack watcher is subscribed before the stored value is restored, so a restored
//!   ack-required value that is never confirmed expires like any other request. The
//!   change link is subscribed after, so restoring does not write the value back.

mod ack;
mod connection;
mod link;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerMessage, BrokerRef, topic};
use crate::config::RegistryConfig;
use crate::entity::{DynEntity, EntityRef, EntityValue};
use crate::error::RegistryError;
use crate::events::{Bus, Event, EventKind};
use crate::store::StoreRef;

/// Broker connection state as seen by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; waiting for the next attempt (or no broker configured).
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Session open and subscribed.
    Connected,
}

/// Owner of every live entity and of the broker connection.
pub struct Registry {
    cfg: RegistryConfig,
    store: StoreRef,
    broker: Option<BrokerRef>,
    bus: Bus,
    entities: RwLock<IndexMap<String, DynEntity>>,
    state: watch::Sender<ConnectionState>,
    token: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
    started: AtomicBool,
}

impl Registry {
    /// Creates a registry. Without a broker, entities are only mirrored to the store.
    pub fn new(
        cfg: RegistryConfig,
        store: StoreRef,
        broker: Option<BrokerRef>,
        bus: Bus,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            cfg,
            store,
            broker,
            bus,
            entities: RwLock::new(IndexMap::new()),
            state,
            token: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Registry settings.
    pub fn config(&self) -> &RegistryConfig {
        &self.cfg
    }

    /// Binds `entity` to the store and the broker.
    ///
    /// For persisted entities the stored value wins over the code default; a missing
    /// row is created from the current value. Store failures are logged and do not
    /// fail the registration.
    pub async fn register<T: EntityValue>(&self, entity: &EntityRef<T>) -> Result<(), RegistryError> {
        let id = entity.id().to_string();
        {
            let mut entities = self.entities.write().await;
            if entities.contains_key(&id) {
                return Err(RegistryError::DuplicateEntity { id });
            }
            entities.insert(id.clone(), Arc::clone(entity) as DynEntity);
        }

        let flags = entity.flags();
        if flags.ack_required {
            let requests = entity.change_requests(false);
            self.spawn(ack::watch(
                Arc::clone(entity),
                requests,
                self.cfg.ack_timeout,
                self.bus.clone(),
                self.token.child_token(),
            ));
        }

        if flags.persist {
            self.restore(entity).await;
        }

        if flags.persist || flags.publish {
            let changes = entity.changes(false);
            let mirror = link::Mirror {
                store: Arc::clone(&self.store),
                broker: self.broker.clone(),
                bus: self.bus.clone(),
                topic_base: self.cfg.topic_base.clone(),
                connection: self.state.subscribe(),
            };
            self.spawn(link::run(
                mirror,
                Arc::clone(entity),
                changes,
                self.token.child_token(),
            ));
        }

        tracing::debug!(entity = %id, ?flags, "entity registered");
        self.bus
            .publish(Event::new(EventKind::EntityRegistered).with_entity(id));
        Ok(())
    }

    async fn restore<T: EntityValue>(&self, entity: &EntityRef<T>) {
        let id = entity.id();
        match self.store.get_by_name(id).await {
            Ok(Some(stored)) => {
                if entity.set_from_string(&stored) {
                    tracing::debug!(entity = %id, value = %stored, "restored stored value");
                }
            }
            Ok(None) => {
                if let Err(err) = self.store.insert(id, &entity.as_string()).await {
                    tracing::warn!(entity = %id, error = %err, "creating store row failed");
                }
            }
            Err(err) => {
                tracing::warn!(entity = %id, error = %err, "reading store row failed");
            }
        }
    }

    /// Starts the broker connection loop. No-op without a broker or when already started.
    pub fn start(self: &Arc<Self>) {
        let Some(broker) = self.broker.clone() else {
            return;
        };
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.spawn(connection::run(Arc::clone(self), broker));
    }

    /// Looks up an entity by id.
    pub async fn get(&self, id: &str) -> Option<DynEntity> {
        self.entities.read().await.get(id).cloned()
    }

    /// Registered ids, in registration order.
    pub async fn ids(&self) -> Vec<String> {
        self.entities.read().await.keys().cloned().collect()
    }

    /// Current string value of every entity, in registration order.
    pub async fn snapshot(&self) -> IndexMap<String, String> {
        self.entities
            .read()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), e.as_string()))
            .collect()
    }

    /// Current broker connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every connection state change.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Stops every registry task and closes the broker session.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while let Some(res) = tasks.join_next().await {
            if let Err(err) = res {
                if err.is_panic() {
                    tracing::error!(error = %err, "registry task panicked");
                }
            }
        }
        if let Some(broker) = &self.broker {
            broker.disconnect().await;
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn route(&self, msg: &BrokerMessage) {
        let Some(id) = topic::strip_base(&self.cfg.topic_base, &msg.topic) else {
            return;
        };
        let Some(entity) = self.get(id).await else {
            tracing::trace!(topic = %msg.topic, "no entity for topic");
            return;
        };
        if entity.set_from_string(&msg.payload) {
            tracing::debug!(entity = %id, payload = %msg.payload, "inbound change");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().spawn(fut);
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("topic_base", &self.cfg.topic_base)
            .field("connection", &self.connection_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::broker::{Broker, MemoryBroker};
    use crate::entity::Entity;
    use crate::store::{MemoryStore, Store};

    struct Harness {
        registry: Arc<Registry>,
        store: Arc<MemoryStore>,
        hub: MemoryBroker,
        bus: Bus,
    }

    fn harness_with(store: MemoryStore) -> Harness {
        let store = Arc::new(store);
        let hub = MemoryBroker::new();
        let bus = Bus::new(64);
        let registry = Registry::new(
            RegistryConfig::default(),
            store.clone(),
            Some(Arc::new(hub.client("station"))),
            bus.clone(),
        );
        Harness {
            registry,
            store,
            hub,
            bus,
        }
    }

    async fn connected(h: &Harness) {
        h.registry.start();
        h.registry
            .watch_connection()
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn register_creates_missing_row_from_current_value() {
        let h = harness_with(MemoryStore::new());
        let wifi = Entity::new("gpio/wifi", false).persist().into_ref();

        h.registry.register(&wifi).await.unwrap();

        assert_eq!(
            h.store.get_by_name("gpio/wifi").await.unwrap().as_deref(),
            Some("false")
        );
        assert_eq!(h.registry.ids().await, ["gpio/wifi"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stored_value_wins_over_code_default() {
        let h = harness_with(MemoryStore::with_rows([("mppt/power_on_voltage", "12800")]));
        let v = Entity::new("mppt/power_on_voltage", 12_500).persist().into_ref();

        h.registry.register(&v).await.unwrap();
        settle().await;

        assert_eq!(v.get(), 12_800);
        assert_eq!(
            h.store.get_by_name("mppt/power_on_voltage").await.unwrap().as_deref(),
            Some("12800")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_ids_are_rejected() {
        let h = harness_with(MemoryStore::new());
        h.registry
            .register(&Entity::new("gpio/wifi", false).into_ref())
            .await
            .unwrap();

        let err = h
            .registry
            .register(&Entity::new("gpio/wifi", true).into_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateEntity { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn changes_are_stored_and_published_retained() {
        let h = harness_with(MemoryStore::new());
        connected(&h).await;
        let wifi = Entity::new("gpio/wifi", false).persist().publish().into_ref();
        let cpu = Entity::new("system/cpu", 0).publish().into_ref();
        h.registry.register(&wifi).await.unwrap();
        h.registry.register(&cpu).await.unwrap();

        wifi.request_change(true);
        cpu.request_change(37);
        settle().await;

        assert_eq!(
            h.store.get_by_name("gpio/wifi").await.unwrap().as_deref(),
            Some("true")
        );
        assert!(h.store.get_by_name("system/cpu").await.unwrap().is_none());

        let wifi_msg = h.hub.retained("station/gpio/wifi").unwrap();
        assert_eq!(wifi_msg.payload, "true");
        assert!(h.hub.retained("station/system/cpu").is_none());
        assert!(
            h.hub
                .history()
                .iter()
                .any(|m| m.topic == "station/system/cpu" && m.payload == "37" && !m.retain)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn publish_is_skipped_while_disconnected() {
        let h = harness_with(MemoryStore::new());
        let wifi = Entity::new("gpio/wifi", false).persist().publish().into_ref();
        h.registry.register(&wifi).await.unwrap();

        wifi.request_change(true);
        settle().await;

        assert!(h.hub.history().is_empty());
        assert_eq!(
            h.store.get_by_name("gpio/wifi").await.unwrap().as_deref(),
            Some("true")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_request_expires_after_ack_timeout() {
        let h = harness_with(MemoryStore::new());
        let mut events = h.bus.subscribe();
        let npr = Entity::new("gpio/npr", false).require_ack().into_ref();
        h.registry.register(&npr).await.unwrap();

        npr.request_change(true);
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(npr.pending(), Some(true));

        npr.request_change(false);
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(npr.pending(), Some(false), "new request restarts the window");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(npr.pending(), None);
        assert!(!npr.get());

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert!(kinds.contains(&EventKind::AckExpired));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_request_does_not_expire_later_request() {
        let h = harness_with(MemoryStore::new());
        let npr = Entity::new("gpio/npr", false).require_ack().into_ref();
        h.registry.register(&npr).await.unwrap();

        npr.request_change(true);
        settle().await;
        npr.confirm_or_force(true);
        tokio::time::sleep(Duration::from_secs(3)).await;
        npr.request_change(false);
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(npr.pending(), Some(false));
        assert!(npr.get());
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_messages_are_routed_to_entities() {
        let h = harness_with(MemoryStore::new());
        connected(&h).await;
        let threshold = Entity::new("mppt/power_off_voltage", 11_500)
            .persist()
            .publish()
            .into_ref();
        h.registry.register(&threshold).await.unwrap();

        let ui = h.hub.client("ui");
        ui.connect().await.unwrap();
        ui.publish(BrokerMessage::new("station/mppt/power_off_voltage", "11800"))
            .await
            .unwrap();
        ui.publish(BrokerMessage::new("station/unknown/entity", "1"))
            .await
            .unwrap();
        ui.publish(BrokerMessage::new("station/mppt/power_off_voltage", "garbage"))
            .await
            .unwrap();
        settle().await;

        assert_eq!(threshold.get(), 11_800);
        assert_eq!(
            h.registry.snapshot().await.get("mppt/power_off_voltage").map(String::as_str),
            Some("11800")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_backoff() {
        let h = harness_with(MemoryStore::new());
        let mut events = h.bus.subscribe();
        connected(&h).await;

        h.hub.set_available(false);
        h.hub.drop_sessions();
        let mut state = h.registry.watch_connection();
        state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_ne!(h.registry.connection_state(), ConnectionState::Connected);

        h.hub.set_available(true);
        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::BrokerConnected).count(),
            2
        );
        assert!(kinds.contains(&EventKind::BrokerDisconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_disconnects() {
        let h = harness_with(MemoryStore::new());
        connected(&h).await;
        assert_eq!(h.hub.session_count(), 1);

        h.registry.shutdown().await;

        assert_eq!(h.hub.session_count(), 0);
        assert_eq!(h.registry.connection_state(), ConnectionState::Disconnected);
    }
}
