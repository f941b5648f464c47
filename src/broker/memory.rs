//! # In-process broker hub.
//!
//! [`MemoryBroker`] plays the role of the broker server; [`MemoryClient`] is one
//! connection to it and implements [`Broker`].
//!
//! ```text
//!   MemoryClient("station") ──┐                ┌──► session "station" (mpsc)
//!   MemoryClient("ui")      ──┼──► MemoryBroker ┼──► session "ui"      (mpsc)
//!                             │    retained map │
//!                             └─   history     ─┘
//! ```
//!
//! ## Rules
//! - One session per client id; reconnecting replaces (and closes) the previous one.
//! - Retained messages are replayed on subscribe, with `retain = true`; live
//!   deliveries carry `retain = false`.
//! - `no_local` suppresses the subscriber's own publishes, retained replay included.
//! - [`MemoryBroker::drop_sessions`] simulates a network loss; [`MemoryBroker::set_available`]
//!   makes further `connect` calls fail.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::topic;
use super::{Broker, BrokerMessage};
use crate::error::BrokerError;

const SESSION_CAPACITY: usize = 256;

struct Subscription {
    filter: String,
    no_local: bool,
}

struct Session {
    id: u64,
    tx: mpsc::Sender<BrokerMessage>,
    subscriptions: Vec<Subscription>,
}

impl Session {
    fn deliver(&self, client_id: &str, publisher: &str, message: &BrokerMessage) {
        let wanted = self.subscriptions.iter().any(|s| {
            topic::matches(&s.filter, &message.topic) && !(s.no_local && publisher == client_id)
        });
        if wanted && self.tx.try_send(message.clone()).is_err() {
            tracing::warn!(client = %client_id, topic = %message.topic, "memory broker dropped message");
        }
    }
}

struct Retained {
    message: BrokerMessage,
    publisher: String,
}

struct HubState {
    available: bool,
    next_session: u64,
    sessions: HashMap<String, Session>,
    retained: BTreeMap<String, Retained>,
    history: Vec<BrokerMessage>,
}

/// In-process broker server.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<HubState>>,
}

impl MemoryBroker {
    /// Creates an empty, available broker.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                available: true,
                next_session: 0,
                sessions: HashMap::new(),
                retained: BTreeMap::new(),
                history: Vec::new(),
            })),
        }
    }

    /// Returns a client that connects as `client_id`.
    pub fn client(&self, client_id: impl Into<String>) -> MemoryClient {
        MemoryClient {
            hub: self.clone(),
            client_id: client_id.into(),
            session: Mutex::new(None),
        }
    }

    /// Closes every open session.
    pub fn drop_sessions(&self) {
        self.state.lock().sessions.clear();
    }

    /// Accepts (`true`) or refuses (`false`) new connections.
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Retained message on `topic`, if any.
    pub fn retained(&self, topic: &str) -> Option<BrokerMessage> {
        self.state
            .lock()
            .retained
            .get(topic)
            .map(|r| r.message.clone())
    }

    /// Every message published so far, in order.
    pub fn history(&self) -> Vec<BrokerMessage> {
        self.state.lock().history.clone()
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryBroker")
            .field("available", &state.available)
            .field("sessions", &state.sessions.len())
            .field("retained", &state.retained.len())
            .finish()
    }
}

/// One client connection to a [`MemoryBroker`].
pub struct MemoryClient {
    hub: MemoryBroker,
    client_id: String,
    session: Mutex<Option<u64>>,
}

impl MemoryClient {
    /// Client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn with_session<R>(
        &self,
        f: impl FnOnce(&mut HubState) -> R,
    ) -> Result<R, BrokerError> {
        let id = (*self.session.lock()).ok_or(BrokerError::NotConnected)?;
        let mut state = self.hub.state.lock();
        match state.sessions.get(&self.client_id) {
            Some(s) if s.id == id => Ok(f(&mut state)),
            _ => Err(BrokerError::NotConnected),
        }
    }
}

#[async_trait]
impl Broker for MemoryClient {
    async fn connect(&self) -> Result<mpsc::Receiver<BrokerMessage>, BrokerError> {
        let mut state = self.hub.state.lock();
        if !state.available {
            return Err(BrokerError::Refused {
                reason: "broker unavailable".to_string(),
            });
        }
        let (tx, rx) = mpsc::channel(SESSION_CAPACITY);
        state.next_session += 1;
        let id = state.next_session;
        state.sessions.insert(
            self.client_id.clone(),
            Session {
                id,
                tx,
                subscriptions: Vec::new(),
            },
        );
        *self.session.lock() = Some(id);
        Ok(rx)
    }

    async fn subscribe(&self, filter: &str, no_local: bool) -> Result<(), BrokerError> {
        let client_id = self.client_id.as_str();
        self.with_session(|state| {
            let HubState {
                sessions, retained, ..
            } = state;
            let Some(session) = sessions.get_mut(client_id) else {
                return;
            };
            session.subscriptions.push(Subscription {
                filter: filter.to_string(),
                no_local,
            });
            for r in retained.values() {
                if !topic::matches(filter, &r.message.topic) || (no_local && r.publisher == client_id)
                {
                    continue;
                }
                if session.tx.try_send(r.message.clone()).is_err() {
                    tracing::warn!(client = %client_id, topic = %r.message.topic, "memory broker dropped retained message");
                }
            }
        })
    }

    async fn publish(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let client_id = self.client_id.as_str();
        self.with_session(|state| {
            state.history.push(message.clone());
            if message.retain {
                state.retained.insert(
                    message.topic.clone(),
                    Retained {
                        message: message.clone(),
                        publisher: client_id.to_string(),
                    },
                );
            }
            let live = message.clone().retained(false);
            for (subscriber, session) in &state.sessions {
                session.deliver(subscriber, client_id, &live);
            }
        })
    }

    async fn disconnect(&self) {
        let Some(id) = self.session.lock().take() else {
            return;
        };
        let mut state = self.hub.state.lock();
        if state.sessions.get(&self.client_id).is_some_and(|s| s.id == id) {
            state.sessions.remove(&self.client_id);
        }
    }

    fn is_connected(&self) -> bool {
        self.with_session(|_| ()).is_ok()
    }
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClient")
            .field("client_id", &self.client_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_requires_session() {
        let hub = MemoryBroker::new();
        let client = hub.client("station");
        let err = client
            .publish(BrokerMessage::new("station/gpio/wifi", "true"))
            .await
            .unwrap_err();
        assert_eq!(err, BrokerError::NotConnected);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn live_delivery_honors_filters_and_no_local() {
        let hub = MemoryBroker::new();
        let station = hub.client("station");
        let ui = hub.client("ui");
        let mut station_rx = station.connect().await.unwrap();
        let mut ui_rx = ui.connect().await.unwrap();
        station.subscribe("station/#", true).await.unwrap();
        ui.subscribe("station/gpio/+", false).await.unwrap();

        station
            .publish(BrokerMessage::new("station/gpio/wifi", "true").retained(true))
            .await
            .unwrap();
        ui.publish(BrokerMessage::new("station/gpio/npr", "false"))
            .await
            .unwrap();

        let got = ui_rx.try_recv().unwrap();
        assert_eq!(got.topic, "station/gpio/wifi");
        assert!(!got.retain);
        assert_eq!(ui_rx.try_recv().unwrap().topic, "station/gpio/npr");

        let got = station_rx.try_recv().unwrap();
        assert_eq!(got.topic, "station/gpio/npr");
        assert!(station_rx.try_recv().is_err(), "own publish is suppressed");

        assert_eq!(hub.history().len(), 2);
        assert!(hub.retained("station/gpio/wifi").unwrap().retain);
    }

    #[tokio::test]
    async fn retained_replay_skips_own_messages_with_no_local() {
        let hub = MemoryBroker::new();
        let station = hub.client("station");
        let ui = hub.client("ui");
        station.connect().await.unwrap();
        ui.connect().await.unwrap();
        station
            .publish(BrokerMessage::new("station/gpio/wifi", "true").retained(true))
            .await
            .unwrap();
        ui.publish(BrokerMessage::new("station/gpio/npr", "true").retained(true))
            .await
            .unwrap();

        let mut rx = station.connect().await.unwrap();
        station.subscribe("station/#", true).await.unwrap();

        let got = rx.try_recv().unwrap();
        assert_eq!(got.topic, "station/gpio/npr");
        assert!(got.retain);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_sessions_closes_receivers() {
        let hub = MemoryBroker::new();
        let client = hub.client("station");
        let mut rx = client.connect().await.unwrap();
        assert!(client.is_connected());

        hub.drop_sessions();

        assert!(rx.recv().await.is_none());
        assert!(!client.is_connected());
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn unavailable_broker_refuses_connections() {
        let hub = MemoryBroker::new();
        hub.set_available(false);
        let err = hub.client("station").connect().await.unwrap_err();
        assert_eq!(err.as_label(), "broker_refused");

        hub.set_available(true);
        assert!(hub.client("station").connect().await.is_ok());
    }

    #[tokio::test]
    async fn reconnect_replaces_previous_session() {
        let hub = MemoryBroker::new();
        let client = hub.client("station");
        let mut first = client.connect().await.unwrap();
        let _second = client.connect().await.unwrap();

        assert!(first.recv().await.is_none());
        assert_eq!(hub.session_count(), 1);

        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(hub.session_count(), 0);
    }
}
