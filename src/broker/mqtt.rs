//! # MQTT 5 transport.
//!
//! [`MqttBroker`] connects the registry to a real broker over MQTT 5, which is the
//! protocol version that carries the "no local" subscription option.
//!
//! ```text
//! connect() ──► AsyncClient + EventLoop ──poll until ConnAck──► spawn pump
//!                                                                  │
//!   Publish packets ──► BrokerMessage ──► mpsc (returned receiver) ◄┘
//!   pump ends on error or Disconnect ──► sender dropped ──► receiver closes
//! ```
//!
//! ## Rules
//! - Messages are exchanged with QoS 1.
//! - A new `connect()` closes the previous session first.
//! - Keep-alive is clamped to at least 5 seconds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::mqttbytes::v5::{Filter, Packet};
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Broker, BrokerMessage};
use crate::config::BrokerConfig;
use crate::error::BrokerError;

const SESSION_CAPACITY: usize = 256;
const REQUEST_CAPACITY: usize = 64;
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);
const DISCONNECT_WAIT: Duration = Duration::from_secs(1);

struct Session {
    client: AsyncClient,
    pump: JoinHandle<()>,
}

/// MQTT 5 client implementing [`Broker`].
pub struct MqttBroker {
    options: MqttOptions,
    connected: Arc<AtomicBool>,
    session: Mutex<Option<Session>>,
}

impl MqttBroker {
    /// Creates a client for `host`, identified as `client_id`. Nothing is sent
    /// until [`Broker::connect`].
    pub fn new(client_id: &str, host: &str, cfg: &BrokerConfig) -> Self {
        let mut options = MqttOptions::new(client_id, host, cfg.port);
        options.set_keep_alive(cfg.keep_alive.max(MIN_KEEP_ALIVE));
        Self {
            options,
            connected: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        }
    }

    /// Connection options used for every session.
    pub fn options(&self) -> &MqttOptions {
        &self.options
    }

    fn client(&self) -> Result<AsyncClient, BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        self.session
            .lock()
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(BrokerError::NotConnected)
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn connect(&self) -> Result<mpsc::Receiver<BrokerMessage>, BrokerError> {
        self.disconnect().await;

        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => {}
                Err(err) => {
                    return Err(BrokerError::Refused {
                        reason: err.to_string(),
                    });
                }
            }
        }

        let (tx, rx) = mpsc::channel(SESSION_CAPACITY);
        self.connected.store(true, Ordering::SeqCst);
        let pump = tokio::spawn(pump(
            eventloop,
            tx,
            Arc::clone(&self.connected),
            self.options.client_id(),
        ));
        *self.session.lock() = Some(Session { client, pump });
        Ok(rx)
    }

    async fn subscribe(&self, filter: &str, no_local: bool) -> Result<(), BrokerError> {
        let client = self.client()?;
        let mut sub = Filter::new(filter, QoS::AtLeastOnce);
        sub.nolocal = no_local;
        client
            .subscribe_many([sub])
            .await
            .map_err(|_| BrokerError::Closed)
    }

    async fn publish(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let client = self.client()?;
        client
            .publish(
                message.topic,
                QoS::AtLeastOnce,
                message.retain,
                message.payload.into_bytes(),
            )
            .await
            .map_err(|_| BrokerError::Closed)
    }

    async fn disconnect(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        self.connected.store(false, Ordering::SeqCst);

        let Session { client, mut pump } = session;
        if client.disconnect().await.is_ok()
            && tokio::time::timeout(DISCONNECT_WAIT, &mut pump).await.is_ok()
        {
            return;
        }
        pump.abort();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn pump(
    mut eventloop: EventLoop,
    tx: mpsc::Sender<BrokerMessage>,
    connected: Arc<AtomicBool>,
    client_id: String,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                let message = BrokerMessage {
                    topic: String::from_utf8_lossy(&p.topic).into_owned(),
                    payload: String::from_utf8_lossy(&p.payload).into_owned(),
                    retain: p.retain,
                };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect(_))) => {
                tracing::info!(client = %client_id, "mqtt broker closed the session");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(client = %client_id, error = %err, "mqtt session ended");
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}
