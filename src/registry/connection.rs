//! Broker connection loop.
//!
//! ```text
//!  Disconnected ──► Connecting ──connect+subscribe ok──► Connected ──session closed──┐
//!       ▲               │                                                           │
//!       │               └──error──┐                                                 │
//!       └──── sleep(reconnect_backoff) ◄──────────────────────────────────────────┘
//! ```
//!
//! The subscription to `{base}/#` is made with `no_local`, so the registry never
//! receives its own publishes back.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::{ConnectionState, Registry};
use crate::broker::{BrokerMessage, BrokerRef, topic};
use crate::events::{Event, EventKind};

pub(super) async fn run(registry: Arc<Registry>, broker: BrokerRef) {
    let token = registry.token.clone();
    let backoff = registry.cfg.reconnect_backoff;
    let filter = topic::entity_filter(&registry.cfg.topic_base);

    loop {
        if token.is_cancelled() {
            break;
        }
        registry.set_state(ConnectionState::Connecting);

        let reason = match open_session(&broker, &filter).await {
            Ok(mut inbound) => {
                registry.set_state(ConnectionState::Connected);
                tracing::info!(filter = %filter, "broker connected");
                registry.bus.publish(Event::new(EventKind::BrokerConnected));

                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            broker.disconnect().await;
                            registry.set_state(ConnectionState::Disconnected);
                            return;
                        }
                        msg = inbound.recv() => match msg {
                            Some(msg) => registry.route(&msg).await,
                            None => break,
                        },
                    }
                }
                String::from("session closed")
            }
            Err(reason) => reason,
        };

        registry.set_state(ConnectionState::Disconnected);
        tracing::warn!(reason = %reason, backoff = ?backoff, "broker disconnected");
        registry.bus.publish(
            Event::new(EventKind::BrokerDisconnected)
                .with_reason(reason)
                .with_delay(backoff),
        );

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
    registry.set_state(ConnectionState::Disconnected);
}

async fn open_session(
    broker: &BrokerRef,
    filter: &str,
) -> Result<mpsc::Receiver<BrokerMessage>, String> {
    let inbound = broker.connect().await.map_err(|e| e.to_string())?;
    if let Err(err) = broker.subscribe(filter, true).await {
        broker.disconnect().await;
        return Err(err.to_string());
    }
    Ok(inbound)
}
