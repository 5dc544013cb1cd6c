//! rumqttc-backed telemetry sink.
//!
//! The event loop runs in a spawned task for the lifetime of the broker
//! session; `connect` resolves only once the broker has acknowledged us, so
//! the orchestrator's bounded retry sees real connect failures instead of
//! silently queueing into a dead client.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ports::TelemetrySink;

const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);
const KEEP_ALIVE: Duration = Duration::from_secs(30);

pub struct MqttSink {
    options: MqttOptions,
    session: Option<Session>,
}

struct Session {
    client: AsyncClient,
    event_task: JoinHandle<()>,
}

impl MqttSink {
    pub fn new(
        client_id: &str,
        host: &str,
        port: u16,
        credentials: Option<(&str, &str)>,
    ) -> Self {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some((user, pass)) = credentials {
            options.set_credentials(user, pass);
        }
        Self {
            options,
            session: None,
        }
    }
}

impl TelemetrySink for MqttSink {
    async fn connect(&mut self) -> Result<()> {
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), 10);

        let (connack_tx, connack_rx) = oneshot::channel::<()>();
        let event_task = tokio::spawn(async move {
            let mut connack_tx = Some(connack_tx);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("broker acknowledged connection");
                        if let Some(tx) = connack_tx.take() {
                            let _ = tx.send(());
                        }
                    }
                    Ok(event) => debug!(?event, "mqtt event"),
                    Err(e) => {
                        // Normal after disconnect; a failure while the cycle
                        // is still publishing surfaces at the next publish.
                        debug!("mqtt event loop ended: {e}");
                        break;
                    }
                }
            }
        });

        match tokio::time::timeout(CONNACK_TIMEOUT, connack_rx).await {
            Ok(Ok(())) => {
                self.session = Some(Session { client, event_task });
                Ok(())
            }
            Ok(Err(_)) => {
                event_task.abort();
                Err(anyhow!("broker connection failed before acknowledgement"))
            }
            Err(_) => {
                event_task.abort();
                Err(anyhow!(
                    "broker did not acknowledge within {}s",
                    CONNACK_TIMEOUT.as_secs()
                ))
            }
        }
    }

    async fn publish(&mut self, topic: &str, payload: String) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| anyhow!("publish on a disconnected broker session"))?;
        session
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .with_context(|| format!("publish to '{topic}' failed"))
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.client.disconnect().await {
                warn!("broker disconnect failed: {e}");
            }
            session.event_task.abort();
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_before_connect_fails() {
        let mut sink = MqttSink::new("plantsystem-test", "127.0.0.1", 1883, None);
        let err = sink
            .publish("ps/deviceData/connection", "true".to_string())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disconnected"));
    }

    #[tokio::test]
    async fn disconnect_without_session_is_a_no_op() {
        let mut sink = MqttSink::new("plantsystem-test", "127.0.0.1", 1883, None);
        sink.disconnect().await; // must not panic
    }

    #[test]
    fn options_carry_client_id() {
        let sink = MqttSink::new("plantsystem-1", "broker.local", 1883, Some(("u", "p")));
        assert_eq!(sink.options.client_id(), "plantsystem-1");
    }
}
