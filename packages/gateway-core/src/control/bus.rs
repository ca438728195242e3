//! Durable pub/sub client to the MQTT broker, with topic routing.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::control::message::{DeviceMessage, FirehoseEnvelope};
use crate::state::MqttBrokerConfig;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const MIN_RECONNECT_BACKOFF_MS: u64 = 1_000;

/// A routed inbound control event, tagged with the device MAC (from the
/// topic) that produced it.
#[derive(Debug, Clone)]
pub struct RoutedMessage {
    pub mac: String,
    pub message: DeviceMessage,
}

/// Client to the external broker. Subscribes to `devices/+/hello`,
/// `devices/+/data`, and the internal firehose topic; publishes to devices
/// and companion apps.
pub struct ControlBus {
    client: AsyncClient,
}

impl ControlBus {
    /// Connects to the broker and starts the background poll loop. Returns
    /// the bus handle and a channel of routed inbound messages.
    pub async fn connect(config: &MqttBrokerConfig) -> (Self, mpsc::Receiver<RoutedMessage>) {
        let mut options = MqttOptions::new("gateway", config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keepalive as u64));
        options.set_clean_session(config.clean);
        options.set_connection_timeout(config.connect_timeout_ms / 1000);

        let (client, eventloop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);

        for topic in ["devices/+/hello", "devices/+/data", "internal/server-ingest"] {
            if let Err(e) = client.subscribe(topic, QoS::AtMostOnce).await {
                log::error!("[ControlBus] initial subscribe to {topic} failed: {e}");
            }
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(Self::run_poll_loop(eventloop, tx));

        (Self { client }, rx)
    }

    /// Publishes `payload` to a device on `devices/p2p/<fullClientId>`.
    pub async fn publish_to_device(&self, full_client_id: &str, payload: &Value) -> Result<(), rumqttc::ClientError> {
        let topic = format!("devices/p2p/{full_client_id}");
        self.publish(&topic, payload).await
    }

    /// Publishes `payload` to a companion app on `app/p2p/<mac>`.
    pub async fn publish_to_app(&self, mac: &str, payload: &Value) -> Result<(), rumqttc::ClientError> {
        let topic = format!("app/p2p/{mac}");
        self.publish(&topic, payload).await
    }

    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), rumqttc::ClientError> {
        let bytes = serde_json::to_vec(payload).expect("control payloads are always serializable");
        self.client.publish(topic, QoS::AtMostOnce, false, bytes).await
    }

    /// Polls the event loop forever, parsing publishes and routing them
    /// over `tx`. Reconnects automatically; a connection error is followed
    /// by a bounded backoff before the next poll to honor the ≥1s retry
    /// floor in the external-interface contract.
    async fn run_poll_loop(mut eventloop: rumqttc::EventLoop, tx: mpsc::Sender<RoutedMessage>) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Some(routed) = Self::route(&publish.topic, &publish.payload) {
                        if tx.send(routed).await.is_err() {
                            log::warn!("[ControlBus] receiver dropped, stopping poll loop");
                            return;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("[ControlBus] broker disconnected: {e}, retrying");
                    tokio::time::sleep(Duration::from_millis(MIN_RECONNECT_BACKOFF_MS)).await;
                }
            }
        }
    }

    fn route(topic: &str, payload: &[u8]) -> Option<RoutedMessage> {
        let Ok(value) = serde_json::from_slice::<Value>(payload) else {
            log::warn!("[ControlBus] dropping non-JSON payload on {topic}");
            return None;
        };

        if topic == "internal/server-ingest" {
            let envelope: FirehoseEnvelope = serde_json::from_value(value).ok()?;
            let mac = Self::mac_from_client_id(&envelope.sender_client_id)?;
            let message = DeviceMessage::parse(&envelope.orginal_payload)?;
            return Some(RoutedMessage { mac, message });
        }

        let mac = Self::mac_from_topic(topic)?;
        let message = DeviceMessage::parse(&value)?;
        Some(RoutedMessage { mac, message })
    }

    fn mac_from_topic(topic: &str) -> Option<String> {
        // devices/<mac>/hello or devices/<mac>/data
        let mut segments = topic.split('/');
        segments.next()?;
        segments.next().map(str::to_string)
    }

    fn mac_from_client_id(client_id: &str) -> Option<String> {
        client_id.split("@@@").nth(1).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn routes_hello_by_topic_mac() {
        let payload = json!({"type": "hello", "session_id": "s1", "version": 3}).to_string();
        let routed = ControlBus::route("devices/aa_bb_cc_dd_ee_ff/hello", payload.as_bytes()).unwrap();
        assert_eq!(routed.mac, "aa_bb_cc_dd_ee_ff");
        assert!(matches!(routed.message, DeviceMessage::Hello { .. }));
    }

    #[test]
    fn routes_firehose_by_embedded_client_id() {
        let envelope = json!({
            "sender_client_id": "group@@@aa_bb_cc_dd_ee_ff@@@uuid",
            "orginal_payload": {"type": "goodbye", "session_id": "s1"},
        })
        .to_string();
        let routed = ControlBus::route("internal/server-ingest", envelope.as_bytes()).unwrap();
        assert_eq!(routed.mac, "aa_bb_cc_dd_ee_ff");
        assert!(matches!(routed.message, DeviceMessage::Goodbye { .. }));
    }

    #[test]
    fn drops_non_json_payload() {
        assert!(ControlBus::route("devices/x/hello", b"not json").is_none());
    }
}
