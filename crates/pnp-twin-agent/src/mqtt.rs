//! MQTT transport for the property runtime.

use pnp_twin_proto::{Message, QoS, Transport};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, RecvTimeoutError};
use std::str::FromStr;
use std::time::{Duration, Instant};
use url::Url;

/// Blocking MQTT client implementing [`Transport`].
pub struct MqttTransport {
    client: Client,
    connection: Connection,
}

impl MqttTransport {
    /// Create a transport; the connection is established on the first receive.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid.
    pub fn connect(
        mqtt_broker: &str,
        client_id: &str,
        keep_alive: Duration,
    ) -> Result<Self, MqttError> {
        let broker: BrokerAddress = mqtt_broker.parse()?;

        let mut mqtt_options = MqttOptions::new(client_id, broker.host, broker.port);
        mqtt_options.set_keep_alive(keep_alive);

        let (client, connection) = Client::new(mqtt_options, 100);

        Ok(Self { client, connection })
    }
}

impl Transport for MqttTransport {
    type Error = MqttError;

    fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), MqttError> {
        tracing::info!(filter, "Subscribing to property topic");

        self.client
            .subscribe(filter, to_rumqttc(qos))
            .map_err(|e| MqttError::Subscribe(e.to_string()))
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), MqttError> {
        tracing::debug!(topic, payload_len = payload.len(), "Publishing");

        self.client
            .publish(topic, to_rumqttc(qos), false, payload.to_vec())
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Message>, MqttError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    return Ok(Some(Message::new(publish.topic, publish.payload.to_vec())));
                }
                Ok(Ok(event)) => tracing::trace!(?event, "MQTT event"),
                Ok(Err(e)) => return Err(MqttError::Connection(e.to_string())),
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(MqttError::Connection("event loop disconnected".to_string()))
                }
            }
        }
    }
}

fn to_rumqttc(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
    }
}

/// Default MQTT port for unencrypted connections.
const DEFAULT_PORT: u16 = 1883;

/// Broker host and port taken from `PNP_TWIN_MQTT_BROKER`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BrokerAddress {
    host: String,
    port: u16,
}

impl FromStr for BrokerAddress {
    type Err = MqttError;

    /// Accepts `tcp://host[:port]`, `mqtt://host[:port]` or a bare `host[:port]`.
    fn from_str(input: &str) -> Result<Self, MqttError> {
        let invalid = |reason: String| MqttError::InvalidBrokerUrl {
            url: input.to_string(),
            reason,
        };

        let normalized = if input.contains("://") {
            input.to_string()
        } else {
            format!("tcp://{input}")
        };
        let url = Url::parse(&normalized).map_err(|e| invalid(e.to_string()))?;

        if !matches!(url.scheme(), "tcp" | "mqtt") {
            return Err(invalid(format!("scheme `{}` is not supported", url.scheme())));
        }
        if !url.path().trim_start_matches('/').is_empty() {
            return Err(invalid(format!("unexpected path `{}`", url.path())));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("no host".to_string()))?;

        Ok(Self {
            host: host.to_string(),
            port: url.port().unwrap_or(DEFAULT_PORT),
        })
    }
}

/// Errors for MQTT transport operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MqttError {
    /// Broker address could not be parsed
    #[error("invalid MQTT broker URL `{url}`: {reason}")]
    InvalidBrokerUrl { url: String, reason: String },
    /// The client rejected a subscription request
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    /// The client rejected a publish request
    #[error("publish failed: {0}")]
    Publish(String),
    /// The event loop reported a connection failure
    #[error("connection lost: {0}")]
    Connection(String),
}
