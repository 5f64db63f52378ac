//! Agent configuration.

use anyhow::{Context, Result};
use pnp_twin_core::ComponentRegistry;
use pnp_twin_proto::topics::DEFAULT_PREFIX;
use std::time::Duration;
use uuid::Uuid;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Device identifier, also used as the MQTT client id
    pub device_id: String,

    /// Digital twin model the device implements
    pub model_id: Option<String>,

    /// MQTT configuration
    pub mqtt: MqttConfig,

    /// Property engine configuration
    pub properties: PropertyConfig,
}

/// MQTT configuration.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker URL
    pub broker: String,

    /// Keep-alive interval
    pub keep_alive: Duration,

    /// How long a single receive waits before the shutdown flag is checked again
    pub receive_timeout: Duration,
}

/// Property engine configuration.
#[derive(Debug, Clone)]
pub struct PropertyConfig {
    /// Topic prefix
    pub topic_prefix: String,

    /// Components of the device model
    pub components: ComponentRegistry,

    /// Capacity of the outbound topic buffer
    pub topic_capacity: usize,

    /// Capacity of the outbound payload buffer
    pub payload_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device_id: format!("pnp-twin-{}", Uuid::new_v4().simple()),
            model_id: None,
            mqtt: MqttConfig {
                broker: "tcp://localhost:1883".to_string(),
                keep_alive: Duration::from_secs(30),
                receive_timeout: Duration::from_millis(500),
            },
            properties: PropertyConfig {
                topic_prefix: DEFAULT_PREFIX.to_string(),
                components: ComponentRegistry::default(),
                topic_capacity: 128,
                payload_capacity: 1024,
            },
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PNP_TWIN_DEVICE_ID`: Device identifier
    /// - `PNP_TWIN_MODEL_ID`: Digital twin model identifier
    /// - `PNP_TWIN_MQTT_BROKER`: MQTT broker URL
    /// - `PNP_TWIN_TOPIC_PREFIX`: Topic prefix
    /// - `PNP_TWIN_COMPONENTS`: JSON array of component names
    /// - `PNP_TWIN_RECEIVE_TIMEOUT_MS`: Receive timeout in milliseconds
    /// - `PNP_TWIN_PAYLOAD_CAPACITY`: Outbound payload buffer size in bytes
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(device_id) = lookup("PNP_TWIN_DEVICE_ID") {
            config.device_id = device_id;
        }

        if let Some(model_id) = lookup("PNP_TWIN_MODEL_ID") {
            config.model_id = Some(model_id);
        }

        if let Some(broker) = lookup("PNP_TWIN_MQTT_BROKER") {
            config.mqtt.broker = broker;
        }

        if let Some(prefix) = lookup("PNP_TWIN_TOPIC_PREFIX") {
            config.properties.topic_prefix = prefix;
        }

        if let Some(components) = lookup("PNP_TWIN_COMPONENTS") {
            config.properties.components =
                serde_json::from_str(&components).context("Invalid PNP_TWIN_COMPONENTS JSON")?;
        }

        if let Some(timeout) = lookup("PNP_TWIN_RECEIVE_TIMEOUT_MS") {
            let millis: u64 = timeout
                .parse()
                .context("Invalid PNP_TWIN_RECEIVE_TIMEOUT_MS")?;
            config.mqtt.receive_timeout = Duration::from_millis(millis);
        }

        if let Some(capacity) = lookup("PNP_TWIN_PAYLOAD_CAPACITY") {
            config.properties.payload_capacity = capacity
                .parse()
                .context("Invalid PNP_TWIN_PAYLOAD_CAPACITY")?;
        }

        Ok(config)
    }
}
