//! Publish/subscribe transport seam.
//!
//! The property engine never owns a connection. Whatever carries the
//! messages (an MQTT client, an in-memory double in tests) implements
//! [`Transport`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delivery guarantee for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QoS {
    /// Fire and forget
    AtMostOnce,
    /// Acknowledged delivery
    #[default]
    AtLeastOnce,
}

/// An inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the message arrived on
    pub topic: String,
    /// Raw payload
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// A synchronous publish/subscribe client.
pub trait Transport {
    /// Transport failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Subscribe to a topic filter.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription cannot be issued.
    fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), Self::Error>;

    /// Publish a payload.
    ///
    /// # Errors
    ///
    /// Returns error if the publish cannot be issued.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), Self::Error>;

    /// Wait up to `timeout` for the next inbound message.
    ///
    /// # Errors
    ///
    /// Returns error if the connection fails while waiting.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Message>, Self::Error>;
}
