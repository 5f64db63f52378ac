//! Device runtime: subscribes to property topics, applies writable
//! properties and acknowledges them.

use crate::config::AgentConfig;
use crate::store::{PropertyKey, PropertyStore};
use pnp_twin_core::{
    extract_version, status, AckPayloadBuilder, ComponentProperty, ComponentRegistry,
    DocumentCursor, JsonReader, JsonWriter, PropertyError, PropertyFilter, ResponseDescriptor,
    ResponseKind, TokenStream, TokenWriter,
};
use pnp_twin_proto::{Message, QoS, RequestKind, TopicScheme, Transport};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Description sent with every accepted writable property.
const ACCEPTED_DESCRIPTION: &str = "success";

/// Unanswered requests kept before the oldest is forgotten.
const MAX_PENDING_REQUESTS: usize = 32;

/// Errors that stop the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError<E: std::error::Error + 'static> {
    /// The transport failed
    #[error("transport error: {0}")]
    Transport(#[source] E),
    /// A property operation failed
    #[error(transparent)]
    Property(#[from] PropertyError),
}

/// Property runtime for a single device.
pub struct DeviceRuntime<T: Transport> {
    transport: T,
    scheme: TopicScheme,
    registry: ComponentRegistry,
    store: PropertyStore,
    receive_timeout: Duration,
    topic_buffer: Vec<u8>,
    payload_buffer: Vec<u8>,
    next_request_id: u64,
    pending: BTreeMap<u64, RequestKind>,
}

impl<T: Transport> DeviceRuntime<T> {
    /// Create a runtime over `transport`.
    #[must_use]
    pub fn new(transport: T, config: &AgentConfig) -> Self {
        Self {
            transport,
            scheme: TopicScheme::new(&config.properties.topic_prefix),
            registry: config.properties.components.clone(),
            store: PropertyStore::new(),
            receive_timeout: config.mqtt.receive_timeout,
            topic_buffer: vec![0; config.properties.topic_capacity],
            payload_buffer: vec![0; config.properties.payload_capacity],
            next_request_id: 1,
            pending: BTreeMap::new(),
        }
    }

    /// Subscribe to the property topics and request the full document.
    ///
    /// # Errors
    ///
    /// Returns error if a subscription or the document request fails.
    pub fn start(&mut self) -> Result<(), RuntimeError<T::Error>> {
        for filter in [
            self.scheme.response_filter(),
            self.scheme.desired_patch_filter(),
        ] {
            self.transport
                .subscribe(&filter, QoS::AtLeastOnce)
                .map_err(RuntimeError::Transport)?;
        }

        self.request_document()
    }

    /// Publish a request for the full property document.
    ///
    /// # Errors
    ///
    /// Returns error if the topic does not fit or the publish fails.
    pub fn request_document(&mut self) -> Result<(), RuntimeError<T::Error>> {
        let rid = self.next_rid();
        self.publish(RequestKind::DocumentGet, rid, 0)?;
        tracing::info!(rid, "Requested property document");
        Ok(())
    }

    /// Wait for one message and handle it.
    ///
    /// Returns whether a message arrived. Failures that concern a single
    /// message are logged and do not stop the runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the transport fails.
    pub fn poll(&mut self) -> Result<bool, RuntimeError<T::Error>> {
        let Some(message) = self
            .transport
            .receive(self.receive_timeout)
            .map_err(RuntimeError::Transport)?
        else {
            return Ok(false);
        };

        match self.handle_message(&message) {
            Ok(()) => {}
            Err(RuntimeError::Property(err)) => {
                tracing::warn!(topic = %message.topic, error = %err, "Failed to handle message");
            }
            Err(err) => return Err(err),
        }
        Ok(true)
    }

    /// Run until `shutdown` is set.
    ///
    /// # Errors
    ///
    /// Returns error if startup or the transport fails.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), RuntimeError<T::Error>> {
        self.start()?;
        tracing::info!("Device runtime running");

        while !shutdown.load(Ordering::Relaxed) {
            self.poll()?;
        }

        for (key, property) in self.store.iter() {
            tracing::debug!(
                component = ?key.component,
                property = %key.name,
                version = property.version,
                value = %property.value,
                "Final property value"
            );
        }
        tracing::info!(properties = self.store.len(), "Device runtime stopped");
        Ok(())
    }

    /// Accepted properties.
    #[must_use]
    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    /// Number of requests still waiting for a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// The underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn handle_message(&mut self, message: &Message) -> Result<(), RuntimeError<T::Error>> {
        let Some(descriptor) = self.scheme.classify(&message.topic)? else {
            tracing::debug!(topic = %message.topic, "Ignoring non-property topic");
            return Ok(());
        };

        let answered = descriptor
            .correlation_id
            .as_deref()
            .and_then(|rid| rid.parse::<u64>().ok());
        let request = answered.and_then(|rid| self.pending.remove(&rid));

        let kind = match (descriptor.kind, request) {
            // A 200 answering a reported patch is an ack, not a document.
            (ResponseKind::DocumentGet, Some(RequestKind::ReportedPatch)) => {
                ResponseKind::ReportedAck
            }
            (kind, _) => kind,
        };

        tracing::debug!(
            topic = %message.topic,
            kind = %kind,
            payload_len = message.payload.len(),
            "Received property message"
        );

        match kind {
            ResponseKind::DocumentGet | ResponseKind::DesiredPatch => {
                self.process_document(kind, &message.payload)
            }
            ResponseKind::ReportedAck => {
                log_ack(&descriptor, request);
                if let (Some(rid), Some(RequestKind::ReportedPatch)) = (answered, request) {
                    self.forget_patches_before(rid);
                }
                Ok(())
            }
        }
    }

    fn process_document(
        &mut self,
        kind: ResponseKind,
        payload: &[u8],
    ) -> Result<(), RuntimeError<T::Error>> {
        let version = {
            let mut stream = JsonReader::from_slice(payload)?;
            stream.advance()?;
            extract_version(&mut stream, kind)?
        };

        let mut stream = JsonReader::from_slice(payload)?;
        stream.advance()?;
        let mut cursor =
            DocumentCursor::new(stream, &self.registry, kind, PropertyFilter::WriteableOnly)?;

        let mut accepted = Vec::new();
        while let Some(property) = cursor.next_property()? {
            let value = cursor.read_value()?;
            let key = PropertyKey::new(property.component.as_deref(), property.name.clone());
            if self.store.apply(key, value.clone(), version) {
                tracing::info!(
                    component = ?property.component,
                    property = %property.name,
                    version,
                    "Applied writable property"
                );
                accepted.push((property, value));
            }
        }

        self.acknowledge(version, &accepted)
    }

    fn acknowledge(
        &mut self,
        version: i64,
        accepted: &[(ComponentProperty, Value)],
    ) -> Result<(), RuntimeError<T::Error>> {
        if accepted.is_empty() {
            return Ok(());
        }

        let payload_len = {
            let mut writer = JsonWriter::new(&mut self.payload_buffer);
            let mut builder = AckPayloadBuilder::new(&mut writer)?;
            let mut open: Option<&str> = None;

            for (property, value) in accepted {
                let component = property.component.as_deref();
                if component != open {
                    if open.is_some() {
                        builder.end_component()?;
                    }
                    if let Some(name) = component {
                        builder.begin_component(name)?;
                    }
                    open = component;
                }
                builder.begin_status(
                    &property.name,
                    status::OK,
                    version,
                    Some(ACCEPTED_DESCRIPTION),
                )?;
                builder.writer().value(value)?;
                builder.end_status()?;
            }

            if open.is_some() {
                builder.end_component()?;
            }
            builder.finish()?;
            writer.len()
        };

        let rid = self.next_rid();
        self.publish(RequestKind::ReportedPatch, rid, payload_len)?;
        tracing::info!(
            rid,
            version,
            properties = accepted.len(),
            "Acknowledged writable properties"
        );
        Ok(())
    }

    /// Publish the first `payload_len` bytes of the payload buffer.
    fn publish(
        &mut self,
        kind: RequestKind,
        rid: u64,
        payload_len: usize,
    ) -> Result<(), RuntimeError<T::Error>> {
        let topic_len = self
            .scheme
            .write_topic(kind, &rid.to_string(), &mut self.topic_buffer)?;
        let topic = std::str::from_utf8(&self.topic_buffer[..topic_len])
            .map_err(|e| PropertyError::InvalidTopic(e.to_string()))?;

        self.transport
            .publish(topic, &self.payload_buffer[..payload_len], QoS::AtLeastOnce)
            .map_err(RuntimeError::Transport)?;
        self.pending.insert(rid, kind);

        while self.pending.len() > MAX_PENDING_REQUESTS {
            let Some((rid, kind)) = self.pending.pop_first() else {
                break;
            };
            tracing::warn!(rid, ?kind, "Dropping unanswered request");
        }
        Ok(())
    }

    /// A reported patch supersedes every earlier one, answered or not.
    fn forget_patches_before(&mut self, rid: u64) {
        self.pending
            .retain(|&pending, kind| pending > rid || *kind != RequestKind::ReportedPatch);
    }

    fn next_rid(&mut self) -> u64 {
        let rid = self.next_request_id;
        self.next_request_id += 1;
        rid
    }
}

fn log_ack(descriptor: &ResponseDescriptor, request: Option<RequestKind>) {
    let rid = descriptor.correlation_id.as_deref().unwrap_or_default();
    match request {
        Some(RequestKind::DocumentGet) => {
            tracing::warn!(rid, status = ?descriptor.status, "Property document request failed");
        }
        _ if descriptor.is_success() => {
            tracing::debug!(
                rid,
                status = ?descriptor.status,
                version = ?descriptor.version,
                "Reported properties accepted"
            );
        }
        _ => {
            tracing::warn!(rid, status = ?descriptor.status, "Reported properties rejected");
        }
    }
}
