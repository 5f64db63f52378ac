//! Inbound property response kinds and descriptors.

use serde::{Deserialize, Serialize};

/// Kind of an inbound property message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Response to a document GET request; the payload is the full property document
    DocumentGet,
    /// Service-initiated update of desired properties
    DesiredPatch,
    /// Acknowledgement of a reported-property PATCH
    ReportedAck,
}

impl ResponseKind {
    /// Whether messages of this kind carry a property document.
    #[must_use]
    pub fn has_document(self) -> bool {
        !matches!(self, Self::ReportedAck)
    }
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DocumentGet => write!(f, "document-get"),
            Self::DesiredPatch => write!(f, "desired-patch"),
            Self::ReportedAck => write!(f, "reported-ack"),
        }
    }
}

/// Classified inbound property topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDescriptor {
    /// Message kind
    pub kind: ResponseKind,
    /// Correlation id echoed from the request (`$rid`); absent on desired patches
    pub correlation_id: Option<String>,
    /// HTTP-like status; present on GET responses and reported acks
    pub status: Option<u16>,
    /// Document version (`$version`) when the topic carries one
    pub version: Option<i64>,
}

impl ResponseDescriptor {
    /// Whether the status, if any, is a 2xx success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.map_or(true, crate::status::is_success)
    }
}
