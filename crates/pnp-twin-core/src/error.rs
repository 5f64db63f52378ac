//! Error type shared by the property engine.

/// Errors returned by topic handling, document traversal and payload framing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// A topic variable segment is malformed, or a correlation id cannot be embedded
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Output region is too small; nothing was written
    #[error("insufficient buffer: {required} bytes required, {available} available")]
    InsufficientBuffer {
        /// Bytes the operation needs
        required: usize,
        /// Bytes left in the output region
        available: usize,
    },

    /// A stream or cursor was used outside of its documented precondition
    #[error("invalid JSON state: {0}")]
    InvalidJsonState(String),

    /// The byte buffer is not a JSON document
    #[error("malformed JSON document: {0}")]
    MalformedJson(String),

    /// The document does not carry the version field expected for its response kind
    #[error("property version not found")]
    PropertyVersionNotFound,

    /// Unbalanced begin/end calls on the acknowledgement builder
    #[error("builder state error: {0}")]
    BuilderState(String),

    /// The argument combination cannot describe a property document
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PropertyError {
    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::InvalidJsonState(message.into())
    }
}

/// Result alias for property operations.
pub type Result<T> = std::result::Result<T, PropertyError>;
