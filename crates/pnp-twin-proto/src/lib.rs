//! # pnp-twin Protocol
//!
//! Property topic scheme and the publish/subscribe seam.
//!
//! ## Topics
//!
//! - Inbound: `{prefix}/twin/res/{status}/?$rid={rid}[&$version={version}]`
//!   and `{prefix}/twin/PATCH/properties/desired/?$version={version}`
//! - Outbound: `{prefix}/twin/GET/?$rid={rid}` and
//!   `{prefix}/twin/PATCH/properties/reported/?$rid={rid}`
//!
//! The prefix defaults to `$iothub`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod topics;
pub mod transport;

pub use topics::{RequestKind, TopicScheme};
pub use transport::{Message, QoS, Transport};
