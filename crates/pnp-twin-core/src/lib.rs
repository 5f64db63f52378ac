//! # pnp-twin Core
//!
//! Client-side semantics of the device twin property convention.
//!
//! This crate provides:
//! - A read-once JSON token stream and a capacity-bounded token writer
//! - A component-aware cursor over desired/reported property documents
//! - Document version extraction, run as an independent pass
//! - A framing builder for reported properties and writable-property acknowledgements
//!
//! A received document is read twice, each time through its own stream:
//!
//! ```
//! use pnp_twin_core::{
//!     extract_version, ComponentRegistry, DocumentCursor, JsonReader, PropertyFilter,
//!     ResponseKind, TokenStream,
//! };
//!
//! let payload = br#"{"thermostat1":{"__t":"c","targetTemperature":21.5},"$version":7}"#;
//! let registry = ComponentRegistry::new(["thermostat1"]);
//!
//! let mut versions = JsonReader::from_slice(payload).unwrap();
//! versions.advance().unwrap();
//! let version = extract_version(&mut versions, ResponseKind::DesiredPatch).unwrap();
//! assert_eq!(version, 7);
//!
//! let mut properties = JsonReader::from_slice(payload).unwrap();
//! properties.advance().unwrap();
//! let mut cursor = DocumentCursor::new(
//!     properties,
//!     &registry,
//!     ResponseKind::DesiredPatch,
//!     PropertyFilter::WriteableOnly,
//! )
//! .unwrap();
//! let property = cursor.next_property().unwrap().unwrap();
//! assert_eq!(property.component.as_deref(), Some("thermostat1"));
//! assert_eq!(cursor.read_value().unwrap(), 21.5);
//! assert!(cursor.next_property().unwrap().is_none());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod component;
pub mod cursor;
pub mod error;
pub mod response;
pub mod status;
pub mod token;
pub mod version;
pub mod writer;

pub use builder::AckPayloadBuilder;
pub use component::ComponentRegistry;
pub use cursor::{ComponentProperty, DocumentCursor, PropertyFilter};
pub use error::{PropertyError, Result};
pub use response::{ResponseDescriptor, ResponseKind};
pub use token::{read_value, JsonReader, Token, TokenStream};
pub use version::extract_version;
pub use writer::{Checkpoint, JsonWriter, TokenWriter};
