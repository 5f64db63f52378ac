//! Reported-property payload framing.
//!
//! [`AckPayloadBuilder`] wraps a caller-supplied [`TokenWriter`] and writes the
//! component wrappers and acknowledgement blocks of a reported-property
//! PATCH. Property values are written by the caller through
//! [`AckPayloadBuilder::writer`]; the builder never inspects them.
//!
//! ```
//! use pnp_twin_core::{AckPayloadBuilder, JsonWriter, TokenWriter};
//!
//! let mut buffer = [0u8; 128];
//! let mut writer = JsonWriter::new(&mut buffer);
//! let mut builder = AckPayloadBuilder::new(&mut writer).unwrap();
//! builder.begin_component("thermostat1").unwrap();
//! builder
//!     .begin_status("targetTemperature", 200, 3, Some("success"))
//!     .unwrap();
//! builder.writer().value(&21.5).unwrap();
//! builder.end_status().unwrap();
//! builder.end_component().unwrap();
//! builder.finish().unwrap();
//!
//! assert_eq!(
//!     writer.as_bytes(),
//!     br#"{"thermostat1":{"__t":"c","targetTemperature":{"ac":200,"av":3,"ad":"success","value":21.5}}}"#
//! );
//! ```

use crate::component::{COMPONENT_MARKER_KEY, COMPONENT_MARKER_VALUE};
use crate::error::{PropertyError, Result};
use crate::writer::TokenWriter;
use serde::Serialize;

/// Acknowledgement status code key.
pub const ACK_CODE_KEY: &str = "ac";
/// Acknowledged version key.
pub const ACK_VERSION_KEY: &str = "av";
/// Acknowledgement description key.
pub const ACK_DESCRIPTION_KEY: &str = "ad";
/// Echoed value key.
pub const ACK_VALUE_KEY: &str = "value";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Root,
    Component,
    /// Writer depth at which the status value is written.
    StatusBlock { depth: usize },
}

impl Frame {
    fn is_status(self) -> bool {
        matches!(self, Self::StatusBlock { .. })
    }
}

/// Nested-object writer for reported properties and their acknowledgements.
///
/// Components are flat: a component cannot open inside another, and a
/// status block cannot open inside another status block.
///
/// Each framing call is all-or-nothing: when a token does not fit, the
/// writer is rolled back to where the call started.
#[derive(Debug)]
pub struct AckPayloadBuilder<'w, W: TokenWriter> {
    writer: &'w mut W,
    frames: Vec<Frame>,
}

impl<'w, W: TokenWriter> AckPayloadBuilder<'w, W> {
    /// Open the root object of a reported-property payload.
    ///
    /// # Errors
    ///
    /// Propagates writer failures such as [`PropertyError::InsufficientBuffer`].
    pub fn new(writer: &'w mut W) -> Result<Self> {
        writer.begin_object()?;
        Ok(Self {
            writer,
            frames: vec![Frame::Root],
        })
    }

    /// Open a component wrapper: `"<name>":{"__t":"c"`.
    ///
    /// # Errors
    ///
    /// [`PropertyError::BuilderState`] unless called directly inside the root object.
    pub fn begin_component(&mut self, name: &str) -> Result<()> {
        self.expect_top(|frame| frame == Frame::Root, "begin_component")?;
        self.atomically(|writer| {
            writer.property_name(name)?;
            writer.begin_object()?;
            writer.property_name(COMPONENT_MARKER_KEY)?;
            writer.string(COMPONENT_MARKER_VALUE)
        })?;
        self.frames.push(Frame::Component);
        Ok(())
    }

    /// Close the open component wrapper.
    ///
    /// # Errors
    ///
    /// [`PropertyError::BuilderState`] unless a component is the innermost open frame.
    pub fn end_component(&mut self) -> Result<()> {
        self.expect_top(|frame| frame == Frame::Component, "end_component")?;
        self.writer.end_object()?;
        self.frames.pop();
        Ok(())
    }

    /// Open an acknowledgement block for `property_name`, leaving the writer
    /// ready for exactly one value token.
    ///
    /// `description` is omitted from the payload when `None`.
    ///
    /// # Errors
    ///
    /// [`PropertyError::BuilderState`] inside another status block.
    pub fn begin_status(
        &mut self,
        property_name: &str,
        code: u16,
        version: i64,
        description: Option<&str>,
    ) -> Result<()> {
        self.expect_top(|frame| !frame.is_status(), "begin_status")?;
        self.atomically(|writer| {
            writer.property_name(property_name)?;
            writer.begin_object()?;
            writer.property_name(ACK_CODE_KEY)?;
            writer.value(&code)?;
            writer.property_name(ACK_VERSION_KEY)?;
            writer.value(&version)?;
            if let Some(description) = description {
                writer.property_name(ACK_DESCRIPTION_KEY)?;
                writer.string(description)?;
            }
            writer.property_name(ACK_VALUE_KEY)
        })?;
        self.frames.push(Frame::StatusBlock {
            depth: self.writer.depth(),
        });
        Ok(())
    }

    /// Close the open acknowledgement block.
    ///
    /// # Errors
    ///
    /// [`PropertyError::BuilderState`] unless a status block is the innermost
    /// open frame and its value has been written completely.
    pub fn end_status(&mut self) -> Result<()> {
        self.expect_top(Frame::is_status, "end_status")?;
        if let Some(&Frame::StatusBlock { depth }) = self.frames.last() {
            if self.writer.awaiting_value() || self.writer.depth() != depth {
                return Err(PropertyError::BuilderState(
                    "end_status before the status value was completely written".to_string(),
                ));
            }
        }
        self.writer.end_object()?;
        self.frames.pop();
        Ok(())
    }

    /// Write a plain reported property at the root or inside a component.
    ///
    /// # Errors
    ///
    /// [`PropertyError::BuilderState`] inside a status block.
    pub fn property<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<()> {
        self.expect_top(|frame| !frame.is_status(), "property")?;
        self.atomically(|writer| {
            writer.property_name(name)?;
            writer.value(value)
        })
    }

    /// The underlying writer, for appending the value of a status block.
    pub fn writer(&mut self) -> &mut W {
        &mut *self.writer
    }

    /// Close the root object.
    ///
    /// # Errors
    ///
    /// [`PropertyError::BuilderState`] while a component or status block is open.
    pub fn finish(mut self) -> Result<()> {
        self.expect_top(|frame| frame == Frame::Root, "finish")?;
        self.writer.end_object()?;
        self.frames.pop();
        Ok(())
    }

    fn atomically(&mut self, write: impl FnOnce(&mut W) -> Result<()>) -> Result<()> {
        let checkpoint = self.writer.checkpoint();
        let result = write(&mut *self.writer);
        if result.is_err() {
            self.writer.rollback(checkpoint);
        }
        result
    }

    fn expect_top(&self, allowed: impl Fn(Frame) -> bool, operation: &str) -> Result<()> {
        match self.frames.last() {
            Some(&frame) if allowed(frame) => Ok(()),
            Some(frame) => Err(PropertyError::BuilderState(format!(
                "{operation} is not allowed inside {frame:?}"
            ))),
            None => Err(PropertyError::BuilderState(format!(
                "{operation} called after the payload was finished"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::JsonWriter;

    #[test]
    fn acknowledges_component_property() {
        let mut buffer = [0u8; 256];
        let mut writer = JsonWriter::new(&mut buffer);
        let mut builder = AckPayloadBuilder::new(&mut writer).unwrap();
        builder.begin_component("thermostat1").unwrap();
        builder
            .begin_status("targetTemperature", 200, 3, Some("success"))
            .unwrap();
        builder.writer().value(&21.5).unwrap();
        builder.end_status().unwrap();
        builder.end_component().unwrap();
        builder.finish().unwrap();

        assert_eq!(
            writer.as_bytes(),
            br#"{"thermostat1":{"__t":"c","targetTemperature":{"ac":200,"av":3,"ad":"success","value":21.5}}}"#
        );
    }

    #[test]
    fn mixes_root_acks_plain_properties_and_components() {
        let mut buffer = [0u8; 256];
        let mut writer = JsonWriter::new(&mut buffer);
        let mut builder = AckPayloadBuilder::new(&mut writer).unwrap();
        builder.begin_status("targetHumidity", 200, 5, None).unwrap();
        builder.writer().begin_object().unwrap();
        builder.writer().property_name("min").unwrap();
        builder.writer().value(&30).unwrap();
        builder.writer().end_object().unwrap();
        builder.end_status().unwrap();
        builder.property("serialNumber", "SN-1").unwrap();
        builder.begin_component("thermostat2").unwrap();
        builder.property("maxTempSinceLastReboot", &31.5).unwrap();
        builder.end_component().unwrap();
        builder.finish().unwrap();

        assert_eq!(
            writer.as_bytes(),
            br#"{"targetHumidity":{"ac":200,"av":5,"value":{"min":30}},"serialNumber":"SN-1","thermostat2":{"__t":"c","maxTempSinceLastReboot":31.5}}"#
        );
    }

    #[test]
    fn end_component_without_begin_fails() {
        let mut buffer = [0u8; 32];
        let mut writer = JsonWriter::new(&mut buffer);
        let mut builder = AckPayloadBuilder::new(&mut writer).unwrap();
        assert!(matches!(
            builder.end_component(),
            Err(PropertyError::BuilderState(_))
        ));
    }

    #[test]
    fn nesting_rules_are_enforced() {
        let mut buffer = [0u8; 256];
        let mut writer = JsonWriter::new(&mut buffer);
        let mut builder = AckPayloadBuilder::new(&mut writer).unwrap();

        builder.begin_component("a").unwrap();
        assert!(matches!(
            builder.begin_component("b"),
            Err(PropertyError::BuilderState(_))
        ));

        builder.begin_status("p", 200, 1, None).unwrap();
        assert!(matches!(
            builder.begin_status("q", 200, 1, None),
            Err(PropertyError::BuilderState(_))
        ));
        assert!(matches!(
            builder.end_component(),
            Err(PropertyError::BuilderState(_))
        ));
        assert!(matches!(
            builder.property("r", &1),
            Err(PropertyError::BuilderState(_))
        ));
    }

    #[test]
    fn finish_with_open_frame_fails() {
        let mut buffer = [0u8; 64];
        let mut writer = JsonWriter::new(&mut buffer);
        let mut builder = AckPayloadBuilder::new(&mut writer).unwrap();
        builder.begin_component("a").unwrap();
        assert!(matches!(
            builder.finish(),
            Err(PropertyError::BuilderState(_))
        ));
    }

    #[test]
    fn component_that_does_not_fit_leaves_payload_intact() {
        let mut buffer = [0u8; 16];
        let mut writer = JsonWriter::new(&mut buffer);
        let mut builder = AckPayloadBuilder::new(&mut writer).unwrap();
        assert!(matches!(
            builder.begin_component("thermostat1"),
            Err(PropertyError::InsufficientBuffer { .. })
        ));
        assert!(matches!(
            builder.end_component(),
            Err(PropertyError::BuilderState(_))
        ));
        builder.property("on", &true).unwrap();
        builder.finish().unwrap();

        assert_eq!(writer.as_bytes(), br#"{"on":true}"#);
    }

    #[test]
    fn status_that_does_not_fit_leaves_payload_intact() {
        let mut buffer = [0u8; 40];
        let mut writer = JsonWriter::new(&mut buffer);
        let mut builder = AckPayloadBuilder::new(&mut writer).unwrap();
        assert!(matches!(
            builder.begin_status("targetTemperature", 200, 3, Some("success")),
            Err(PropertyError::InsufficientBuffer { .. })
        ));
        assert_eq!(builder.writer().as_bytes(), b"{");

        builder.begin_status("t", 200, 3, None).unwrap();
        builder.writer().value(&21.5).unwrap();
        builder.end_status().unwrap();
        builder.finish().unwrap();
        assert_eq!(writer.as_bytes(), br#"{"t":{"ac":200,"av":3,"value":21.5}}"#);
    }

    #[test]
    fn end_status_requires_a_complete_value() {
        let mut buffer = [0u8; 128];
        let mut writer = JsonWriter::new(&mut buffer);
        let mut builder = AckPayloadBuilder::new(&mut writer).unwrap();
        builder.begin_status("mode", 200, 1, None).unwrap();
        assert!(matches!(
            builder.end_status(),
            Err(PropertyError::BuilderState(_))
        ));

        builder.writer().begin_array().unwrap();
        builder.writer().value(&1).unwrap();
        assert!(matches!(
            builder.end_status(),
            Err(PropertyError::BuilderState(_))
        ));

        builder.writer().end_array().unwrap();
        builder.end_status().unwrap();
        builder.finish().unwrap();
        assert_eq!(writer.as_bytes(), br#"{"mode":{"ac":200,"av":1,"value":[1]}}"#);
    }
}
