//! Component-aware walk over a property document.
//!
//! [`DocumentCursor`] flattens a document whose top level mixes bare
//! properties and component wrappers into a sequence of
//! `(component, property)` pairs. Iteration is shared with the caller:
//!
//! 1. [`DocumentCursor::next_property`] leaves the stream on a property name.
//! 2. The caller advances to the value, consumes it (skipping any children),
//!    and advances once more.
//!
//! [`DocumentCursor::read_value`] and [`DocumentCursor::skip_value`] do step 2
//! in one call. A value that is not fully consumed before the next call is
//! reported as [`PropertyError::InvalidJsonState`].

use crate::component::{ComponentRegistry, COMPONENT_MARKER_KEY, COMPONENT_MARKER_VALUE};
use crate::error::{PropertyError, Result};
use crate::response::ResponseKind;
use crate::token::{read_value, Token, TokenStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document-level version key.
pub const VERSION_KEY: &str = "$version";

/// Service metadata key.
pub const METADATA_KEY: &str = "$metadata";

/// Section of a GET response holding writable (desired) properties.
pub const DESIRED_SECTION: &str = "desired";

/// Section of a GET response holding properties reported by the device.
pub const REPORTED_SECTION: &str = "reported";

/// Which properties of a document to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PropertyFilter {
    /// Writable properties set by the service
    #[default]
    WriteableOnly,
    /// Properties the device has reported
    AllReportedByDevice,
}

impl PropertyFilter {
    fn section(self) -> &'static str {
        match self {
            Self::WriteableOnly => DESIRED_SECTION,
            Self::AllReportedByDevice => REPORTED_SECTION,
        }
    }
}

/// A property yielded by the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentProperty {
    /// Enclosing component, `None` for bare properties
    pub component: Option<String>,
    /// Property name
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CursorState {
    Start,
    AtPropertyName { name: String, depth: usize },
    EndOfDocument,
}

/// How a member of the walked object is treated, resolved once per member.
enum Member {
    Reserved,
    Component,
    Property,
}

/// Stateful iterator over the properties of one document.
#[derive(Debug)]
pub struct DocumentCursor<'r, S> {
    stream: S,
    registry: &'r ComponentRegistry,
    kind: ResponseKind,
    filter: PropertyFilter,
    state: CursorState,
    active_component: Option<String>,
    section_depth: usize,
}

impl<'r, S: TokenStream> DocumentCursor<'r, S> {
    /// Create a cursor over `stream`, which must be positioned on the
    /// document's opening brace before the first [`next_property`](Self::next_property).
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::InvalidArgument`] if `kind` carries no document,
    /// or if reported properties are requested from a desired patch.
    pub fn new(
        stream: S,
        registry: &'r ComponentRegistry,
        kind: ResponseKind,
        filter: PropertyFilter,
    ) -> Result<Self> {
        if !kind.has_document() {
            return Err(PropertyError::InvalidArgument(format!(
                "{kind} messages carry no property document"
            )));
        }
        if kind == ResponseKind::DesiredPatch && filter == PropertyFilter::AllReportedByDevice {
            return Err(PropertyError::InvalidArgument(
                "desired patches carry no reported properties".to_string(),
            ));
        }

        Ok(Self {
            stream,
            registry,
            kind,
            filter,
            state: CursorState::Start,
            active_component: None,
            section_depth: 1,
        })
    }

    /// Advance to the next property.
    ///
    /// Returns `Ok(None)` once the walked object is closed; further calls keep
    /// returning `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::InvalidJsonState`] if the stream is not where the
    /// cursor left it plus one fully consumed value, and
    /// [`PropertyError::MalformedJson`] if a GET section is not an object.
    pub fn next_property(&mut self) -> Result<Option<ComponentProperty>> {
        match &self.state {
            CursorState::EndOfDocument => return Ok(None),
            CursorState::Start => {
                if !self.enter_section()? {
                    self.state = CursorState::EndOfDocument;
                    return Ok(None);
                }
            }
            CursorState::AtPropertyName { name, depth } => self.check_consumed(name, *depth)?,
        }

        loop {
            let depth = self.stream.depth();
            match self.stream.current() {
                Some(Token::EndObject) => {
                    if self.active_component.is_some() && depth == self.section_depth {
                        if let Some(component) = self.active_component.take() {
                            tracing::trace!(component = %component, "Left component");
                        }
                        self.stream.advance()?;
                    } else if depth + 1 == self.section_depth {
                        self.state = CursorState::EndOfDocument;
                        return Ok(None);
                    } else {
                        return Err(PropertyError::state(format!(
                            "unexpected end of object at depth {depth}"
                        )));
                    }
                }
                Some(Token::PropertyName(name)) => {
                    let name = name.clone();
                    let expected = self.property_depth();
                    if depth != expected {
                        return Err(PropertyError::state(format!(
                            "property `{name}` at depth {depth}, expected depth {expected}"
                        )));
                    }

                    match self.classify(&name) {
                        Member::Reserved => {
                            tracing::trace!(key = %name, "Skipping reserved key");
                            self.skip_member()?;
                        }
                        Member::Component => self.enter_component(name)?,
                        Member::Property => {
                            self.state = CursorState::AtPropertyName {
                                name: name.clone(),
                                depth,
                            };
                            return Ok(Some(ComponentProperty {
                                component: self.active_component.clone(),
                                name,
                            }));
                        }
                    }
                }
                Some(_) => {
                    return Err(PropertyError::state(
                        "expected a property name or the end of an object",
                    ))
                }
                None => return Err(PropertyError::state("stream is not positioned on a token")),
            }
        }
    }

    /// Skip the value of the property just yielded, leaving the stream where
    /// the next [`next_property`](Self::next_property) expects it.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::InvalidJsonState`] if the stream is not on the
    /// yielded property name.
    pub fn skip_value(&mut self) -> Result<()> {
        self.expect_at_yielded()?;
        self.stream.advance()?;
        self.stream.skip_value()?;
        self.stream.advance()
    }

    /// Read the value of the property just yielded, leaving the stream where
    /// the next [`next_property`](Self::next_property) expects it.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::InvalidJsonState`] if the stream is not on the
    /// yielded property name.
    pub fn read_value(&mut self) -> Result<Value> {
        self.expect_at_yielded()?;
        self.stream.advance()?;
        let value = read_value(&mut self.stream)?;
        self.stream.advance()?;
        Ok(value)
    }

    /// Component enclosing the current position, if any.
    #[must_use]
    pub fn active_component(&self) -> Option<&str> {
        self.active_component.as_deref()
    }

    /// Response kind this cursor walks.
    #[must_use]
    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    /// Property filter this cursor applies.
    #[must_use]
    pub fn filter(&self) -> PropertyFilter {
        self.filter
    }

    /// Shared access to the underlying stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Mutable access to the underlying stream, for consuming values by hand.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Release the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn property_depth(&self) -> usize {
        self.section_depth + usize::from(self.active_component.is_some())
    }

    /// Position the stream on the first member of the walked object.
    /// Returns `false` when a GET response has no such section.
    fn enter_section(&mut self) -> Result<bool> {
        if self.stream.current() != Some(&Token::BeginObject) || self.stream.depth() != 0 {
            return Err(PropertyError::state(
                "stream must be positioned on the opening brace of the document",
            ));
        }

        if self.kind != ResponseKind::DocumentGet {
            self.section_depth = 1;
            self.stream.advance()?;
            return Ok(true);
        }

        let section = self.filter.section();
        self.section_depth = 2;
        self.stream.advance()?;
        loop {
            match self.stream.current() {
                Some(Token::PropertyName(name)) if name == section => {
                    if self.stream.peek(1) != Some(&Token::BeginObject) {
                        return Err(PropertyError::MalformedJson(format!(
                            "`{section}` section is not an object"
                        )));
                    }
                    self.stream.advance()?;
                    self.stream.advance()?;
                    return Ok(true);
                }
                Some(Token::PropertyName(_)) => self.skip_member()?,
                Some(Token::EndObject) => {
                    tracing::debug!(section, "Document has no such section");
                    return Ok(false);
                }
                _ => {
                    return Err(PropertyError::state(
                        "expected a top-level property name or the end of the document",
                    ))
                }
            }
        }
    }

    fn classify(&self, name: &str) -> Member {
        if name == VERSION_KEY || name == METADATA_KEY {
            return Member::Reserved;
        }
        if self.active_component.is_some() {
            return if name == COMPONENT_MARKER_KEY {
                Member::Reserved
            } else {
                Member::Property
            };
        }

        let is_wrapper = self.stream.peek(1) == Some(&Token::BeginObject)
            && self
                .stream
                .peek(2)
                .is_some_and(|token| token.is_property_name(COMPONENT_MARKER_KEY))
            && self
                .stream
                .peek(3)
                .is_some_and(|token| token.is_string(COMPONENT_MARKER_VALUE));

        if is_wrapper && self.registry.contains(name) {
            Member::Component
        } else {
            Member::Property
        }
    }

    /// From a property name, move past the name, its value and onto the next token.
    fn skip_member(&mut self) -> Result<()> {
        self.stream.advance()?;
        self.stream.skip_value()?;
        self.stream.advance()
    }

    /// From a component name, move past `{`, the marker member and onto the
    /// component's first member.
    fn enter_component(&mut self, name: String) -> Result<()> {
        for _ in 0..4 {
            self.stream.advance()?;
        }
        tracing::trace!(component = %name, "Entered component");
        self.active_component = Some(name);
        Ok(())
    }

    fn check_consumed(&self, yielded: &str, depth: usize) -> Result<()> {
        let current_depth = self.stream.depth();
        match self.stream.current() {
            Some(Token::PropertyName(name)) if current_depth == depth && name != yielded => Ok(()),
            Some(Token::EndObject) if current_depth + 1 == depth => Ok(()),
            _ => Err(PropertyError::state(format!(
                "value of `{yielded}` was not fully consumed before requesting the next property"
            ))),
        }
    }

    fn expect_at_yielded(&self) -> Result<()> {
        match &self.state {
            CursorState::AtPropertyName { name, depth }
                if self.stream.depth() == *depth
                    && self
                        .stream
                        .current()
                        .is_some_and(|token| token.is_property_name(name)) =>
            {
                Ok(())
            }
            _ => Err(PropertyError::state(
                "stream is not positioned on the property just returned",
            )),
        }
    }
}
