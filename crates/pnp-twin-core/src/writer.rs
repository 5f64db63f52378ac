//! JSON token writer over a caller-owned buffer.

use crate::error::{PropertyError, Result};
use serde::Serialize;

/// Append-only JSON token sink.
pub trait TokenWriter {
    /// Append `{`.
    ///
    /// # Errors
    ///
    /// Fails if the token is not valid at this position or does not fit.
    fn begin_object(&mut self) -> Result<()>;

    /// Append `}`.
    ///
    /// # Errors
    ///
    /// Fails if no object is open or the token does not fit.
    fn end_object(&mut self) -> Result<()>;

    /// Append `[`.
    ///
    /// # Errors
    ///
    /// Fails if the token is not valid at this position or does not fit.
    fn begin_array(&mut self) -> Result<()>;

    /// Append `]`.
    ///
    /// # Errors
    ///
    /// Fails if no array is open or the token does not fit.
    fn end_array(&mut self) -> Result<()>;

    /// Append an object key.
    ///
    /// # Errors
    ///
    /// Fails outside of an object or if the key does not fit.
    fn property_name(&mut self, name: &str) -> Result<()>;

    /// Append a string value.
    ///
    /// # Errors
    ///
    /// Fails if a value is not expected here or the string does not fit.
    fn string(&mut self, value: &str) -> Result<()>;

    /// Append any serializable value as a single complete JSON value.
    ///
    /// # Errors
    ///
    /// Fails if a value is not expected here, cannot be serialized, or does not fit.
    fn value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()>;

    /// Bytes still available in the output region.
    fn remaining_capacity(&self) -> usize;

    /// Number of objects and arrays currently open.
    fn depth(&self) -> usize;

    /// Whether a property name has been written and its value has not.
    fn awaiting_value(&self) -> bool;

    /// Position to return to with [`rollback`](Self::rollback).
    fn checkpoint(&self) -> Checkpoint;

    /// Discard everything appended since `checkpoint`.
    ///
    /// Only valid while every scope open at the checkpoint is still open.
    fn rollback(&mut self, checkpoint: Checkpoint);
}

/// Writer position captured by [`TokenWriter::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    len: usize,
    depth: usize,
    needs_separator: bool,
    expecting_value: bool,
}

impl Checkpoint {
    /// Create a checkpoint from raw writer state.
    #[must_use]
    pub fn new(len: usize, depth: usize, needs_separator: bool, expecting_value: bool) -> Self {
        Self {
            len,
            depth,
            needs_separator,
            expecting_value,
        }
    }

    /// Bytes written at the checkpoint.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing had been written at the checkpoint.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Open scopes at the checkpoint.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether a separator was due before the next member.
    #[must_use]
    pub fn needs_separator(&self) -> bool {
        self.needs_separator
    }

    /// Whether a value was due after a property name.
    #[must_use]
    pub fn expecting_value(&self) -> bool {
        self.expecting_value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Object,
    Array,
}

/// [`TokenWriter`] writing compact JSON into a fixed `&mut [u8]`.
///
/// An append that does not fit fails with [`PropertyError::InsufficientBuffer`]
/// and leaves the buffer untouched.
#[derive(Debug)]
pub struct JsonWriter<'a> {
    buffer: &'a mut [u8],
    len: usize,
    scopes: Vec<Scope>,
    needs_separator: bool,
    expecting_value: bool,
}

impl<'a> JsonWriter<'a> {
    /// Create a writer over `buffer`.
    #[must_use]
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            len: 0,
            scopes: Vec::new(),
            needs_separator: false,
            expecting_value: false,
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let separator = usize::from(self.needs_separator && !self.expecting_value);
        let required = separator + bytes.len();
        let available = self.remaining_capacity();
        if required > available {
            return Err(PropertyError::InsufficientBuffer {
                required,
                available,
            });
        }

        if separator == 1 {
            self.buffer[self.len] = b',';
        }
        let start = self.len + separator;
        self.buffer[start..start + bytes.len()].copy_from_slice(bytes);
        self.len = start + bytes.len();
        Ok(())
    }

    fn check_value_position(&self) -> Result<()> {
        if self.scopes.last() == Some(&Scope::Object) && !self.expecting_value {
            return Err(PropertyError::state(
                "object members need a property name before the value",
            ));
        }
        Ok(())
    }

    fn append_value(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_value_position()?;
        self.append(bytes)?;
        self.needs_separator = true;
        self.expecting_value = false;
        Ok(())
    }

    fn open(&mut self, scope: Scope, byte: u8) -> Result<()> {
        self.check_value_position()?;
        self.append(&[byte])?;
        self.scopes.push(scope);
        self.needs_separator = false;
        self.expecting_value = false;
        Ok(())
    }

    fn close(&mut self, scope: Scope, byte: u8) -> Result<()> {
        if self.scopes.last() != Some(&scope) || self.expecting_value {
            return Err(PropertyError::state(format!(
                "cannot close {scope:?} at this position"
            )));
        }
        let needs_separator = self.needs_separator;
        self.needs_separator = false;
        if let Err(err) = self.append(&[byte]) {
            self.needs_separator = needs_separator;
            return Err(err);
        }
        self.scopes.pop();
        self.needs_separator = true;
        Ok(())
    }
}

impl TokenWriter for JsonWriter<'_> {
    fn begin_object(&mut self) -> Result<()> {
        self.open(Scope::Object, b'{')
    }

    fn end_object(&mut self) -> Result<()> {
        self.close(Scope::Object, b'}')
    }

    fn begin_array(&mut self) -> Result<()> {
        self.open(Scope::Array, b'[')
    }

    fn end_array(&mut self) -> Result<()> {
        self.close(Scope::Array, b']')
    }

    fn property_name(&mut self, name: &str) -> Result<()> {
        if self.scopes.last() != Some(&Scope::Object) || self.expecting_value {
            return Err(PropertyError::state(
                "property names are only valid directly inside an object",
            ));
        }
        let mut bytes = encode(name)?;
        bytes.push(b':');
        self.append(&bytes)?;
        self.needs_separator = false;
        self.expecting_value = true;
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<()> {
        let bytes = encode(value)?;
        self.append_value(&bytes)
    }

    fn value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let bytes = encode(value)?;
        self.append_value(&bytes)
    }

    fn remaining_capacity(&self) -> usize {
        self.buffer.len() - self.len
    }

    fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn awaiting_value(&self) -> bool {
        self.expecting_value
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(
            self.len,
            self.scopes.len(),
            self.needs_separator,
            self.expecting_value,
        )
    }

    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.len = checkpoint.len.min(self.len);
        self.scopes.truncate(checkpoint.depth);
        self.needs_separator = checkpoint.needs_separator;
        self.expecting_value = checkpoint.expecting_value;
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| PropertyError::InvalidArgument(e.to_string()))
}
