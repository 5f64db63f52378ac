//! Document version lookup.
//!
//! Runs as its own pass, before the property walk, because the version key
//! may follow the properties it versions.

use crate::cursor::{DESIRED_SECTION, VERSION_KEY};
use crate::error::{PropertyError, Result};
use crate::response::ResponseKind;
use crate::token::{Token, TokenStream};

/// Read the document version for a message of `kind`.
///
/// The stream must be positioned on the document's opening brace. A GET
/// response carries its version as `desired.$version`; a desired patch
/// carries it as a top-level `$version`.
///
/// # Errors
///
/// - [`PropertyError::InvalidJsonState`] if the stream is not on the opening brace
/// - [`PropertyError::MalformedJson`] if the version is not an integer
/// - [`PropertyError::PropertyVersionNotFound`] if the document has no version
pub fn extract_version<S: TokenStream + ?Sized>(stream: &mut S, kind: ResponseKind) -> Result<i64> {
    if stream.current() != Some(&Token::BeginObject) || stream.depth() != 0 {
        return Err(PropertyError::state(
            "stream must be positioned on the opening brace of the document",
        ));
    }

    match kind {
        ResponseKind::DocumentGet => {
            if !find_member(stream, DESIRED_SECTION)? {
                return Err(PropertyError::PropertyVersionNotFound);
            }
            stream.advance()?;
            if stream.current() != Some(&Token::BeginObject) {
                return Err(PropertyError::MalformedJson(format!(
                    "`{DESIRED_SECTION}` section is not an object"
                )));
            }
            version_in_object(stream)
        }
        ResponseKind::DesiredPatch | ResponseKind::ReportedAck => version_in_object(stream),
    }
}

fn version_in_object<S: TokenStream + ?Sized>(stream: &mut S) -> Result<i64> {
    if !find_member(stream, VERSION_KEY)? {
        return Err(PropertyError::PropertyVersionNotFound);
    }
    stream.advance()?;

    let version = match stream.current() {
        Some(Token::Number(number)) => number.as_i64(),
        _ => None,
    }
    .ok_or_else(|| PropertyError::MalformedJson(format!("`{VERSION_KEY}` is not an integer")))?;

    tracing::trace!(version, "Found document version");
    Ok(version)
}

/// From an opening brace, scan the object's direct members for `key`.
/// Leaves the stream on the key when found, on the closing brace otherwise.
fn find_member<S: TokenStream + ?Sized>(stream: &mut S, key: &str) -> Result<bool> {
    let depth = stream.depth() + 1;
    stream.advance()?;
    loop {
        match stream.current() {
            Some(Token::PropertyName(name)) if stream.depth() == depth => {
                if name == key {
                    return Ok(true);
                }
                stream.advance()?;
                stream.skip_value()?;
                stream.advance()?;
            }
            Some(Token::EndObject) if stream.depth() + 1 == depth => return Ok(false),
            _ => return Err(PropertyError::state("unexpected token while scanning an object")),
        }
    }
}
