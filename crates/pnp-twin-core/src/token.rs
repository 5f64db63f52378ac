//! Read-once JSON token streams.
//!
//! A [`TokenStream`] exposes one token at a time together with its nesting
//! depth. Depth counts the containers enclosing a token: the root object's
//! braces sit at depth 0, its property names and their values at depth 1,
//! and so on. A stream cannot be rewound; a second pass over the same
//! document needs a second stream constructed over the same bytes.

use crate::error::{PropertyError, Result};
use serde_json::{Map, Number, Value};

/// A single JSON token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `{`
    BeginObject,
    /// `}`
    EndObject,
    /// `[`
    BeginArray,
    /// `]`
    EndArray,
    /// Object key
    PropertyName(String),
    /// String value
    String(String),
    /// Numeric value
    Number(Number),
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
}

impl Token {
    /// Returns the key if this token is a property name.
    #[must_use]
    pub fn as_property_name(&self) -> Option<&str> {
        match self {
            Self::PropertyName(name) => Some(name),
            _ => None,
        }
    }

    /// Whether this token is the property name `name`.
    #[must_use]
    pub fn is_property_name(&self, name: &str) -> bool {
        self.as_property_name() == Some(name)
    }

    /// Whether this token is the string value `text`.
    #[must_use]
    pub fn is_string(&self, text: &str) -> bool {
        matches!(self, Self::String(value) if value == text)
    }
}

/// Forward-only token cursor over one JSON document.
pub trait TokenStream {
    /// Token under the cursor, `None` before the first [`advance`](Self::advance).
    fn current(&self) -> Option<&Token>;

    /// Nesting depth of the current token.
    fn depth(&self) -> usize;

    /// Move to the next token.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::InvalidJsonState`] when the document has no tokens left.
    fn advance(&mut self) -> Result<()>;

    /// Look `offset` tokens ahead without moving; `peek(0)` is the current token.
    fn peek(&self, offset: usize) -> Option<&Token>;

    /// If the current token opens an object or array, move to its closing token.
    /// Scalars are left in place.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::InvalidJsonState`] if there is no current token or
    /// the container is never closed.
    fn skip_value(&mut self) -> Result<()> {
        match self.current() {
            Some(Token::BeginObject | Token::BeginArray) => {}
            Some(_) => return Ok(()),
            None => return Err(PropertyError::state("no current token to skip")),
        }

        let depth = self.depth();
        loop {
            self.advance()?;
            if matches!(self.current(), Some(Token::EndObject | Token::EndArray))
                && self.depth() == depth
            {
                return Ok(());
            }
        }
    }
}

impl<S: TokenStream + ?Sized> TokenStream for &mut S {
    fn current(&self) -> Option<&Token> {
        (**self).current()
    }

    fn depth(&self) -> usize {
        (**self).depth()
    }

    fn advance(&mut self) -> Result<()> {
        (**self).advance()
    }

    fn peek(&self, offset: usize) -> Option<&Token> {
        (**self).peek(offset)
    }

    fn skip_value(&mut self) -> Result<()> {
        (**self).skip_value()
    }
}

/// In-memory token stream over a parsed document.
///
/// Tokens keep document order, so a property document walks exactly as it
/// arrived on the wire.
#[derive(Debug, Clone)]
pub struct JsonReader {
    tokens: Vec<(Token, usize)>,
    position: Option<usize>,
}

impl JsonReader {
    /// Tokenize a JSON byte buffer. The reader starts before the first token.
    ///
    /// The document is parsed into a [`Value`] first, so a key repeated within
    /// one object collapses to a single member: it keeps the position of its
    /// first occurrence and the value of its last. Such a document yields
    /// fewer properties than it has members.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::MalformedJson`] if `bytes` is not a JSON document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| PropertyError::MalformedJson(e.to_string()))?;
        Ok(Self::from_value(value))
    }

    /// Build a reader over an already parsed value.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let mut tokens = Vec::new();
        flatten(value, 0, &mut tokens);
        Self {
            tokens,
            position: None,
        }
    }

    /// Number of tokens in the document.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the document produced no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenStream for JsonReader {
    fn current(&self) -> Option<&Token> {
        self.position
            .and_then(|index| self.tokens.get(index))
            .map(|(token, _)| token)
    }

    fn depth(&self) -> usize {
        self.position
            .and_then(|index| self.tokens.get(index))
            .map_or(0, |(_, depth)| *depth)
    }

    fn advance(&mut self) -> Result<()> {
        let next = self.position.map_or(0, |index| index + 1);
        if next >= self.tokens.len() {
            return Err(PropertyError::state("no tokens left in document"));
        }
        self.position = Some(next);
        Ok(())
    }

    fn peek(&self, offset: usize) -> Option<&Token> {
        let index = match self.position {
            Some(index) => index + offset,
            None => offset.checked_sub(1)?,
        };
        self.tokens.get(index).map(|(token, _)| token)
    }
}

fn flatten(value: Value, depth: usize, out: &mut Vec<(Token, usize)>) {
    match value {
        Value::Object(map) => {
            out.push((Token::BeginObject, depth));
            for (name, child) in map {
                out.push((Token::PropertyName(name), depth + 1));
                flatten(child, depth + 1, out);
            }
            out.push((Token::EndObject, depth));
        }
        Value::Array(items) => {
            out.push((Token::BeginArray, depth));
            for child in items {
                flatten(child, depth + 1, out);
            }
            out.push((Token::EndArray, depth));
        }
        Value::String(text) => out.push((Token::String(text), depth)),
        Value::Number(number) => out.push((Token::Number(number), depth)),
        Value::Bool(flag) => out.push((Token::Bool(flag), depth)),
        Value::Null => out.push((Token::Null, depth)),
    }
}

/// Rebuild the value that starts at the current token.
///
/// On return the stream sits on the value's last token (the scalar itself,
/// or the closing brace/bracket of a container).
///
/// # Errors
///
/// Returns [`PropertyError::InvalidJsonState`] if the current token does not
/// start a value.
pub fn read_value<S: TokenStream + ?Sized>(stream: &mut S) -> Result<Value> {
    let token = stream
        .current()
        .cloned()
        .ok_or_else(|| PropertyError::state("no current token to read"))?;

    match token {
        Token::String(text) => Ok(Value::String(text)),
        Token::Number(number) => Ok(Value::Number(number)),
        Token::Bool(flag) => Ok(Value::Bool(flag)),
        Token::Null => Ok(Value::Null),
        Token::BeginObject => {
            let mut map = Map::new();
            loop {
                stream.advance()?;
                match stream.current() {
                    Some(Token::EndObject) => return Ok(Value::Object(map)),
                    Some(Token::PropertyName(name)) => {
                        let name = name.clone();
                        stream.advance()?;
                        let child = read_value(stream)?;
                        map.insert(name, child);
                    }
                    _ => {
                        return Err(PropertyError::state(
                            "expected a property name inside an object",
                        ))
                    }
                }
            }
        }
        Token::BeginArray => {
            let mut items = Vec::new();
            loop {
                stream.advance()?;
                if matches!(stream.current(), Some(Token::EndArray)) {
                    return Ok(Value::Array(items));
                }
                items.push(read_value(stream)?);
            }
        }
        Token::EndObject | Token::EndArray | Token::PropertyName(_) => Err(PropertyError::state(
            "current token does not start a value",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repeated_keys_collapse_to_one_member() {
        let mut reader = JsonReader::from_slice(br#"{"a":1,"b":2,"a":3}"#).unwrap();
        let mut names = Vec::new();
        while reader.advance().is_ok() {
            if let Some(Token::PropertyName(name)) = reader.current() {
                names.push(name.clone());
                reader.advance().unwrap();
                names.push(read_value(&mut reader).unwrap().to_string());
            }
        }

        assert_eq!(names, vec!["a", "3", "b", "2"]);
    }

    #[test]
    fn tokens_follow_document_order() {
        let mut reader = JsonReader::from_slice(br#"{"b":1,"a":[true,null]}"#).unwrap();
        let mut seen = Vec::new();
        while reader.advance().is_ok() {
            seen.push((reader.current().cloned().unwrap(), reader.depth()));
        }

        assert_eq!(
            seen,
            vec![
                (Token::BeginObject, 0),
                (Token::PropertyName("b".to_string()), 1),
                (Token::Number(1.into()), 1),
                (Token::PropertyName("a".to_string()), 1),
                (Token::BeginArray, 1),
                (Token::Bool(true), 2),
                (Token::Null, 2),
                (Token::EndArray, 1),
                (Token::EndObject, 0),
            ]
        );
    }

    #[test]
    fn reader_starts_before_first_token() {
        let reader = JsonReader::from_slice(b"{}").unwrap();
        assert!(reader.current().is_none());
        assert_eq!(reader.peek(1), Some(&Token::BeginObject));
        assert_eq!(reader.peek(0), None);
    }

    #[test]
    fn advancing_past_end_is_a_state_error() {
        let mut reader = JsonReader::from_slice(b"{}").unwrap();
        reader.advance().unwrap();
        reader.advance().unwrap();
        assert!(matches!(
            reader.advance(),
            Err(PropertyError::InvalidJsonState(_))
        ));
    }

    #[test]
    fn malformed_document_is_rejected() {
        assert!(matches!(
            JsonReader::from_slice(b"{\"a\":"),
            Err(PropertyError::MalformedJson(_))
        ));
    }

    #[test]
    fn skip_value_lands_on_matching_close() {
        let mut reader =
            JsonReader::from_slice(br#"{"a":{"b":{"c":[1,{"d":2}]}},"next":3}"#).unwrap();
        reader.advance().unwrap(); // {
        reader.advance().unwrap(); // "a"
        reader.advance().unwrap(); // {
        reader.skip_value().unwrap();
        assert_eq!(reader.current(), Some(&Token::EndObject));
        assert_eq!(reader.depth(), 1);

        reader.advance().unwrap();
        assert!(reader.current().unwrap().is_property_name("next"));
    }

    #[test]
    fn skip_value_leaves_scalars_in_place() {
        let mut reader = JsonReader::from_slice(br#"{"a":5}"#).unwrap();
        reader.advance().unwrap();
        reader.advance().unwrap();
        reader.advance().unwrap();
        reader.skip_value().unwrap();
        assert_eq!(reader.current(), Some(&Token::Number(5.into())));
    }

    #[test]
    fn read_value_rebuilds_nested_structures() {
        let document = json!({"outer": {"list": [1, "two", {"three": 3.5}], "flag": false}});
        let mut reader = JsonReader::from_value(document.clone());
        reader.advance().unwrap();

        let value = read_value(&mut reader).unwrap();
        assert_eq!(value, document);
        assert_eq!(reader.current(), Some(&Token::EndObject));
        assert_eq!(reader.depth(), 0);
    }

    #[test]
    fn read_value_rejects_property_name() {
        let mut reader = JsonReader::from_slice(br#"{"a":1}"#).unwrap();
        reader.advance().unwrap();
        reader.advance().unwrap();
        assert!(matches!(
            read_value(&mut reader),
            Err(PropertyError::InvalidJsonState(_))
        ));
    }
}
