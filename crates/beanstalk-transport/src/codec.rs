//! Envelope codecs.
//!
//! A codec converts between an [`Envelope`] and its structured JSON form. The
//! transport owns the step from structure to wire bytes, so codecs never see
//! raw job bodies.

use crate::envelope::{Envelope, HeaderStamp, Stamp};
use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

/// Converts envelopes to and from their structured representation
pub trait EnvelopeCodec: Send + Sync {
    /// Application message type carried by the envelopes
    type Message;

    /// Build an envelope from an already-parsed structure
    fn decode(&self, encoded: Value) -> Result<Envelope<Self::Message>, CodecError>;

    /// Produce the structured representation of an envelope
    fn encode(&self, envelope: &Envelope<Self::Message>) -> Result<Value, CodecError>;
}

const BODY_FIELD: &str = "body";
const HEADERS_FIELD: &str = "headers";

/// JSON codec for serde-serializable messages
///
/// Encoded form:
///
/// ```json
/// { "body": <message>, "headers": [ { "name": "...", "value": "..." } ] }
/// ```
///
/// Only [`HeaderStamp`]s are persisted. Non-sendable stamps, such as the
/// transport id stamp, never leave the process.
pub struct JsonCodec<M> {
    _message: PhantomData<fn() -> M>,
}

impl<M> JsonCodec<M> {
    /// Create new JSON codec
    pub fn new() -> Self {
        Self {
            _message: PhantomData,
        }
    }
}

impl<M> Default for JsonCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for JsonCodec<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<M> std::fmt::Debug for JsonCodec<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonCodec").finish()
    }
}

impl<M> EnvelopeCodec for JsonCodec<M>
where
    M: Serialize + DeserializeOwned,
{
    type Message = M;

    fn decode(&self, encoded: Value) -> Result<Envelope<M>, CodecError> {
        let Value::Object(mut fields) = encoded else {
            return Err(CodecError::InvalidField {
                field: "$".to_string(),
                message: "expected a JSON object".to_string(),
            });
        };

        let body = fields
            .remove(BODY_FIELD)
            .ok_or_else(|| CodecError::MissingField {
                field: BODY_FIELD.to_string(),
            })?;
        let message: M = serde_json::from_value(body)?;

        let headers = match fields.remove(HEADERS_FIELD) {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => decode_headers(value)?,
        };

        Ok(Envelope::with_stamps(
            message,
            headers
                .into_iter()
                .map(|header| Arc::new(header) as Arc<dyn Stamp>),
        ))
    }

    fn encode(&self, envelope: &Envelope<M>) -> Result<Value, CodecError> {
        let body = serde_json::to_value(envelope.message())?;

        let headers: Vec<Value> = envelope
            .all::<HeaderStamp>()
            .into_iter()
            .map(|header| {
                let mut entry = Map::new();
                entry.insert("name".to_string(), Value::from(header.name()));
                entry.insert("value".to_string(), Value::from(header.value()));
                Value::Object(entry)
            })
            .collect();

        let mut encoded = Map::new();
        encoded.insert(BODY_FIELD.to_string(), body);
        encoded.insert(HEADERS_FIELD.to_string(), Value::Array(headers));
        Ok(Value::Object(encoded))
    }
}

fn decode_headers(value: Value) -> Result<Vec<HeaderStamp>, CodecError> {
    let Value::Array(entries) = value else {
        return Err(CodecError::InvalidField {
            field: HEADERS_FIELD.to_string(),
            message: "expected an array".to_string(),
        });
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let name = entry.get("name").and_then(Value::as_str);
            let value = entry.get("value").and_then(Value::as_str);
            match (name, value) {
                (Some(name), Some(value)) => Ok(HeaderStamp::new(name, value)),
                _ => Err(CodecError::InvalidField {
                    field: format!("{}[{}]", HEADERS_FIELD, index),
                    message: "expected string 'name' and 'value'".to_string(),
                }),
            }
        })
        .collect()
}
