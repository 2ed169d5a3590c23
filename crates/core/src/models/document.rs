use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::CoreError;

/// Body of a stored document: a JSON object.
pub type Fields = Map<String, Value>;

/// A document as returned by a [`DocumentStore`](crate::providers::traits::DocumentStore).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Id within its collection
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Look up a dotted field path (`owner.uid`) through nested maps.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&Value> {
        lookup(&self.fields, path)
    }

    /// Decode the body into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            CoreError::Deserialization(format!("Malformed document '{}': {e}", self.id))
        })
    }
}

/// Resolve a dotted field path against a document body.
#[must_use]
pub fn lookup<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Encode a typed record as a document body. The record must serialize to
/// a JSON object.
pub fn to_fields<T: Serialize>(record: &T) -> Result<Fields, CoreError> {
    match serde_json::to_value(record)
        .map_err(|e| CoreError::Serialization(format!("Failed to encode document: {e}")))?
    {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::Serialization(format!(
            "Document body must be an object, got {other}"
        ))),
    }
}
