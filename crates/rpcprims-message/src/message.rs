use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MessageError;

/// A structured message: a string-keyed object.
///
/// Messages are built with [`crate::build_object`] or the envelope
/// constructors, and parsed with [`Message::parse`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert a raw value, returning the previous value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Message {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Self {
        Value::Object(message.0)
    }
}

impl TryFrom<Value> for Message {
    type Error = MessageError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(MessageError::NotAnObject(value_kind(&other))),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("<unprintable message>"),
        }
    }
}

/// Short name of a value's JSON kind, for diagnostics.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn try_from_rejects_non_objects() {
        let err = Message::try_from(json!([1, 2])).unwrap_err();
        assert!(matches!(err, MessageError::NotAnObject("array")));
    }

    #[test]
    fn display_is_compact_json() {
        let message = Message::try_from(json!({"a": 1})).unwrap();
        assert_eq!(message.to_string(), r#"{"a":1}"#);
    }

    #[test]
    fn serde_is_transparent() {
        let message: Message = serde_json::from_str(r#"{"k":"v"}"#).unwrap();
        assert_eq!(message.get("k"), Some(&json!("v")));
        assert_eq!(serde_json::to_string(&message).unwrap(), r#"{"k":"v"}"#);
    }
}
