use serde_json::{Map, Number, Value};

use crate::message::Message;

/// A typed field descriptor used to build messages.
///
/// Nested objects and arrays own their children, so a complete message is
/// described by a single tree of fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Str(String),
    StrList(Vec<String>),
    Int32(i32),
    Int64(i64),
    Bool(bool),
    /// Non-finite doubles have no JSON form and are stored as null.
    Double(f64),
    Object(Vec<(String, Field)>),
    Array(Vec<Field>),
    /// An opaque value inserted as-is.
    Variant(Value),
    Null,
}

impl Field {
    /// Build a nested object field from `(key, field)` pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Field)>,
    {
        Field::Object(
            entries
                .into_iter()
                .map(|(key, field)| (key.into(), field))
                .collect(),
        )
    }

    /// Build a nested array field.
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Field>,
    {
        Field::Array(items.into_iter().collect())
    }

    /// Convert the descriptor tree into a structured value.
    pub fn into_value(self) -> Value {
        match self {
            Field::Str(s) => Value::String(s),
            Field::StrList(list) => Value::Array(list.into_iter().map(Value::String).collect()),
            Field::Int32(n) => Value::Number(Number::from(n)),
            Field::Int64(n) => Value::Number(Number::from(n)),
            Field::Bool(b) => Value::Bool(b),
            Field::Double(d) => Number::from_f64(d).map_or(Value::Null, Value::Number),
            Field::Object(entries) => Value::Object(object_map(entries)),
            Field::Array(items) => Value::Array(items.into_iter().map(Field::into_value).collect()),
            Field::Variant(value) => value,
            Field::Null => Value::Null,
        }
    }
}

fn object_map(entries: Vec<(String, Field)>) -> Map<String, Value> {
    let mut map = Map::with_capacity(entries.len());
    for (key, field) in entries {
        map.insert(key, field.into_value());
    }
    map
}

/// Build a message from an ordered list of `(key, field)` pairs.
///
/// Later duplicates of a key replace earlier ones.
pub fn build_object<K, I>(fields: I) -> Message
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Field)>,
{
    let mut message = Message::new();
    for (key, field) in fields {
        message.insert(key, field.into_value());
    }
    message
}

/// Build a positional array value.
pub fn build_array<I>(items: I) -> Value
where
    I: IntoIterator<Item = Field>,
{
    Value::Array(items.into_iter().map(Field::into_value).collect())
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Str(s.to_string())
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Field::Str(s)
    }
}

impl From<Vec<String>> for Field {
    fn from(list: Vec<String>) -> Self {
        Field::StrList(list)
    }
}

impl From<i32> for Field {
    fn from(n: i32) -> Self {
        Field::Int32(n)
    }
}

impl From<i64> for Field {
    fn from(n: i64) -> Self {
        Field::Int64(n)
    }
}

impl From<bool> for Field {
    fn from(b: bool) -> Self {
        Field::Bool(b)
    }
}

impl From<f64> for Field {
    fn from(d: f64) -> Self {
        Field::Double(d)
    }
}

impl From<Value> for Field {
    fn from(value: Value) -> Self {
        Field::Variant(value)
    }
}

impl<T: Into<Field>> From<Option<T>> for Field {
    fn from(value: Option<T>) -> Self {
        value.map_or(Field::Null, Into::into)
    }
}
