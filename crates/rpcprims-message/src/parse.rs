use serde_json::{Map, Value};

use crate::message::Message;

/// A typed output slot for [`parse_object`] and [`parse_array`].
///
/// Each slot type-checks the value found at its position and writes it into
/// the borrowed output. [`Slot::Equals`] writes nothing and instead requires
/// the value to be a string equal to the given literal.
#[derive(Debug)]
pub enum Slot<'a> {
    Str(&'a mut String),
    /// A string, or null which yields `None`.
    OptStr(&'a mut Option<String>),
    /// An array of strings. Null yields an empty list.
    StrList(&'a mut Vec<String>),
    Int32(&'a mut i32),
    Int64(&'a mut i64),
    Bool(&'a mut bool),
    /// Any JSON number.
    Double(&'a mut f64),
    /// Capture a nested object.
    Object(&'a mut Map<String, Value>),
    /// Capture a nested array.
    Array(&'a mut Vec<Value>),
    /// Descend into a nested object with its own key/slot list.
    Fields(Vec<(&'a str, Slot<'a>)>),
    /// Descend into a nested array with positional slots.
    Items(Vec<Slot<'a>>),
    /// Capture any value, including null.
    Variant(&'a mut Value),
    Equals(&'a str),
}

/// Parse `object` against an ordered list of `(key, slot)` pairs.
///
/// Returns `false` as soon as any key is missing or any value fails its
/// slot's type check. Slots written before the failing field are left with
/// unspecified contents.
pub fn parse_object(object: &Map<String, Value>, fields: &mut [(&str, Slot<'_>)]) -> bool {
    fields.iter_mut().all(|(key, slot)| match object.get(*key) {
        Some(value) => parse_value(value, slot),
        None => false,
    })
}

/// Parse `items` positionally. Extra trailing items are ignored.
pub fn parse_array(items: &[Value], slots: &mut [Slot<'_>]) -> bool {
    if items.len() < slots.len() {
        return false;
    }
    items
        .iter()
        .zip(slots.iter_mut())
        .all(|(value, slot)| parse_value(value, slot))
}

fn parse_value(value: &Value, slot: &mut Slot<'_>) -> bool {
    match slot {
        Slot::Str(out) => match value.as_str() {
            Some(s) => {
                **out = s.to_string();
                true
            }
            None => false,
        },
        Slot::OptStr(out) => match value {
            Value::String(s) => {
                **out = Some(s.clone());
                true
            }
            Value::Null => {
                **out = None;
                true
            }
            _ => false,
        },
        Slot::StrList(out) => match value {
            Value::Null => {
                out.clear();
                true
            }
            Value::Array(items) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect();
                match strings {
                    Some(strings) => {
                        **out = strings;
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        },
        Slot::Int32(out) => match value.as_i64().and_then(|n| i32::try_from(n).ok()) {
            Some(n) => {
                **out = n;
                true
            }
            None => false,
        },
        Slot::Int64(out) => match value.as_i64() {
            Some(n) => {
                **out = n;
                true
            }
            None => false,
        },
        Slot::Bool(out) => match value.as_bool() {
            Some(b) => {
                **out = b;
                true
            }
            None => false,
        },
        Slot::Double(out) => match value.as_f64() {
            Some(d) => {
                **out = d;
                true
            }
            None => false,
        },
        Slot::Object(out) => match value {
            Value::Object(map) => {
                **out = map.clone();
                true
            }
            _ => false,
        },
        Slot::Array(out) => match value {
            Value::Array(items) => {
                **out = items.clone();
                true
            }
            _ => false,
        },
        Slot::Fields(fields) => match value {
            Value::Object(map) => parse_object(map, fields),
            _ => false,
        },
        Slot::Items(slots) => match value {
            Value::Array(items) => parse_array(items, slots),
            _ => false,
        },
        Slot::Variant(out) => {
            **out = value.clone();
            true
        }
        Slot::Equals(expected) => value.as_str() == Some(*expected),
    }
}

impl Message {
    /// Parse this message against an ordered list of `(key, slot)` pairs.
    ///
    /// See [`parse_object`].
    pub fn parse(&self, fields: &mut [(&str, Slot<'_>)]) -> bool {
        parse_object(self.as_map(), fields)
    }
}
