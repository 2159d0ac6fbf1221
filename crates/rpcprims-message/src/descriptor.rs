//! Type descriptors carried in the `X-Encoding-Type` header of binary frames.
//!
//! Grammar:
//!
//! ```text
//! T := 's'          string
//!    | 'i'          32-bit integer
//!    | 'x'          64-bit integer
//!    | 'b'          boolean
//!    | 'd'          double (any number)
//!    | 'v'          any value
//!    | 'm' T        T or null
//!    | 'a' T        array of T
//!    | 'a{s' T '}'  object with string keys and values of T
//! ```

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{MessageError, Result};

/// Nesting deeper than this is rejected to bound recursion on untrusted headers.
const MAX_DEPTH: usize = 32;

/// A parsed type descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    String,
    Int32,
    Int64,
    Bool,
    Double,
    Variant,
    Maybe(Box<TypeDescriptor>),
    Array(Box<TypeDescriptor>),
    Dict(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    /// The descriptor every outgoing message is described with: `a{sv}`.
    pub fn message() -> Self {
        TypeDescriptor::Dict(Box::new(TypeDescriptor::Variant))
    }

    /// Parse a complete descriptor string.
    pub fn parse(input: &str) -> Result<Self> {
        let bytes = input.as_bytes();
        let (descriptor, rest) = parse_one(bytes, 0).map_err(|reason| invalid(input, reason))?;
        if !rest.is_empty() {
            return Err(invalid(input, "trailing characters"));
        }
        Ok(descriptor)
    }

    /// Whether `value` has the shape this descriptor declares.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            TypeDescriptor::String => value.is_string(),
            TypeDescriptor::Int32 => value
                .as_i64()
                .is_some_and(|n| i32::try_from(n).is_ok()),
            TypeDescriptor::Int64 => value.as_i64().is_some(),
            TypeDescriptor::Bool => value.is_boolean(),
            TypeDescriptor::Double => value.is_number(),
            TypeDescriptor::Variant => true,
            TypeDescriptor::Maybe(inner) => value.is_null() || inner.matches(value),
            TypeDescriptor::Array(inner) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|item| inner.matches(item))),
            TypeDescriptor::Dict(inner) => value
                .as_object()
                .is_some_and(|map| map.values().all(|item| inner.matches(item))),
        }
    }
}

fn invalid(input: &str, reason: &'static str) -> MessageError {
    MessageError::InvalidDescriptor {
        descriptor: input.to_string(),
        reason,
    }
}

fn parse_one(input: &[u8], depth: usize) -> std::result::Result<(TypeDescriptor, &[u8]), &'static str> {
    if depth > MAX_DEPTH {
        return Err("nesting too deep");
    }
    let (&tag, rest) = input.split_first().ok_or("unexpected end of descriptor")?;
    match tag {
        b's' => Ok((TypeDescriptor::String, rest)),
        b'i' => Ok((TypeDescriptor::Int32, rest)),
        b'x' => Ok((TypeDescriptor::Int64, rest)),
        b'b' => Ok((TypeDescriptor::Bool, rest)),
        b'd' => Ok((TypeDescriptor::Double, rest)),
        b'v' => Ok((TypeDescriptor::Variant, rest)),
        b'm' => {
            let (inner, rest) = parse_one(rest, depth + 1)?;
            Ok((TypeDescriptor::Maybe(Box::new(inner)), rest))
        }
        b'a' => {
            if let Some(entry) = rest.strip_prefix(b"{") {
                let entry = entry.strip_prefix(b"s").ok_or("dictionary keys must be strings")?;
                let (inner, rest) = parse_one(entry, depth + 1)?;
                let rest = rest.strip_prefix(b"}").ok_or("unterminated dictionary entry")?;
                Ok((TypeDescriptor::Dict(Box::new(inner)), rest))
            } else {
                let (inner, rest) = parse_one(rest, depth + 1)?;
                Ok((TypeDescriptor::Array(Box::new(inner)), rest))
            }
        }
        _ => Err("unknown type tag"),
    }
}

impl FromStr for TypeDescriptor {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::String => f.write_str("s"),
            TypeDescriptor::Int32 => f.write_str("i"),
            TypeDescriptor::Int64 => f.write_str("x"),
            TypeDescriptor::Bool => f.write_str("b"),
            TypeDescriptor::Double => f.write_str("d"),
            TypeDescriptor::Variant => f.write_str("v"),
            TypeDescriptor::Maybe(inner) => write!(f, "m{inner}"),
            TypeDescriptor::Array(inner) => write!(f, "a{inner}"),
            TypeDescriptor::Dict(inner) => write!(f, "a{{s{inner}}}"),
        }
    }
}
