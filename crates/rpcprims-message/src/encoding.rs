use std::fmt;

use bytes::Bytes;
use serde_json::Value;

use crate::descriptor::TypeDescriptor;
use crate::error::{MessageError, Result};
use crate::message::Message;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_BINARY: &str = "application/binary";

/// Body encoding of a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// JSON text.
    #[default]
    Text,
    /// CBOR, announced with `Content-Type: application/binary`.
    Binary,
}

impl Encoding {
    pub fn content_type(self) -> &'static str {
        match self {
            Encoding::Text => CONTENT_TYPE_JSON,
            Encoding::Binary => CONTENT_TYPE_BINARY,
        }
    }

    /// Select the encoding announced by a `Content-Type` header value.
    ///
    /// Only the binary marker is significant; every other media type
    /// (including parameters such as `charset`) is treated as JSON text.
    pub fn from_content_type(value: &str) -> Self {
        if value.to_ascii_lowercase().contains(CONTENT_TYPE_BINARY) {
            Encoding::Binary
        } else {
            Encoding::Text
        }
    }

    /// Serialize `message` into a frame body.
    pub fn encode(self, message: &Message) -> Result<Bytes> {
        match self {
            Encoding::Text => Ok(Bytes::from(serde_json::to_vec(message)?)),
            Encoding::Binary => {
                let mut buf = Vec::new();
                ciborium::into_writer(message, &mut buf)
                    .map_err(|e| MessageError::BinaryEncode(e.to_string()))?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Decode a frame body into a message.
    ///
    /// In binary mode a `descriptor`, when present, must match the decoded value.
    pub fn decode(self, body: &[u8], descriptor: Option<&TypeDescriptor>) -> Result<Message> {
        let value: Value = match self {
            Encoding::Text => serde_json::from_slice(body)?,
            Encoding::Binary => {
                let mut rest = body;
                let value: Value = ciborium::from_reader(&mut rest)
                    .map_err(|e| MessageError::BinaryDecode(e.to_string()))?;
                if !rest.is_empty() {
                    return Err(MessageError::BinaryDecode(format!(
                        "{} trailing bytes after body",
                        rest.len()
                    )));
                }
                if let Some(descriptor) = descriptor {
                    if !descriptor.matches(&value) {
                        return Err(MessageError::DescriptorMismatch(descriptor.to_string()));
                    }
                }
                value
            }
        };
        Message::try_from(value)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Text => f.write_str("text"),
            Encoding::Binary => f.write_str("binary"),
        }
    }
}
