//! JSON-RPC 2.0 message codec.
//!
//! A [`Message`] is a string-keyed structured value. This crate provides:
//! - [`Field`], a typed builder for messages and nested values
//! - [`Slot`], the symmetric typed parser with equality slots for protocol tags
//! - [`Envelope`], recognition and construction of call/result/error/notification shapes
//! - [`Encoding`], text (JSON) and binary (CBOR) body encodings
//! - [`TypeDescriptor`], the type grammar carried in binary frame headers

pub mod descriptor;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod field;
pub mod message;
pub mod parse;

pub use descriptor::TypeDescriptor;
pub use encoding::Encoding;
pub use envelope::{
    Envelope, RemoteFault, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
pub use error::{MessageError, Result};
pub use field::{build_array, build_object, Field};
pub use message::Message;
pub use parse::{parse_array, parse_object, Slot};

/// Re-exported so callers can build params without a direct `serde_json` dependency.
pub use serde_json::{json, Map, Value};
