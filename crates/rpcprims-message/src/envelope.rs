//! JSON-RPC 2.0 envelope shapes.

use serde_json::Value;

use crate::field::{build_object, Field};
use crate::message::Message;
use crate::parse::{parse_object, Slot};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";

/// The `error` member of an Error envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFault {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RemoteFault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    fn into_field(self) -> Field {
        let mut entries = vec![
            ("code".to_string(), Field::Int64(self.code)),
            ("message".to_string(), Field::Str(self.message)),
        ];
        if let Some(data) = self.data {
            entries.push(("data".to_string(), Field::Variant(data)));
        }
        Field::Object(entries)
    }
}

/// A recognized message shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// An incoming request. The id is echoed back verbatim in the reply.
    Call {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    /// A successful reply. `id` is `None` when the peer sent a non-integer id.
    Result { id: Option<i64>, result: Value },
    /// A failed reply. `id` is `None` when absent, null, or not an integer.
    Error { id: Option<i64>, fault: RemoteFault },
}

impl Envelope {
    /// Recognize the shape of `message`.
    ///
    /// Returns `None` for anything that is not a well-formed JSON-RPC 2.0
    /// envelope, including a Call without a string method.
    pub fn classify(message: &Message) -> Option<Envelope> {
        if !message.parse(&mut [("jsonrpc", Slot::Equals(JSONRPC_VERSION))]) {
            return None;
        }

        let id = message.get("id");
        let method = message.get("method").and_then(Value::as_str);
        let params = || message.get("params").cloned().unwrap_or(Value::Null);

        match (id, method) {
            (None, Some(method)) if !method.is_empty() => {
                return Some(Envelope::Notification {
                    method: method.to_string(),
                    params: params(),
                });
            }
            (None, _) => return None,
            _ => {}
        }

        if let Some(result) = message.get("result") {
            return Some(Envelope::Result {
                id: id.and_then(Value::as_i64),
                result: result.clone(),
            });
        }

        if let (Some(id), Some(method)) = (id, method) {
            if method.is_empty() {
                return None;
            }
            return Some(Envelope::Call {
                id: id.clone(),
                method: method.to_string(),
                params: params(),
            });
        }

        let error = message.get("error")?.as_object()?;
        let mut code = 0i64;
        if !parse_object(error, &mut [("code", Slot::Int64(&mut code))]) {
            return None;
        }
        let text = match error.get("message") {
            None | Some(Value::Null) => DEFAULT_ERROR_MESSAGE.to_string(),
            Some(Value::String(text)) => text.clone(),
            Some(_) => return None,
        };

        Some(Envelope::Error {
            id: id.and_then(Value::as_i64),
            fault: RemoteFault {
                code,
                message: text,
                data: error.get("data").cloned(),
            },
        })
    }

    /// Build the wire message for this envelope.
    pub fn into_message(self) -> Message {
        match self {
            Envelope::Call { id, method, params } => build_object([
                ("jsonrpc", Field::from(JSONRPC_VERSION)),
                ("id", Field::Variant(id)),
                ("method", Field::Str(method)),
                ("params", Field::Variant(params)),
            ]),
            Envelope::Notification { method, params } => build_object([
                ("jsonrpc", Field::from(JSONRPC_VERSION)),
                ("method", Field::Str(method)),
                ("params", Field::Variant(params)),
            ]),
            Envelope::Result { id, result } => build_object([
                ("jsonrpc", Field::from(JSONRPC_VERSION)),
                ("id", Field::from(id)),
                ("result", Field::Variant(result)),
            ]),
            Envelope::Error { id, fault } => build_object([
                ("jsonrpc", Field::from(JSONRPC_VERSION)),
                ("id", Field::from(id)),
                ("error", fault.into_field()),
            ]),
        }
    }
}

/// Build a Call envelope with an integer correlation id.
pub fn call(id: i64, method: &str, params: Value) -> Message {
    Envelope::Call {
        id: Value::from(id),
        method: method.to_string(),
        params,
    }
    .into_message()
}

/// Build a Notification envelope.
pub fn notification(method: &str, params: Value) -> Message {
    Envelope::Notification {
        method: method.to_string(),
        params,
    }
    .into_message()
}

/// Build a Result envelope replying to `id`, which is echoed verbatim.
pub fn result(id: Value, result: Value) -> Message {
    build_object([
        ("jsonrpc", Field::from(JSONRPC_VERSION)),
        ("id", Field::Variant(id)),
        ("result", Field::Variant(result)),
    ])
}

/// Build an Error envelope replying to `id`, which is echoed verbatim.
pub fn error(id: Value, fault: RemoteFault) -> Message {
    build_object([
        ("jsonrpc", Field::from(JSONRPC_VERSION)),
        ("id", Field::Variant(id)),
        ("error", fault.into_field()),
    ])
}
