/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The text body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// The value could not be serialized to the binary encoding.
    #[error("binary encoding failed: {0}")]
    BinaryEncode(String),

    /// The binary body could not be decoded.
    #[error("invalid binary body: {0}")]
    BinaryDecode(String),

    /// The decoded root value is not an object.
    #[error("message root is not an object (found {0})")]
    NotAnObject(&'static str),

    /// The type descriptor does not follow the descriptor grammar.
    #[error("invalid type descriptor {descriptor:?}: {reason}")]
    InvalidDescriptor {
        descriptor: String,
        reason: &'static str,
    },

    /// The decoded value does not have the shape its descriptor declares.
    #[error("message does not match declared type {0}")]
    DescriptorMismatch(String),
}

pub type Result<T> = std::result::Result<T, MessageError>;
