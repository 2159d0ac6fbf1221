use std::io;
use std::sync::Arc;

use rpcprims_frame::FrameError;
use rpcprims_message::{RemoteFault, INTERNAL_ERROR, METHOD_NOT_FOUND};
use rpcprims_transport::TransportError;
use serde_json::Value;

/// Errors surfaced by client and server operations.
///
/// Cloneable so a single connection failure can complete every pending call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// The peer violated the framing or envelope protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer answered the call with an error.
    #[error("{message} ({code})")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// No handler matched an incoming call.
    #[error("method not found: {0}")]
    NotFound(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The client has failed or been closed.
    #[error("no stream available to deliver invocation")]
    NotConnected,

    /// The client was closed while the operation was pending.
    #[error("the underlying stream was closed")]
    Closed,
}

impl RpcError {
    /// The JSON-RPC error code, for remote errors.
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The error object to send back to a peer for this error.
    pub fn to_fault(&self) -> RemoteFault {
        match self {
            RpcError::Remote {
                code,
                message,
                data,
            } => RemoteFault {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            },
            RpcError::NotFound(_) => {
                RemoteFault::new(METHOD_NOT_FOUND, "The method does not exist or is not available")
            }
            other => RemoteFault::new(INTERNAL_ERROR, other.to_string()),
        }
    }

    fn eof(err: &FrameError) -> Self {
        RpcError::Io(Arc::new(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            err.to_string(),
        )))
    }
}

impl From<RemoteFault> for RpcError {
    fn from(fault: RemoteFault) -> Self {
        RpcError::Remote {
            code: fault.code,
            message: fault.message,
            data: fault.data,
        }
    }
}

impl From<io::Error> for RpcError {
    fn from(err: io::Error) -> Self {
        RpcError::Io(Arc::new(err))
    }
}

impl From<FrameError> for RpcError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(err) => RpcError::Io(Arc::new(err)),
            other => RpcError::from(&other),
        }
    }
}

impl From<&FrameError> for RpcError {
    fn from(err: &FrameError) -> Self {
        match err {
            FrameError::Io(err) => RpcError::Io(Arc::new(io::Error::new(err.kind(), err.to_string()))),
            FrameError::ConnectionClosed
            | FrameError::IncompleteHeader
            | FrameError::Truncated { .. } => RpcError::eof(err),
            FrameError::QueueAborted => RpcError::Io(Arc::new(io::Error::other(err.to_string()))),
            FrameError::WriterClosed => RpcError::NotConnected,
            other => RpcError::Protocol(other.to_string()),
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(err) => RpcError::Io(Arc::new(err)),
            other => {
                let kind = match &other {
                    TransportError::Bind { source, .. }
                    | TransportError::Connect { source, .. }
                    | TransportError::Accept(source) => source.kind(),
                    _ => io::ErrorKind::InvalidInput,
                };
                RpcError::Io(Arc::new(io::Error::new(kind, other.to_string())))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
