use rpcprims_message::MessageError;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header block ended without a `Content-Length` header.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// The `Content-Length` value is not a positive integer.
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// The body exceeds the configured maximum frame size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// No blank line was found within the header size limit.
    #[error("header block exceeds {max} bytes")]
    HeaderTooLarge { max: usize },

    /// A header line is not `Name: value` text.
    #[error("invalid header line: {0:?}")]
    InvalidHeader(String),

    /// The body could not be encoded or decoded.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended cleanly between frames.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended inside a header block.
    #[error("connection closed (incomplete header)")]
    IncompleteHeader,

    /// The stream ended before the declared body length was read.
    #[error("connection closed (read {received} of {expected} body bytes)")]
    Truncated { expected: usize, received: usize },

    /// The write queue is no longer accepting frames.
    #[error("frame writer is closed")]
    WriterClosed,

    /// A queued write was discarded because an earlier write failed.
    #[error("write aborted due to an earlier stream failure")]
    QueueAborted,
}

impl FrameError {
    /// Whether a failed write left the underlying stream unusable.
    ///
    /// Encoding failures are detected before any byte is written and only
    /// affect the frame that caused them.
    pub fn is_stream_failure(&self) -> bool {
        !matches!(
            self,
            FrameError::Message(_) | FrameError::FrameTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
