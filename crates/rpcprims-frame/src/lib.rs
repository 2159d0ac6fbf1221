//! Header-delimited message framing for JSON-RPC streams.
//!
//! Every message on the wire is a header block followed by a body:
//! - `Content-Length` (required) gives the exact body size
//! - `Content-Type: application/binary` switches the body from JSON to CBOR
//! - `X-Encoding-Type` declares the binary body's type descriptor
//!
//! [`FrameReader`] decodes frames from an [`tokio::io::AsyncRead`];
//! [`WriteQueue`] serializes writes to an [`tokio::io::AsyncWrite`] in FIFO
//! order with exactly one write in flight.

pub mod codec;
pub mod error;
pub mod queue;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, decode_header, encode_frame, Frame, FrameConfig, FrameHeader, RpcCodec,
    DEFAULT_MAX_FRAME_SIZE, MAX_HEADER_BLOCK,
};
pub use error::{FrameError, Result};
pub use queue::{FailureHook, WriteQueue, WriteTicket};
pub use reader::FrameReader;
pub use writer::FrameWriter;
