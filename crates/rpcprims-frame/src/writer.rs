use futures_util::SinkExt;
use rpcprims_message::{Encoding, Message};
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;
use tracing::debug;

use crate::codec::{FrameConfig, RpcCodec};
use crate::error::Result;

/// Writes frames to an async byte stream.
///
/// Each frame's header and body are buffered together and written in full
/// before [`FrameWriter::write_message`] returns.
pub struct FrameWriter<W> {
    inner: FramedWrite<W, RpcCodec>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with custom configuration.
    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            inner: FramedWrite::new(inner, RpcCodec::new(config)),
        }
    }

    /// Encode and write one message, then flush.
    pub async fn write_message(&mut self, message: Message, encoding: Encoding) -> Result<()> {
        if self.config().trace_messages {
            debug!(%encoding, %message, ">>> frame");
        }
        self.inner.send((message, encoding)).await
    }

    /// Flush buffered bytes and shut down the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.close().await
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    /// Get a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        self.inner.get_mut()
    }

    /// Consume the frame writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }

    /// Update the maximum body size accepted for writing.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.inner.encoder_mut().config_mut().max_frame_size = max_frame_size;
    }

    pub fn config(&self) -> &FrameConfig {
        self.inner.encoder().config()
    }
}
