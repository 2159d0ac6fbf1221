use futures_util::StreamExt;
use rpcprims_message::{Encoding, Message};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::debug;

use crate::codec::{Frame, FrameConfig, RpcCodec};
use crate::error::{FrameError, Result};

/// Reads frames from an async byte stream.
///
/// Remembers whether any binary frame has been seen on this stream.
pub struct FrameReader<R> {
    inner: FramedRead<R, RpcCodec>,
    seen_binary: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with custom configuration.
    pub fn with_config(inner: R, config: FrameConfig) -> Self {
        Self {
            inner: FramedRead::new(inner, RpcCodec::new(config)),
            seen_binary: false,
        }
    }

    /// Read the next complete frame.
    ///
    /// Cancel-safe: dropping the future loses no buffered bytes. Returns
    /// [`FrameError::ConnectionClosed`] when the stream ends between frames.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let frame = match self.inner.next().await {
            Some(frame) => frame?,
            None => return Err(FrameError::ConnectionClosed),
        };

        if frame.encoding == Encoding::Binary {
            self.seen_binary = true;
        }
        if self.config().trace_messages {
            debug!(
                encoding = %frame.encoding,
                len = frame.body.len(),
                message = %frame.message,
                "<<< frame"
            );
        }
        Ok(frame)
    }

    /// Read the next frame and return only its message.
    pub async fn read_message(&mut self) -> Result<Message> {
        Ok(self.read_frame().await?.message)
    }

    /// Whether a binary frame has ever been read from this stream.
    pub fn has_seen_binary(&self) -> bool {
        self.seen_binary
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    /// Get a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        self.inner.get_mut()
    }

    /// Consume the frame reader and return the underlying reader.
    ///
    /// Bytes buffered past the last returned frame are discarded.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }

    /// Update the maximum accepted body size.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.inner.decoder_mut().config_mut().max_frame_size = max_frame_size;
    }

    pub fn config(&self) -> &FrameConfig {
        self.inner.decoder().config()
    }
}
