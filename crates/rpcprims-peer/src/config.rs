use std::time::Duration;

use rpcprims_frame::FrameConfig;
use rpcprims_message::Encoding;

/// How long [`crate::Client::close`] waits for queued frames to drain.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Frame size limit and message tracing, shared by the reader and writer.
    pub frame: FrameConfig,
    /// Initial outbound encoding. Default: text.
    ///
    /// A text connection switches to binary after the first binary frame
    /// from the peer and never switches back.
    pub encoding: Encoding,
    /// Upper bound on the flush performed by `close`. When it elapses the
    /// writer is aborted and the client closes anyway.
    pub close_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            encoding: Encoding::default(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Log every frame body at debug level.
    pub fn with_trace_messages(mut self, enabled: bool) -> Self {
        self.frame.trace_messages = enabled;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.frame.max_frame_size = max_frame_size;
        self
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }
}
