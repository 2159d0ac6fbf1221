use std::path::PathBuf;

/// Failures while opening or accepting a local socket for an RPC peer.
///
/// Once a stream is established, framing and protocol errors are reported
/// by the layers above; only raw stream I/O surfaces here as [`Io`].
///
/// [`Io`]: TransportError::Io
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener socket could not be created at `path`, usually because
    /// the directory is missing or another server already owns the file.
    #[error("cannot listen on {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No server answered at `path`.
    #[error("cannot reach server at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("accepting client failed: {0}")]
    Accept(std::io::Error),

    /// Reading from or writing to an established duplex stream failed.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `sun_path` cannot hold the socket path.
    #[error("socket path is {len} bytes, limit is {max}: {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
