use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional async byte stream that a connection can own.
///
/// Implemented for every `AsyncRead + AsyncWrite` type that can move to a
/// background task: `tokio::net::UnixStream`, `tokio::net::TcpStream`,
/// `tokio::io::DuplexStream`, and so on.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased read half.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Type-erased write half.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Split a duplex stream into independently owned, type-erased halves.
///
/// The stream is released once both halves are dropped.
pub fn split_boxed<S: DuplexStream>(stream: S) -> (BoxedReader, BoxedWriter) {
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(reader), Box::new(writer))
}
