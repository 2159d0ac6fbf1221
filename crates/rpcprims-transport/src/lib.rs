//! Duplex stream abstraction and local socket transport.
//!
//! Everything above this layer talks to a [`DuplexStream`]: any
//! `AsyncRead + AsyncWrite` byte stream owned by the embedding application
//! (socket, pipe, child-process stdio). [`UnixDomainSocket`] is the bundled
//! listener/connector used by the CLI.

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::{split_boxed, BoxedReader, BoxedWriter, DuplexStream};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
