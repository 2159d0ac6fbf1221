//! JSON-RPC 2.0 over framed duplex streams.
//!
//! rpcprims carries JSON-RPC calls, results, errors, and notifications over
//! any byte stream, using `Content-Length` framing with JSON or CBOR bodies.
//!
//! # Crate Structure
//!
//! - [`transport`]: duplex stream abstraction and Unix socket listener
//! - [`message`]: message model, typed build/parse, envelopes, encodings
//! - [`frame`]: header-delimited framing and the FIFO write queue
//! - [`peer`]: client and server (behind the `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use rpcprims_transport::*;
}

/// Re-export message types.
pub mod message {
    pub use rpcprims_message::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rpcprims_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use rpcprims_peer::*;
}
