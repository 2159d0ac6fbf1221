//! JSON-RPC 2.0 peers over duplex streams.
//!
//! [`Client`] issues calls and notifications, correlates replies by id, and
//! delivers incoming notifications and calls to observers. [`Server`] owns
//! a set of accepted clients and routes their calls through a shared method
//! table. [`BlockingClient`] wraps a client for synchronous callers.

pub mod blocking;
pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod observer;
pub mod pending;
pub mod server;

pub use blocking::BlockingClient;
pub use client::{Client, ClientState, Delivery, WeakClient};
pub use config::ClientConfig;
pub use connector::{connect, connect_with_config};
pub use error::{Result, RpcError};
pub use observer::{IncomingCall, ObserverId};
pub use pending::PendingCall;
pub use rpcprims_transport::DuplexStream;
pub use server::{HandlerId, MethodHandler, Server};
