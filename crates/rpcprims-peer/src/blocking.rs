//! Synchronous wrapper for callers without an async runtime.

use std::future::Future;
use std::io;
#[cfg(unix)]
use std::path::Path;

use serde_json::Value;
use tokio::runtime::{Builder, Runtime};

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::DuplexStream;

/// A [`Client`] driven by a private single-threaded runtime.
///
/// The read loop and writer only make progress while a blocking method is
/// running, so notifications and incoming calls are delivered during
/// [`BlockingClient::call`] or [`BlockingClient::block_on`].
pub struct BlockingClient {
    runtime: Runtime,
    client: Client,
}

impl BlockingClient {
    /// Connect to a server listening on a local socket.
    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<Path>, config: ClientConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Self::with_stream(config, move || async move {
            rpcprims_transport::UnixDomainSocket::connect(&path)
                .await
                .map_err(io::Error::other)
        })
    }

    /// Build a client over a stream produced inside the private runtime.
    pub fn with_stream<S, F, Fut>(config: ClientConfig, connect: F) -> Result<Self>
    where
        S: DuplexStream,
        F: FnOnce() -> Fut,
        Fut: Future<Output = io::Result<S>>,
    {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let stream = runtime.block_on(connect())?;
        let client = {
            let _guard = runtime.enter();
            Client::new(stream, config)
        };
        Ok(Self { runtime, client })
    }

    /// Call `method` and block until its result arrives.
    pub fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.runtime.block_on(self.client.call(method, params))
    }

    /// Send a notification and block until it has been written.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        let _guard = self.runtime.enter();
        let delivery = self.client.notify(method, params)?;
        self.runtime.block_on(delivery)
    }

    /// Flush queued frames and close the connection.
    pub fn close(self) -> Result<()> {
        self.runtime.block_on(self.client.close())
    }

    /// The underlying async client, for registering observers.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Run a future on the private runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl std::fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("client", &self.client)
            .finish()
    }
}
