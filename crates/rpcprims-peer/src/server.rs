//! Multi-client JSON-RPC server.
//!
//! A [`Server`] owns the clients it has accepted and routes their incoming
//! calls through one method table. Handlers are kept sorted by method name
//! and looked up by binary search; each registration gets an opaque
//! [`HandlerId`] for removal.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(unix)]
use rpcprims_transport::UnixDomainSocket;
use rpcprims_transport::{DuplexStream, TransportError};

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::RpcError;
use crate::observer::{IdSource, IncomingCall, ObserverId, Registry};

/// Handles one method. The handler replies through the client it is given,
/// either before returning or later from a spawned task.
pub type MethodHandler = Arc<dyn Fn(&Server, &Client, &IncomingCall) + Send + Sync>;

type CallObserver = Arc<dyn Fn(&Server, &Client, &IncomingCall) -> bool + Send + Sync>;
type NotificationObserver = Arc<dyn Fn(&Server, &Client, &str, &Value) + Send + Sync>;
type ClientObserver = Arc<dyn Fn(&Server, &Client) + Send + Sync>;

/// Identifies a registered method handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

struct HandlerEntry {
    method: String,
    id: HandlerId,
    handler: MethodHandler,
}

#[derive(Default)]
struct ServerEvents {
    ids: IdSource,
    calls: Registry<CallObserver>,
    notifications: Registry<NotificationObserver>,
    accepted: Registry<ClientObserver>,
    closed: Registry<ClientObserver>,
}

struct ServerInner {
    config: ClientConfig,
    clients: Mutex<BTreeMap<u64, Client>>,
    /// Sorted by method, then by registration order.
    handlers: RwLock<Vec<HandlerEntry>>,
    last_handler_id: AtomicU64,
    events: Mutex<ServerEvents>,
}

/// A JSON-RPC server shared by every client it accepts.
///
/// Cheap to clone. Incoming calls go first to [`Server::on_call`] observers,
/// then to the handler registered for the method; calls nobody handles are
/// answered with `METHOD_NOT_FOUND`.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a server whose accepted clients use `config`.
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                config,
                clients: Mutex::new(BTreeMap::new()),
                handlers: RwLock::new(Vec::new()),
                last_handler_id: AtomicU64::new(0),
                events: Mutex::new(ServerEvents::default()),
            }),
        }
    }

    /// Take ownership of an accepted stream and start serving it.
    ///
    /// Must be called within a Tokio runtime.
    pub fn accept<S: DuplexStream>(&self, stream: S) -> Client {
        self.adopt(Client::new(stream, self.inner.config.clone()))
    }

    /// Serve separately owned read and write halves.
    pub fn accept_split<R, W>(&self, reader: R, writer: W) -> Client
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.adopt(Client::from_split(
            reader,
            writer,
            self.inner.config.clone(),
        ))
    }

    fn adopt(&self, client: Client) -> Client {
        let server = Arc::downgrade(&self.inner);
        client.on_failed(move |client, err| {
            if let Some(inner) = server.upgrade() {
                Server { inner }.release(client, err);
            }
        });

        let server = Arc::downgrade(&self.inner);
        client.set_call_fallback(Arc::new(move |client: &Client, call: &IncomingCall| {
            match server.upgrade() {
                Some(inner) => Server { inner }.handle_call(client, call),
                None => false,
            }
        }));

        let server: Weak<ServerInner> = Arc::downgrade(&self.inner);
        client.on_notification(None, move |client, method, params| {
            if let Some(inner) = server.upgrade() {
                Server { inner }.forward_notification(client, method, params);
            }
        });

        self.inner.clients.lock().insert(client.id(), client.clone());
        info!(client_id = client.id(), "client accepted");
        client.start_listening();

        let observers = self.inner.events.lock().accepted.snapshot();
        for observer in observers {
            observer(self, &client);
        }
        client
    }

    fn release(&self, client: &Client, err: &RpcError) {
        if self.inner.clients.lock().remove(&client.id()).is_none() {
            return;
        }
        match err {
            RpcError::Closed => info!(client_id = client.id(), "client closed"),
            err => info!(client_id = client.id(), error = %err, "client disconnected"),
        }
        let observers = self.inner.events.lock().closed.snapshot();
        for observer in observers {
            observer(self, client);
        }
    }

    fn handle_call(&self, client: &Client, call: &IncomingCall) -> bool {
        let observers = self.inner.events.lock().calls.snapshot();
        for observer in observers {
            if observer(self, client, call) {
                return true;
            }
        }

        let Some(handler) = self.find_handler(&call.method) else {
            return false;
        };
        debug!(client_id = client.id(), method = %call.method, "dispatching call");
        handler(self, client, call);
        true
    }

    fn forward_notification(&self, client: &Client, method: &str, params: &Value) {
        let observers = self.inner.events.lock().notifications.snapshot();
        for observer in observers {
            observer(self, client, method, params);
        }
    }

    fn find_handler(&self, method: &str) -> Option<MethodHandler> {
        let handlers = self.inner.handlers.read();
        let index = handlers.partition_point(|entry| entry.method.as_str() < method);
        handlers
            .get(index)
            .filter(|entry| entry.method == method)
            .map(|entry| entry.handler.clone())
    }

    /// Register `handler` for `method`.
    ///
    /// When several handlers share a method the earliest registration wins;
    /// removing it exposes the next one.
    pub fn add_handler<F>(&self, method: &str, handler: F) -> HandlerId
    where
        F: Fn(&Server, &Client, &IncomingCall) + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.last_handler_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut handlers = self.inner.handlers.write();
        let index = handlers.partition_point(|entry| entry.method.as_str() <= method);
        handlers.insert(
            index,
            HandlerEntry {
                method: method.to_string(),
                id,
                handler: Arc::new(handler),
            },
        );
        debug!(method, handler_id = id.0, "handler registered");
        id
    }

    /// Remove a handler. Returns `false` if `id` is not registered.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.write();
        match handlers.iter().position(|entry| entry.id == id) {
            Some(index) => {
                let entry = handlers.remove(index);
                debug!(method = %entry.method, handler_id = id.0, "handler removed");
                true
            }
            None => false,
        }
    }

    /// Methods with at least one handler, in sorted order.
    pub fn methods(&self) -> Vec<String> {
        let handlers = self.inner.handlers.read();
        let mut methods: Vec<String> = handlers.iter().map(|e| e.method.clone()).collect();
        methods.dedup();
        methods
    }

    /// Observe every incoming call before handler lookup. Return `true` to
    /// claim the call.
    pub fn on_call<F>(&self, f: F) -> ObserverId
    where
        F: Fn(&Server, &Client, &IncomingCall) -> bool + Send + Sync + 'static,
    {
        let mut events = self.inner.events.lock();
        let id = events.ids.next();
        events.calls.add(id, Arc::new(f));
        id
    }

    /// Observe notifications from every client.
    pub fn on_notification<F>(&self, f: F) -> ObserverId
    where
        F: Fn(&Server, &Client, &str, &Value) + Send + Sync + 'static,
    {
        let mut events = self.inner.events.lock();
        let id = events.ids.next();
        events.notifications.add(id, Arc::new(f));
        id
    }

    pub fn on_client_accepted<F>(&self, f: F) -> ObserverId
    where
        F: Fn(&Server, &Client) + Send + Sync + 'static,
    {
        let mut events = self.inner.events.lock();
        let id = events.ids.next();
        events.accepted.add(id, Arc::new(f));
        id
    }

    /// Observe a client leaving, whether it failed or was closed.
    pub fn on_client_closed<F>(&self, f: F) -> ObserverId
    where
        F: Fn(&Server, &Client) + Send + Sync + 'static,
    {
        let mut events = self.inner.events.lock();
        let id = events.ids.next();
        events.closed.add(id, Arc::new(f));
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut events = self.inner.events.lock();
        events.calls.remove(id)
            || events.notifications.remove(id)
            || events.accepted.remove(id)
            || events.closed.remove(id)
    }

    /// Snapshot of the connected clients, ordered by id.
    pub fn clients(&self) -> Vec<Client> {
        self.inner.clients.lock().values().cloned().collect()
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.lock().len()
    }

    /// Run `f` for each connected client.
    pub fn foreach(&self, mut f: impl FnMut(&Client)) {
        for client in self.clients() {
            f(&client);
        }
    }

    /// Close every connected client concurrently.
    ///
    /// A client whose peer has stopped reading holds this up for at most
    /// its configured close timeout.
    pub async fn close_all(&self) {
        let clients = self.clients();
        let results = join_all(clients.iter().map(Client::close)).await;
        for (client, result) in clients.iter().zip(results) {
            if let Err(err) = result {
                debug!(client_id = client.id(), error = %err, "client close failed");
            }
        }
    }

    /// Accept connections on `socket` until `shutdown` fires, then close
    /// every client.
    #[cfg(unix)]
    pub async fn serve(
        &self,
        socket: &UnixDomainSocket,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError> {
        info!(path = ?socket.path(), "serving");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = socket.accept() => match accepted {
                    Ok(stream) => {
                        self.accept(stream);
                    }
                    Err(TransportError::Accept(err)) if is_transient_accept_error(&err) => {
                        warn!(error = %err, "transient accept failure");
                    }
                    Err(err) => {
                        self.close_all().await;
                        return Err(err);
                    }
                },
            }
        }
        info!("shutting down; closing clients");
        self.close_all().await;
        Ok(())
    }
}

#[cfg(unix)]
fn is_transient_accept_error(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
    )
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("clients", &self.client_count())
            .field("methods", &self.methods())
            .finish()
    }
}
