//! JSON-RPC client over a duplex stream.
//!
//! ```text
//!   begin_call ──► PendingTable.register(id) ──► WriteQueue ──► stream
//!                                                                  │
//!   PendingCall ◄── complete(id) ◄── dispatch ◄── read loop ◄──────┘
//!                                       │
//!                        notification / call observers
//! ```
//!
//! Each client runs one read loop task and one writer task. The read loop
//! dispatches one frame at a time, so inbound calls and notifications are
//! handled in arrival order.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use rpcprims_frame::{FailureHook, FrameError, FrameReader, FrameWriter, WriteQueue, WriteTicket};
use rpcprims_message::envelope;
use rpcprims_message::{Encoding, Envelope, Message, RemoteFault};
use rpcprims_transport::{split_boxed, BoxedReader, DuplexStream};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{Result, RpcError};
use crate::observer::{CallFn, ClientObservers, IncomingCall, ObserverId};
use crate::pending::{PendingCall, PendingTable};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Constructed; the read loop has not started.
    Init,
    Listening,
    ShuttingDown,
    Closed,
    /// Terminal failure; every operation returns [`RpcError::NotConnected`].
    Failed,
}

/// A JSON-RPC connection.
///
/// Cheap to clone; all clones share one connection. The read loop starts on
/// the first call, notification, or reply, or on [`Client::start_listening`].
/// Dropping every handle cancels the read loop and shuts the writer down.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

/// A non-owning handle to a [`Client`].
#[derive(Clone)]
pub struct WeakClient {
    inner: Weak<Inner>,
}

struct Inner {
    id: u64,
    state: Mutex<State>,
    observers: Mutex<ClientObservers>,
    writer: WriteQueue,
    cancel: CancellationToken,
    close_timeout: Duration,
    failed_emitted: AtomicBool,
}

struct State {
    lifecycle: ClientState,
    encoding: Encoding,
    pending: PendingTable,
    reader: Option<FrameReader<BoxedReader>>,
}

impl State {
    fn check_ready(&self) -> Result<()> {
        match self.lifecycle {
            ClientState::Init | ClientState::Listening => Ok(()),
            _ => Err(RpcError::NotConnected),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Client {
    /// Wrap a duplex stream.
    ///
    /// Must be called within a Tokio runtime: the writer task is spawned here.
    pub fn new<S: DuplexStream>(stream: S, config: ClientConfig) -> Self {
        let (reader, writer) = split_boxed(stream);
        Self::from_split(reader, writer, config)
    }

    /// Wrap separately owned read and write halves, such as a child
    /// process's stdout and stdin.
    pub fn from_split<R, W>(reader: R, writer: W, config: ClientConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        let reader: BoxedReader = Box::new(reader);
        let reader = FrameReader::with_config(reader, config.frame.clone());
        let writer = FrameWriter::with_config(writer, config.frame.clone());

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let on_failure: FailureHook = Box::new(move |err: &FrameError| {
                if let Some(inner) = weak.upgrade() {
                    Client { inner }.panic(RpcError::from(err));
                }
            });
            let (writer, _task) = WriteQueue::spawn_with_hook(writer, Some(on_failure));

            Inner {
                id,
                state: Mutex::new(State {
                    lifecycle: ClientState::Init,
                    encoding: config.encoding,
                    pending: PendingTable::default(),
                    reader: Some(reader),
                }),
                observers: Mutex::new(ClientObservers::default()),
                writer,
                cancel: CancellationToken::new(),
                close_timeout: config.close_timeout,
                failed_emitted: AtomicBool::new(false),
            }
        });

        debug!(client_id = id, encoding = %config.encoding, "client created");
        Self { inner }
    }

    /// Process-unique id of this connection, used in logs and by servers.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> ClientState {
        self.inner.state.lock().lifecycle
    }

    /// Whether calls can still be issued.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().check_ready().is_ok()
    }

    /// The encoding used for outgoing frames.
    pub fn encoding(&self) -> Encoding {
        self.inner.state.lock().encoding
    }

    /// Set the encoding for outgoing frames, e.g. after negotiating it.
    pub fn set_encoding(&self, encoding: Encoding) {
        self.inner.state.lock().encoding = encoding;
    }

    /// Number of calls awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn downgrade(&self) -> WeakClient {
        WeakClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Start the read loop if it is not running yet.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start_listening(&self) {
        let reader = {
            let mut state = self.inner.state.lock();
            if state.lifecycle != ClientState::Init {
                return;
            }
            state.lifecycle = ClientState::Listening;
            state.reader.take()
        };
        let Some(reader) = reader else {
            return;
        };

        debug!(client_id = self.id(), "read loop started");
        tokio::spawn(read_loop(
            Arc::downgrade(&self.inner),
            reader,
            self.inner.cancel.clone(),
        ));
    }

    /// Call `method` and wait for its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.begin_call(method, params)?.await
    }

    /// Call `method`, giving up when `cancel` fires.
    ///
    /// A cancelled call stays registered; its eventual reply is discarded.
    pub async fn call_with_cancel(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let pending = self.begin_call(method, params)?;
        let id = pending.id();
        tokio::select! {
            biased;
            result = pending => result,
            _ = cancel.cancelled() => {
                debug!(client_id = self.id(), id, method, "call cancelled by caller");
                Err(RpcError::Cancelled)
            }
        }
    }

    /// Queue a call and return a future for its result.
    ///
    /// The id is assigned and the frame queued before this returns, so calls
    /// reach the wire in the order they were begun.
    pub fn begin_call(&self, method: &str, params: Value) -> Result<PendingCall> {
        let pending = {
            let mut state = self.inner.state.lock();
            state.check_ready()?;
            let (id, rx) = state.pending.register();
            let message = envelope::call(id, method, params);
            match self.inner.writer.enqueue(message, state.encoding) {
                // Write failures reach the call through the writer's failure hook.
                Ok(_ticket) => PendingCall::new(id, rx),
                Err(err) => {
                    state.pending.take(id);
                    drop(state);
                    let err = RpcError::from(err);
                    self.panic(err.clone());
                    return Err(err);
                }
            }
        };

        trace!(client_id = self.id(), id = pending.id(), method, "call queued");
        self.start_listening();
        Ok(pending)
    }

    /// Send a notification. No reply is expected.
    pub fn notify(&self, method: &str, params: Value) -> Result<Delivery> {
        trace!(client_id = self.id(), method, "notification queued");
        self.send(envelope::notification(method, params))
    }

    /// Answer an incoming call with a result.
    pub fn reply(&self, id: Value, result: Value) -> Result<Delivery> {
        self.send(envelope::result(id, result))
    }

    /// Answer an incoming call with an error.
    pub fn reply_error(&self, id: Value, code: i64, message: &str) -> Result<Delivery> {
        self.reply_fault(id, RemoteFault::new(code, message))
    }

    /// Answer an incoming call with a complete error object.
    pub fn reply_fault(&self, id: Value, fault: RemoteFault) -> Result<Delivery> {
        self.send(envelope::error(id, fault))
    }

    fn send(&self, message: Message) -> Result<Delivery> {
        let enqueued = {
            let state = self.inner.state.lock();
            state.check_ready()?;
            self.inner.writer.enqueue(message, state.encoding)
        };
        match enqueued {
            Ok(ticket) => {
                self.start_listening();
                Ok(Delivery { ticket })
            }
            Err(err) => {
                let err = RpcError::from(err);
                self.panic(err.clone());
                Err(err)
            }
        }
    }

    /// Close the connection.
    ///
    /// Every pending call completes with [`RpcError::Closed`]. Frames queued
    /// before this call are still written, then the stream is shut down.
    /// If the peer stops reading, the flush is abandoned after
    /// [`ClientConfig::close_timeout`] and an I/O error is returned. The
    /// client ends up `Closed` either way.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            state.check_ready()?;
            state.lifecycle = ClientState::ShuttingDown;
            state.reader = None;
        }
        debug!(client_id = self.id(), "client shutting down");

        self.inner.cancel.cancel();
        let shutdown = self.inner.writer.shutdown();
        self.fail_pending(&RpcError::Closed);
        self.emit_failed(&RpcError::Closed);

        let result = match shutdown {
            Ok(ticket) => match tokio::time::timeout(self.inner.close_timeout, ticket).await {
                Ok(flushed) => flushed.map_err(RpcError::from),
                Err(_) => {
                    warn!(
                        client_id = self.id(),
                        timeout = ?self.inner.close_timeout,
                        "peer did not drain queued frames; aborting writer"
                    );
                    self.inner.writer.abort();
                    Err(RpcError::Io(Arc::new(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "timed out flushing frames on close",
                    ))))
                }
            },
            Err(err) => Err(RpcError::from(err)),
        };

        {
            let mut state = self.inner.state.lock();
            if state.lifecycle == ClientState::ShuttingDown {
                state.lifecycle = ClientState::Closed;
            }
        }
        info!(client_id = self.id(), "client closed");
        result
    }

    /// Observe notifications for `method`, or for every method when `None`.
    pub fn on_notification<F>(&self, method: Option<&str>, f: F) -> ObserverId
    where
        F: Fn(&Client, &str, &Value) + Send + Sync + 'static,
    {
        self.inner
            .observers
            .lock()
            .add_notification(method.map(str::to_string), Arc::new(f))
    }

    /// Observe incoming calls. Return `true` to claim the call; the observer
    /// is then responsible for replying.
    ///
    /// Unclaimed calls are answered with `METHOD_NOT_FOUND`.
    pub fn on_call<F>(&self, f: F) -> ObserverId
    where
        F: Fn(&Client, &IncomingCall) -> bool + Send + Sync + 'static,
    {
        self.inner.observers.lock().add_call(Arc::new(f))
    }

    /// Observe the connection failing or closing. Fires at most once.
    pub fn on_failed<F>(&self, f: F) -> ObserverId
    where
        F: Fn(&Client, &RpcError) + Send + Sync + 'static,
    {
        self.inner.observers.lock().add_failed(Arc::new(f))
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.lock().remove(id)
    }

    pub(crate) fn set_call_fallback(&self, f: CallFn) {
        self.inner.observers.lock().set_fallback(f);
    }

    /// Fail the connection: complete every pending call with `error`, stop
    /// reading and writing, and notify failure observers. Idempotent.
    fn panic(&self, error: RpcError) {
        {
            let mut state = self.inner.state.lock();
            if matches!(state.lifecycle, ClientState::Failed | ClientState::Closed) {
                return;
            }
            state.lifecycle = ClientState::Failed;
            state.reader = None;
        }
        warn!(client_id = self.id(), error = %error, "client failed");

        self.fail_pending(&error);
        self.inner.cancel.cancel();
        // The peer is gone or misbehaving; queued frames are not worth flushing.
        self.inner.writer.abort();
        self.emit_failed(&error);
    }

    fn fail_pending(&self, error: &RpcError) {
        let drained = self.inner.state.lock().pending.drain();
        if !drained.is_empty() {
            debug!(
                client_id = self.id(),
                count = drained.len(),
                "failing pending calls"
            );
        }
        for completion in drained {
            let _ = completion.send(Err(error.clone()));
        }
    }

    fn emit_failed(&self, error: &RpcError) {
        if self.inner.failed_emitted.swap(true, Ordering::SeqCst) {
            return;
        }
        let handlers = self.inner.observers.lock().failed_handlers();
        for handler in handlers {
            handler(self, error);
        }
    }

    fn upgrade_encoding(&self) {
        let mut state = self.inner.state.lock();
        if state.encoding == Encoding::Text {
            state.encoding = Encoding::Binary;
            info!(client_id = self.id(), "peer sent a binary frame; switching to binary encoding");
        }
    }

    fn dispatch(&self, message: Message) {
        match Envelope::classify(&message) {
            Some(Envelope::Result { id, result }) => self.complete(id, Ok(result)),
            Some(Envelope::Error { id, fault }) => self.complete(id, Err(RpcError::from(fault))),
            Some(Envelope::Notification { method, params }) => {
                self.deliver_notification(&method, &params)
            }
            Some(Envelope::Call { id, method, params }) => {
                self.deliver_call(IncomingCall { id, method, params })
            }
            None => self.panic(RpcError::Protocol(format!(
                "improper message from peer: {message}"
            ))),
        }
    }

    fn complete(&self, id: Option<i64>, result: Result<Value>) {
        let completion = id.and_then(|id| self.inner.state.lock().pending.take(id));
        match completion {
            Some(completion) => {
                trace!(client_id = self.id(), ?id, ok = result.is_ok(), "call completed");
                // The caller may have stopped waiting.
                let _ = completion.send(result);
            }
            None if self.is_closing() => {
                debug!(client_id = self.id(), ?id, "ignoring reply received while closing");
            }
            None => self.panic(RpcError::Protocol(match id {
                Some(id) => format!("reply to unknown call id {id}"),
                None => "reply without a valid call id".to_string(),
            })),
        }
    }

    fn is_closing(&self) -> bool {
        matches!(
            self.inner.state.lock().lifecycle,
            ClientState::ShuttingDown | ClientState::Closed
        )
    }

    fn deliver_notification(&self, method: &str, params: &Value) {
        let handlers = self.inner.observers.lock().notification_handlers(method);
        if handlers.is_empty() {
            debug!(client_id = self.id(), method, "unhandled notification");
            return;
        }
        for handler in handlers {
            handler(self, method, params);
        }
    }

    fn deliver_call(&self, call: IncomingCall) {
        let handlers = self.inner.observers.lock().call_handlers();
        for handler in handlers {
            if handler(self, &call) {
                return;
            }
        }

        debug!(client_id = self.id(), method = %call.method, "no handler for call");
        let fault = RpcError::NotFound(call.method).to_fault();
        if let Err(err) = self.reply_fault(call.id, fault) {
            debug!(client_id = self.id(), error = %err, "could not send METHOD_NOT_FOUND reply");
        }
    }
}

impl WeakClient {
    pub fn upgrade(&self) -> Option<Client> {
        self.inner.upgrade().map(|inner| Client { inner })
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("state", &state.lifecycle)
            .field("encoding", &state.encoding)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl fmt::Debug for WeakClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakClient").finish_non_exhaustive()
    }
}

/// Completion of a queued notification or reply.
///
/// Resolves once the frame has been written. Dropping it does not cancel
/// the write.
#[derive(Debug)]
pub struct Delivery {
    ticket: WriteTicket,
}

impl Future for Delivery {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.ticket).poll(cx).map_err(RpcError::from)
    }
}

async fn read_loop(
    weak: Weak<Inner>,
    mut reader: FrameReader<BoxedReader>,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RpcError::Cancelled),
            frame = reader.read_frame() => frame.map_err(RpcError::from),
        };

        let Some(inner) = weak.upgrade() else {
            break;
        };
        let client = Client { inner };

        match result {
            Ok(frame) => {
                if reader.has_seen_binary() {
                    client.upgrade_encoding();
                }
                client.dispatch(frame.message);
            }
            Err(RpcError::Cancelled) if client.state() != ClientState::Listening => {
                debug!(client_id = client.id(), "read loop stopped");
                break;
            }
            Err(err) => {
                client.panic(err);
                break;
            }
        }

        if client.state() != ClientState::Listening {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcprims_message::{json, METHOD_NOT_FOUND};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream as Pipe};

    /// The far end of a client's stream, driven by hand.
    struct Peer {
        reader: FrameReader<tokio::io::ReadHalf<Pipe>>,
        writer: FrameWriter<tokio::io::WriteHalf<Pipe>>,
    }

    impl Peer {
        async fn recv(&mut self) -> Value {
            Value::from(self.reader.read_message().await.unwrap())
        }

        async fn send(&mut self, value: Value) {
            self.send_with(value, Encoding::Text).await;
        }

        async fn send_with(&mut self, value: Value, encoding: Encoding) {
            let message = Message::try_from(value).unwrap();
            self.writer.write_message(message, encoding).await.unwrap();
        }
    }

    fn connected() -> (Client, Peer) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let client = Client::new(local, ClientConfig::default());
        let (read, write) = tokio::io::split(remote);
        let peer = Peer {
            reader: FrameReader::new(read),
            writer: FrameWriter::new(write),
        };
        (client, peer)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn initialize_round_trip() {
        let (client, mut peer) = connected();
        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call("initialize", json!({})).await }
        });

        assert_eq!(
            peer.recv().await,
            json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{}})
        );
        peer.send(json!({"jsonrpc":"2.0","id":1,"result":{"ok":true}}))
            .await;

        assert_eq!(call.await.unwrap().unwrap(), json!({"ok": true}));
        assert_eq!(client.state(), ClientState::Listening);
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_calls_get_distinct_ids_and_route_by_id() {
        let (client, mut peer) = connected();
        let calls: Vec<_> = (0..5)
            .map(|n| client.begin_call("square", json!(n)).unwrap())
            .collect();
        let ids: Vec<i64> = calls.iter().map(PendingCall::id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let mut received = Vec::new();
        for _ in 0..5 {
            received.push(peer.recv().await);
        }
        // Answer in reverse to show routing is by id, not order.
        for request in received.iter().rev() {
            let n = request["params"].as_i64().unwrap();
            peer.send(json!({"jsonrpc":"2.0","id":request["id"],"result":n * n}))
                .await;
        }

        for (n, call) in calls.into_iter().enumerate() {
            let n = n as i64;
            assert_eq!(call.await.unwrap(), json!(n * n));
        }
    }

    #[tokio::test]
    async fn remote_error_fails_only_that_call() {
        let (client, mut peer) = connected();
        let failing = client.begin_call("bad", json!(null)).unwrap();
        let passing = client.begin_call("good", json!(null)).unwrap();
        peer.recv().await;
        peer.recv().await;

        peer.send(json!({"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"nope"}}))
            .await;
        peer.send(json!({"jsonrpc":"2.0","id":2,"result":"fine"}))
            .await;

        let err = failing.await.unwrap_err();
        assert_eq!(err.code(), Some(-32602));
        assert_eq!(err.to_string(), "nope (-32602)");
        assert_eq!(passing.await.unwrap(), json!("fine"));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn unknown_reply_id_panics_client() {
        let (client, mut peer) = connected();
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        client.on_failed(move |_, err| {
            assert!(matches!(err, RpcError::Protocol(_)));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let pending = client.begin_call("wait", json!(null)).unwrap();
        peer.recv().await;
        peer.send(json!({"jsonrpc":"2.0","id":99,"result":true}))
            .await;

        assert!(matches!(pending.await, Err(RpcError::Protocol(_))));
        assert_eq!(client.state(), ClientState::Failed);
        assert!(matches!(
            client.call("again", json!(null)).await,
            Err(RpcError::NotConnected)
        ));
        assert!(matches!(
            client.notify("again", json!(null)),
            Err(RpcError::NotConnected)
        ));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_without_id_panics_client() {
        let (client, mut peer) = connected();
        let pending = client.begin_call("wait", json!(null)).unwrap();
        peer.recv().await;
        peer.send(json!({"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"parse"}}))
            .await;
        assert!(matches!(pending.await, Err(RpcError::Protocol(_))));
    }

    #[tokio::test]
    async fn malformed_envelope_panics_client() {
        let (client, mut peer) = connected();
        let pending = client.begin_call("wait", json!(null)).unwrap();
        peer.recv().await;
        peer.send(json!({"jsonrpc":"1.0","id":1,"result":true}))
            .await;
        assert!(matches!(pending.await, Err(RpcError::Protocol(_))));
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[tokio::test]
    async fn malformed_frame_panics_client() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let client = Client::new(local, ClientConfig::default());
        let pending = client.begin_call("wait", json!(null)).unwrap();

        remote
            .write_all(b"Content-Length: nope\r\n\r\n{}")
            .await
            .unwrap();
        assert!(matches!(pending.await, Err(RpcError::Protocol(_))));
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[tokio::test]
    async fn oversize_frame_panics_client() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let config = ClientConfig::default().with_max_frame_size(64);
        let client = Client::new(local, config);
        let pending = client.begin_call("w", json!(null)).unwrap();

        remote
            .write_all(b"Content-Length: 100000\r\n\r\n")
            .await
            .unwrap();
        assert!(matches!(pending.await, Err(RpcError::Protocol(_))));
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[tokio::test]
    async fn truncated_body_panics_client() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let client = Client::new(local, ClientConfig::default());
        let pending = client.begin_call("wait", json!(null)).unwrap();

        remote
            .write_all(b"Content-Length: 50\r\n\r\n{\"jsonrpc\"")
            .await
            .unwrap();
        remote.shutdown().await.unwrap();

        match pending.await {
            Err(RpcError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected eof, got {other:?}"),
        }
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[tokio::test]
    async fn peer_hangup_fails_pending_calls_with_io_error() {
        let (client, peer) = connected();
        let pending = client.begin_call("wait", json!(null)).unwrap();
        drop(peer);
        assert!(matches!(pending.await, Err(RpcError::Io(_))));
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[tokio::test]
    async fn notifications_reach_matching_observers() {
        let (client, mut peer) = connected();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        client.on_notification(Some("progress"), move |_, method, params| {
            log.lock().push(format!("progress:{method}:{params}"));
        });
        let log = seen.clone();
        client.on_notification(None, move |_, method, _| {
            log.lock().push(format!("any:{method}"));
        });
        client.start_listening();

        peer.send(json!({"jsonrpc":"2.0","method":"progress","params":50}))
            .await;
        peer.send(json!({"jsonrpc":"2.0","method":"log","params":"x"}))
            .await;

        eventually(|| seen.lock().len() == 3).await;
        assert_eq!(
            *seen.lock(),
            vec!["progress:progress:50", "any:progress", "any:log"]
        );
    }

    #[tokio::test]
    async fn unhandled_call_gets_method_not_found() {
        let (client, mut peer) = connected();
        client.start_listening();

        peer.send(json!({"jsonrpc":"2.0","id":"req-7","method":"missing","params":{}}))
            .await;
        let reply = peer.recv().await;
        assert_eq!(reply["id"], json!("req-7"));
        assert_eq!(reply["error"]["code"], json!(METHOD_NOT_FOUND));
        assert_eq!(
            reply["error"]["message"],
            json!("The method does not exist or is not available")
        );
    }

    #[tokio::test]
    async fn call_observer_replies() {
        let (client, mut peer) = connected();
        client.on_call(|client, call| {
            if call.method != "add" {
                return false;
            }
            let sum: i64 = call
                .params
                .as_array()
                .map(|items| items.iter().filter_map(Value::as_i64).sum())
                .unwrap_or_default();
            client.reply(call.id.clone(), json!(sum)).is_ok()
        });
        client.start_listening();

        peer.send(json!({"jsonrpc":"2.0","id":4,"method":"add","params":[1,2,3]}))
            .await;
        assert_eq!(
            peer.recv().await,
            json!({"jsonrpc":"2.0","id":4,"result":6})
        );

        peer.send(json!({"jsonrpc":"2.0","id":5,"method":"sub","params":[]}))
            .await;
        assert_eq!(peer.recv().await["error"]["code"], json!(METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn notifications_are_written_in_order() {
        let (client, mut peer) = connected();
        let deliveries: Vec<_> = ["n1", "n2", "n3"]
            .iter()
            .map(|m| client.notify(m, json!(null)).unwrap())
            .collect();
        client.close().await.unwrap();

        for method in ["n1", "n2", "n3"] {
            assert_eq!(peer.recv().await["method"], json!(method));
        }
        for delivery in deliveries {
            delivery.await.unwrap();
        }
        assert!(matches!(
            peer.reader.read_frame().await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn close_fails_every_pending_call() {
        let (client, _peer) = connected();
        let calls: Vec<_> = (0..4)
            .map(|_| client.begin_call("slow", json!(null)).unwrap())
            .collect();
        assert_eq!(client.pending_calls(), 4);

        client.close().await.unwrap();
        for call in calls {
            assert!(matches!(call.await, Err(RpcError::Closed)));
        }
        assert_eq!(client.state(), ClientState::Closed);
        assert!(matches!(
            client.call("late", json!(null)).await,
            Err(RpcError::NotConnected)
        ));
        assert!(matches!(client.close().await, Err(RpcError::NotConnected)));
    }

    #[tokio::test]
    async fn close_emits_failed_once() {
        let (client, _peer) = connected();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        client.on_failed(move |_, err| {
            assert!(matches!(err, RpcError::Closed));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        client.start_listening();
        client.close().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_completes_when_peer_stops_reading() {
        // The far end never reads, so a large frame can never be flushed.
        let (local, _stalled) = tokio::io::duplex(64);
        let config = ClientConfig::default().with_close_timeout(Duration::from_millis(100));
        let client = Client::new(local, config);
        let pending = client
            .begin_call("big", json!("x".repeat(4096)))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let closed = tokio::time::timeout(Duration::from_secs(2), client.close())
            .await
            .expect("close should not wait on the peer indefinitely");
        match closed {
            Err(RpcError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(client.state(), ClientState::Closed);
        assert!(matches!(pending.await, Err(RpcError::Closed)));
    }

    #[tokio::test]
    async fn late_reply_during_shutdown_is_ignored() {
        let (client, _peer) = connected();
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        client.on_failed(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.inner.state.lock().lifecycle = ClientState::ShuttingDown;
        client.complete(Some(42), Ok(json!(1)));
        assert_eq!(client.state(), ClientState::ShuttingDown);

        client.inner.state.lock().lifecycle = ClientState::Closed;
        client.complete(None, Ok(json!(1)));
        assert_eq!(client.state(), ClientState::Closed);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn binary_frame_upgrades_encoding_once() {
        let (client, mut peer) = connected();
        client.start_listening();
        assert_eq!(client.encoding(), Encoding::Text);

        peer.send_with(
            json!({"jsonrpc":"2.0","method":"hello","params":null}),
            Encoding::Binary,
        )
        .await;
        eventually(|| client.encoding() == Encoding::Binary).await;

        peer.send(json!({"jsonrpc":"2.0","method":"text-again","params":null}))
            .await;
        client.notify("after", json!(1)).unwrap().await.unwrap();
        let frame = peer.reader.read_frame().await.unwrap();
        assert_eq!(frame.encoding, Encoding::Binary);
        assert_eq!(frame.message.get("method"), Some(&json!("after")));
        assert_eq!(client.encoding(), Encoding::Binary);
    }

    #[tokio::test]
    async fn cancelled_call_ignores_late_reply() {
        let (client, mut peer) = connected();
        let token = CancellationToken::new();
        let call = tokio::spawn({
            let client = client.clone();
            let token = token.clone();
            async move { client.call_with_cancel("slow", json!(null), &token).await }
        });

        let request = peer.recv().await;
        token.cancel();
        assert!(matches!(call.await.unwrap(), Err(RpcError::Cancelled)));
        assert_eq!(client.pending_calls(), 1);

        peer.send(json!({"jsonrpc":"2.0","id":request["id"],"result":"late"}))
            .await;
        eventually(|| client.pending_calls() == 0).await;
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn dropping_last_handle_releases_stream() {
        let (client, mut peer) = connected();
        client.start_listening();
        drop(client);
        assert!(peer.reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn write_failure_panics_client() {
        let (_idle, reader) = tokio::io::duplex(64);
        let (writer, hung_up) = tokio::io::duplex(64);
        drop(hung_up);
        let client = Client::from_split(reader, writer, ClientConfig::default());

        let pending = client.begin_call("x", json!(null)).unwrap();
        assert!(matches!(pending.await, Err(RpcError::Io(_))));
        assert_eq!(client.state(), ClientState::Failed);
    }
}
