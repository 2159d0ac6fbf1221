use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Result, RpcError};

pub(crate) type Completion = oneshot::Sender<Result<Value>>;

/// In-flight calls keyed by correlation id.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    last_id: i64,
    calls: HashMap<i64, Completion>,
}

impl PendingTable {
    /// Allocate the next id and register a completion slot for it.
    pub(crate) fn register(&mut self) -> (i64, oneshot::Receiver<Result<Value>>) {
        self.last_id += 1;
        let id = self.last_id;
        let (tx, rx) = oneshot::channel();
        self.calls.insert(id, tx);
        (id, rx)
    }

    pub(crate) fn take(&mut self, id: i64) -> Option<Completion> {
        self.calls.remove(&id)
    }

    pub(crate) fn drain(&mut self) -> Vec<Completion> {
        self.calls.drain().map(|(_, tx)| tx).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }
}

/// The result of a call that has been written but not yet answered.
///
/// Dropping it does not withdraw the call: its id stays registered until
/// the peer replies, and the reply is then discarded.
#[must_use = "a pending call yields its result only when awaited"]
#[derive(Debug)]
pub struct PendingCall {
    id: i64,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingCall {
    pub(crate) fn new(id: i64, rx: oneshot::Receiver<Result<Value>>) -> Self {
        Self { id, rx }
    }

    /// The correlation id sent with the call.
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The client was dropped with this call still registered.
            Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
