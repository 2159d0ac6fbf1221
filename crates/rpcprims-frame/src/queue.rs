use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use rpcprims_message::{Encoding, Message};
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{FrameError, Result};
use crate::writer::FrameWriter;

/// Called once with the error that broke the stream.
pub type FailureHook = Box<dyn FnOnce(&FrameError) + Send + 'static>;

enum Request {
    Write {
        message: Message,
        encoding: Encoding,
        done: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        done: oneshot::Sender<Result<()>>,
    },
}

impl Request {
    fn fail(self, err: FrameError) {
        let done = match self {
            Request::Write { done, .. } | Request::Shutdown { done } => done,
        };
        let _ = done.send(Err(err));
    }
}

/// A FIFO queue of frame writes served by a single writer task.
///
/// At most one write is in flight at a time, so frames reach the stream in
/// enqueue order. A stream failure completes the failing write with its
/// error, fails every write still queued with [`FrameError::QueueAborted`],
/// and stops the task; later enqueues return [`FrameError::WriterClosed`].
///
/// Dropping every handle flushes the remaining queue and shuts the stream down.
/// [`WriteQueue::abort`] stops the task at once, even mid-write.
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<Request>,
    abort: CancellationToken,
}

impl WriteQueue {
    /// Spawn the writer task on the current Tokio runtime.
    pub fn spawn<W>(writer: FrameWriter<W>) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn_with_hook(writer, None)
    }

    /// Spawn the writer task, calling `on_failure` if the stream breaks.
    pub fn spawn_with_hook<W>(
        writer: FrameWriter<W>,
        on_failure: Option<FailureHook>,
    ) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let abort = CancellationToken::new();
        let handle = tokio::spawn(run(writer, rx, on_failure, abort.clone()));
        (Self { tx, abort }, handle)
    }

    /// Queue `message` for writing with `encoding`.
    ///
    /// The frame's position in the queue is fixed when this returns; the
    /// ticket resolves once the frame has been fully written.
    pub fn enqueue(&self, message: Message, encoding: Encoding) -> Result<WriteTicket> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Request::Write {
                message,
                encoding,
                done,
            })
            .map_err(|_| FrameError::WriterClosed)?;
        Ok(WriteTicket { rx })
    }

    /// Queue a shutdown after every frame already queued.
    pub fn shutdown(&self) -> Result<WriteTicket> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Request::Shutdown { done })
            .map_err(|_| FrameError::WriterClosed)?;
        Ok(WriteTicket { rx })
    }

    /// Stop the writer task without flushing.
    ///
    /// The write in flight and every queued write fail with
    /// [`FrameError::WriterClosed`], and the writer is dropped without a
    /// graceful shutdown. For a peer that has stopped reading.
    pub fn abort(&self) {
        self.abort.cancel();
    }

    /// Whether the writer task has stopped accepting frames.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Completion of one queued write.
///
/// Dropping the ticket does not cancel the write.
#[must_use = "a write ticket does nothing unless awaited or dropped deliberately"]
#[derive(Debug)]
pub struct WriteTicket {
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for WriteTicket {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(FrameError::WriterClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

async fn run<W>(
    mut writer: FrameWriter<W>,
    mut rx: mpsc::UnboundedReceiver<Request>,
    mut on_failure: Option<FailureHook>,
    abort: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let request = tokio::select! {
            biased;
            _ = abort.cancelled() => None,
            request = rx.recv() => request,
        };
        let Some(request) = request else {
            break;
        };

        match request {
            Request::Write {
                message,
                encoding,
                done,
            } => {
                let result = tokio::select! {
                    biased;
                    _ = abort.cancelled() => Err(FrameError::WriterClosed),
                    result = writer.write_message(message, encoding) => result,
                };
                match result {
                    Ok(()) => {
                        let _ = done.send(Ok(()));
                    }
                    Err(FrameError::WriterClosed) => {
                        let _ = done.send(Err(FrameError::WriterClosed));
                        break;
                    }
                    Err(err) if !err.is_stream_failure() => {
                        warn!(error = %err, "dropping frame that could not be encoded");
                        let _ = done.send(Err(err));
                    }
                    Err(err) => {
                        warn!(error = %err, "frame write failed; aborting queued writes");
                        if let Some(hook) = on_failure.take() {
                            hook(&err);
                        }
                        let _ = done.send(Err(err));
                        drain(&mut rx, || FrameError::QueueAborted).await;
                        return;
                    }
                }
            }
            Request::Shutdown { done } => {
                let result = tokio::select! {
                    biased;
                    _ = abort.cancelled() => Err(FrameError::WriterClosed),
                    result = writer.shutdown() => result,
                };
                debug!(ok = result.is_ok(), "frame writer shut down");
                let _ = done.send(result);
                drain(&mut rx, || FrameError::WriterClosed).await;
                return;
            }
        }
    }

    if abort.is_cancelled() {
        debug!("write queue aborted");
        drain(&mut rx, || FrameError::WriterClosed).await;
        return;
    }

    // Every handle was dropped.
    let result = tokio::select! {
        biased;
        _ = abort.cancelled() => Err(FrameError::WriterClosed),
        result = writer.shutdown() => result,
    };
    if let Err(err) = result {
        debug!(error = %err, "frame writer shutdown failed");
    }
}

async fn drain(rx: &mut mpsc::UnboundedReceiver<Request>, err: impl Fn() -> FrameError) {
    rx.close();
    while let Some(request) = rx.recv().await {
        request.fail(err());
    }
}
