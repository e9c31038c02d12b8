//! Transport-agnostic batching publisher core.
//!
//! All buffer, timer and pipeline state is owned by a single worker
//! task; the [`Publisher`] handle talks to it over an unbounded channel,
//! so `publish` never blocks and commands are processed strictly in
//! arrival order. That gives the send pipeline its guarantees for free:
//! at most one batch is on the wire per publisher, batches go out in
//! buffer order, and a failed batch is never overtaken by a later one.
//!
//! Delivery is at-least-once: a batch that exhausts its per-send retry
//! budget is reinserted at the front of the buffer together with every
//! batch queued behind it, and a new flush is scheduled. There is no
//! give-up threshold; a permanently unreachable transport grows the
//! buffer without bound (known risk, kept deliberately).

use crate::model::{NormalizedMessage, PublishMeta};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Attempts per batch before it is requeued.
const MAX_SEND_ATTEMPTS: u32 = 3;
/// Base backoff per failed attempt: `min(200 * attempt, 1000)` ms.
const RETRY_BASE_MS: u64 = 200;
const RETRY_CAP_MS: u64 = 1000;

/// The adapter-supplied network strategy. Implementations must surface
/// every transport failure as an error; swallowing one breaks the
/// at-least-once guarantee.
#[async_trait]
pub trait BatchTransport<E>: Send + Sync + 'static {
    async fn send_batch(&self, batch: &[E]) -> Result<()>;
}

/// Encoder strategy: one normalized message into zero or more events.
pub type EncodeFn<E> =
    Box<dyn Fn(&NormalizedMessage, &PublishMeta) -> Result<Vec<E>> + Send + Sync + 'static>;

/// Optional allow-list filter applied after encoding.
pub type FilterFn<E> = Box<dyn Fn(&E) -> bool + Send + Sync + 'static>;

enum Command {
    Publish {
        message: Box<NormalizedMessage>,
        meta: PublishMeta,
    },
    Flush(oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<Result<()>>),
}

/// Handle to one publisher instance. Cheap to share through `&self`;
/// all state lives in the worker task.
pub struct Publisher {
    tx: mpsc::UnboundedSender<Command>,
}

impl Publisher {
    /// Spawns the worker task and returns its handle.
    pub fn spawn<E, T>(
        transport: T,
        encode: EncodeFn<E>,
        filter: Option<FilterFn<E>>,
        max_batch_size: usize,
        max_batch_delay: Duration,
    ) -> Self
    where
        E: Send + Sync + 'static,
        T: BatchTransport<E>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            rx,
            transport,
            encode,
            filter,
            max_batch_size: max_batch_size.max(1),
            max_batch_delay,
            buffer: VecDeque::new(),
        };
        tokio::spawn(worker.run());
        Self { tx }
    }

    /// Buffers one message for delivery. Never blocks; a no-op after
    /// `close()`. Encode and delivery failures are logged by the worker,
    /// not returned here.
    pub fn publish(&self, message: NormalizedMessage, meta: PublishMeta) {
        let _ = self.tx.send(Command::Publish {
            message: Box::new(message),
            meta,
        });
    }

    /// Drains the buffer through the send pipeline. Resolves once every
    /// send enqueued up to this point has completed; returns the
    /// pipeline error if a batch exhausted its retries (the events stay
    /// buffered and a retry flush is already scheduled).
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).is_err() {
            // Worker already stopped: nothing buffered, nothing to do.
            return Ok(());
        }
        done.await.unwrap_or(Err(Error::Closed))
    }

    /// Final flush, pipeline drain, then worker shutdown. Idempotent:
    /// a second call observes an already-stopped worker and succeeds.
    pub async fn close(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Close(ack)).is_err() {
            return Ok(());
        }
        done.await.unwrap_or(Ok(()))
    }
}

struct Worker<E, T> {
    rx: mpsc::UnboundedReceiver<Command>,
    transport: T,
    encode: EncodeFn<E>,
    filter: Option<FilterFn<E>>,
    max_batch_size: usize,
    max_batch_delay: Duration,
    buffer: VecDeque<E>,
}

impl<E, T> Worker<E, T>
where
    E: Send + Sync + 'static,
    T: BatchTransport<E>,
{
    async fn run(mut self) {
        // Single timer, re-armed as needed; `armed` gates the select arm.
        let timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(timer);
        let mut armed = false;

        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    None => break,
                    Some(Command::Publish { message, meta }) => {
                        self.ingest(&message, &meta);
                        if self.buffer.len() >= self.max_batch_size {
                            armed = false;
                            if self.run_pipeline().await.is_err() {
                                timer.as_mut().reset(Instant::now());
                                armed = true;
                            }
                        } else if !armed && !self.buffer.is_empty() {
                            timer.as_mut().reset(Instant::now() + self.max_batch_delay);
                            armed = true;
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        armed = false;
                        let res = self.run_pipeline().await;
                        if res.is_err() {
                            timer.as_mut().reset(Instant::now());
                            armed = true;
                        }
                        let _ = ack.send(res);
                    }
                    Some(Command::Close(ack)) => {
                        let res = self.run_pipeline().await;
                        if let Err(ref e) = res {
                            warn!(
                                error = %e,
                                remaining = self.buffer.len(),
                                "closing with undeliverable buffered events"
                            );
                        }
                        let _ = ack.send(res);
                        break;
                    }
                },
                _ = &mut timer, if armed => {
                    armed = false;
                    if self.run_pipeline().await.is_err() {
                        timer.as_mut().reset(Instant::now());
                        armed = true;
                    }
                }
            }
        }
    }

    fn ingest(&mut self, message: &NormalizedMessage, meta: &PublishMeta) {
        match (self.encode)(message, meta) {
            Ok(events) => {
                for event in events {
                    if self.filter.as_ref().map_or(true, |f| f(&event)) {
                        self.buffer.push_back(event);
                    }
                }
            }
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "dropping message that failed to encode");
            }
        }
    }

    /// Partitions the buffer into ordered batches and sends them one at
    /// a time. On a batch failure the failed batch and every batch
    /// behind it return to the buffer front in original order.
    async fn run_pipeline(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut batches: VecDeque<Vec<E>> = VecDeque::new();
        while !self.buffer.is_empty() {
            let take = self.buffer.len().min(self.max_batch_size);
            batches.push_back(self.buffer.drain(..take).collect());
        }
        debug!(batches = batches.len(), "running send pipeline");

        while let Some(batch) = batches.pop_front() {
            if let Err(e) = self.send_with_retry(&batch).await {
                warn!(error = %e, "batch failed after retries, requeueing pipeline");
                batches.push_front(batch);
                // Reinsert back-to-front so the buffer ends up in the
                // original relative order.
                while let Some(b) = batches.pop_back() {
                    for event in b.into_iter().rev() {
                        self.buffer.push_front(event);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn send_with_retry(&self, batch: &[E]) -> Result<()> {
        let mut attempt: u32 = 1;
        loop {
            match self.transport.send_batch(batch).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MAX_SEND_ATTEMPTS => {
                    let delay = (RETRY_BASE_MS * u64::from(attempt)).min(RETRY_CAP_MS);
                    warn!(
                        attempt,
                        delay_ms = delay,
                        error = %e,
                        "batch send failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
