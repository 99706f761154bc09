//! Generic bounded async batching.
//!
//! A [`Batcher`] accepts items through a bounded queue and hands them to a
//! [`BatchFlush`] implementation in batches, from a single dedicated drain
//! task. Flushes trigger on batch size and on a fixed interval. A failed
//! flush retains the batch for a later retry; producers never observe
//! flush errors. The only producer-facing backpressure is [`Batcher::add`]
//! blocking while the queue is full.

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Default batch capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Destination for drained batches.
///
/// Implementations decide what "delivering a batch" means: an HTTP POST,
/// a file append, a test recorder. A returned [`FlushError`] tells the
/// drain loop to keep the batch and try again later, so `flush` must be
/// safe to call repeatedly with the same leading items.
///
/// ```
/// use async_trait::async_trait;
/// use logvine::batcher::{BatchFlush, FlushError};
/// use std::sync::{Arc, Mutex};
///
/// #[derive(Clone, Default)]
/// struct Collecting(Arc<Mutex<Vec<String>>>);
///
/// #[async_trait]
/// impl BatchFlush<String> for Collecting {
///     async fn flush(&self, batch: &[String]) -> Result<(), FlushError> {
///         self.0.lock().unwrap().extend_from_slice(batch);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait BatchFlush<T>: Send + Sync {
    async fn flush(&self, batch: &[T]) -> Result<(), FlushError>;
}

/// A batch could not be delivered; the batcher will retain it and retry.
#[derive(Debug, Error)]
#[error("batch flush failed: {message}")]
pub struct FlushError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl FlushError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Errors surfaced to batcher producers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatcherError {
    /// The batcher was closed; the item was not accepted.
    #[error("batcher is closed")]
    Closed,
}

/// What to do with new items once the retained batch hits `max_pending`.
///
/// Only relevant while flushes keep failing: a healthy batcher never
/// retains more than one batch worth of items.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest retained item to make room for the new one.
    #[default]
    DropOldest,
    /// Discard the incoming item and keep the retained batch as is.
    DropNewest,
}

/// Batcher tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct BatcherConfig {
    /// Items per batch; also the bounded queue depth that blocks `add`.
    pub capacity: usize,
    /// How often a non-empty partial batch is flushed. A zero interval
    /// is treated as one millisecond.
    pub flush_interval: Duration,
    /// Upper bound on items retained across failed flushes. Values below
    /// `capacity` are treated as `capacity`.
    pub max_pending: usize,
    /// Drop strategy once `max_pending` is reached.
    pub overflow: OverflowPolicy,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_pending: DEFAULT_CAPACITY * 4,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl BatcherConfig {
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    #[must_use]
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }
}

/// Bounded batcher with a dedicated drain task.
///
/// All batch state is owned by the drain task; producers only touch the
/// queue. Items flush in arrival order, one flush at a time. Closing the
/// batcher stops the task without a final flush, so items still queued or
/// retained at that point are dropped.
///
/// ```no_run
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use logvine::batcher::{BatchFlush, Batcher, BatcherConfig, FlushError};
///
/// struct Printer;
///
/// #[async_trait]
/// impl BatchFlush<u64> for Printer {
///     async fn flush(&self, batch: &[u64]) -> Result<(), FlushError> {
///         println!("{} items", batch.len());
///         Ok(())
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let config = BatcherConfig::default()
///         .with_capacity(50)
///         .with_flush_interval(Duration::from_millis(250));
///     let batcher = Batcher::spawn(config, Printer);
///
///     for n in 0..200 {
///         batcher.add_async(n).await.expect("batcher open");
///     }
///     batcher.close().await;
/// }
/// ```
pub struct Batcher<T> {
    tx: flume::Sender<T>,
    worker: Mutex<Option<WorkerState>>,
    dropped: Arc<AtomicU64>,
}

struct WorkerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

impl<T: Send + 'static> Batcher<T> {
    /// Start the drain task and return the producer handle.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<F>(config: BatcherConfig, flush: F) -> Self
    where
        F: BatchFlush<T> + 'static,
    {
        let capacity = config.capacity.max(1);
        let max_pending = config.max_pending.max(capacity);
        // tokio's interval panics on a zero period
        let flush_interval = config.flush_interval.max(Duration::from_millis(1));

        let (tx, rx) = flume::bounded(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let dropped = Arc::new(AtomicU64::new(0));

        let handle = task::spawn(drain(
            capacity,
            max_pending,
            config.overflow,
            flush_interval,
            rx,
            shutdown_rx,
            flush,
            Arc::clone(&dropped),
        ));

        Self {
            tx,
            worker: Mutex::new(Some(WorkerState {
                shutdown_tx,
                handle,
            })),
            dropped,
        }
    }

    /// Enqueue an item, blocking the calling thread while the queue is
    /// full.
    ///
    /// This is the synchronous producer entry point; do not call it from
    /// an async task, use [`Batcher::add_async`] there instead.
    pub fn add(&self, item: T) -> Result<(), BatcherError> {
        self.tx.send(item).map_err(|_| BatcherError::Closed)
    }

    /// Enqueue an item, waiting while the queue is full.
    pub async fn add_async(&self, item: T) -> Result<(), BatcherError> {
        self.tx
            .send_async(item)
            .await
            .map_err(|_| BatcherError::Closed)
    }

    /// Stop the drain task and wait for it to exit.
    ///
    /// No final flush happens: queued and retained items are dropped.
    /// Subsequent `add` calls fail with [`BatcherError::Closed`].
    /// Idempotent.
    pub async fn close(&self) {
        let state = {
            let mut guard = self.worker.lock().expect("batcher worker lock poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }

    /// Number of items discarded by the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Drop for Batcher<T> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.worker.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn drain<T, F>(
    capacity: usize,
    max_pending: usize,
    overflow: OverflowPolicy,
    flush_interval: Duration,
    rx: flume::Receiver<T>,
    mut shutdown_rx: oneshot::Receiver<()>,
    flush: F,
    dropped: Arc<AtomicU64>,
) where
    T: Send + 'static,
    F: BatchFlush<T>,
{
    let mut batch: VecDeque<T> = VecDeque::with_capacity(capacity);
    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + flush_interval, flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                if !batch.is_empty() {
                    debug!(pending = batch.len(), "batcher closed with undelivered items");
                }
                break;
            }
            recv = rx.recv_async() => match recv {
                Err(_) => {
                    // All producer handles dropped.
                    if !batch.is_empty() {
                        debug!(pending = batch.len(), "batcher disconnected with undelivered items");
                    }
                    break;
                }
                Ok(item) => {
                    if batch.len() >= capacity {
                        // The batch went stale after a failed flush; retry
                        // before accepting more items.
                        try_flush(&flush, &mut batch).await;
                    }

                    if batch.len() >= max_pending {
                        match overflow {
                            OverflowPolicy::DropOldest => {
                                batch.pop_front();
                                batch.push_back(item);
                            }
                            OverflowPolicy::DropNewest => drop(item),
                        }
                        let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(
                            policy = ?overflow,
                            max_pending,
                            dropped_total = total,
                            "pending batch is full, dropping an item"
                        );
                    } else {
                        batch.push_back(item);
                    }

                    if batch.len() >= capacity {
                        try_flush(&flush, &mut batch).await;
                    }
                }
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    try_flush(&flush, &mut batch).await;
                }
            }
        }
    }
}

async fn try_flush<T, F>(flush: &F, batch: &mut VecDeque<T>) -> bool
where
    T: Send + 'static,
    F: BatchFlush<T>,
{
    let items: &[T] = batch.make_contiguous();
    match flush.flush(items).await {
        Ok(()) => {
            batch.clear();
            true
        }
        Err(err) => {
            warn!(error = %err, pending = batch.len(), "batch flush failed, retaining batch");
            false
        }
    }
}
