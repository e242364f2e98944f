//! Coalescing work queue.
//!
//! Buffers work for a fixed delay measured from the first unflushed item and
//! hands the whole buffer to a [`BatchProcessor`] as one ordered batch.
//!
//! # Design
//! - `add_work` only appends under a short lock; it never waits on processing
//! - A single worker task owns flushing, so batches never run concurrently
//! - Work added during a flush accumulates for the next window
//! - A failed or panicking batch is logged and the worker moves on
//! - Cancellation stops scheduling; a running batch sees the token and is
//!   expected to return early

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::is_cancellation;
use crate::perf::{self, TimingGuard};

/// Consumer of flushed batches
#[async_trait]
pub trait BatchProcessor<T>: Send + Sync + 'static {
    async fn process_batch(&self, batch: Vec<T>, token: &CancellationToken) -> anyhow::Result<()>;
}

struct Pending<T> {
    items: VecDeque<T>,
    first_added_at: Option<Instant>,
}

struct Shared<T> {
    pending: Mutex<Pending<T>>,
    notify: Notify,
}

impl<T> Shared<T> {
    fn first_added_at(&self) -> Option<Instant> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .first_added_at
    }

    /// Take up to `limit` items (0 = all). Leftovers keep their original
    /// window start, so they are due immediately.
    fn take_batch(&self, limit: usize) -> Vec<T> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let count = if limit == 0 {
            pending.items.len()
        } else {
            limit.min(pending.items.len())
        };
        let batch: Vec<T> = pending.items.drain(..count).collect();
        if pending.items.is_empty() {
            pending.first_added_at = None;
        }
        batch
    }
}

/// Debounced batching queue with a single background consumer
pub struct CoalescingWorkQueue<T> {
    shared: Arc<Shared<T>>,
    token: CancellationToken,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> CoalescingWorkQueue<T> {
    /// Create the queue and start its worker. Must be called within a tokio
    /// runtime. Cancelling `token` stops the worker.
    pub fn new(
        delay: Duration,
        processor: Arc<dyn BatchProcessor<T>>,
        token: &CancellationToken,
    ) -> Self {
        Self::new_with_limit(delay, 0, processor, token)
    }

    /// Like [`new`](Self::new), flushing at most `max_batch_size` items at a
    /// time (0 = unbounded)
    pub fn new_with_limit(
        delay: Duration,
        max_batch_size: usize,
        processor: Arc<dyn BatchProcessor<T>>,
        token: &CancellationToken,
    ) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending {
                items: VecDeque::new(),
                first_added_at: None,
            }),
            notify: Notify::new(),
        });
        let token = token.child_token();

        let handle = tokio::spawn(Self::run_worker(
            shared.clone(),
            processor,
            delay,
            max_batch_size,
            token.clone(),
        ));

        Self {
            shared,
            token,
            worker_handle: Mutex::new(Some(handle)),
        }
    }

    /// Append one item. Never blocks on processing.
    pub fn add_work(&self, item: T) {
        self.add_work_many(std::iter::once(item));
    }

    /// Append items in order
    pub fn add_work_many(&self, items: impl IntoIterator<Item = T>) {
        if self.token.is_cancelled() {
            log::trace!("Dropping work added after queue cancellation");
            return;
        }

        let schedule = {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let before = pending.items.len();
            pending.items.extend(items);
            if pending.items.len() == before {
                return;
            }
            if pending.first_added_at.is_none() {
                pending.first_added_at = Some(Instant::now());
                true
            } else {
                false
            }
        };

        // Only the first item of a window starts the timer
        if schedule {
            self.shared.notify.notify_one();
        }
    }

    pub fn pending_len(&self) -> usize {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop scheduling flushes. A batch already running is left to finish.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            log::info!("Shutting down work queue ({} pending)", self.pending_len());
        }
        self.token.cancel();
    }

    /// Shut down and wait for the worker to exit
    pub async fn join(&self) {
        self.shutdown();
        let handle = self
            .worker_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("Work queue worker terminated abnormally: {}", e);
            }
        }
    }

    async fn run_worker(
        shared: Arc<Shared<T>>,
        processor: Arc<dyn BatchProcessor<T>>,
        delay: Duration,
        max_batch_size: usize,
        token: CancellationToken,
    ) {
        log::info!("Work queue worker started (delay {:?})", delay);

        loop {
            let window_start = loop {
                if let Some(at) = shared.first_added_at() {
                    break at;
                }
                tokio::select! {
                    _ = token.cancelled() => {
                        log::info!("Work queue worker stopped");
                        return;
                    }
                    _ = shared.notify.notified() => {}
                }
            };

            tokio::select! {
                _ = token.cancelled() => {
                    log::info!("Work queue worker stopped");
                    return;
                }
                _ = tokio::time::sleep_until(window_start + delay) => {}
            }

            let batch = shared.take_batch(max_batch_size);
            if batch.is_empty() {
                continue;
            }

            Self::run_batch(&processor, batch, &token).await;
        }
    }

    async fn run_batch(
        processor: &Arc<dyn BatchProcessor<T>>,
        batch: Vec<T>,
        token: &CancellationToken,
    ) {
        let size = batch.len();
        let _timer = TimingGuard::with_threshold("queue_flush", 250);
        let counters = perf::counters();

        // Run on its own task so a panicking processor cannot take the
        // worker down with it
        let task = {
            let processor = processor.clone();
            let token = token.clone();
            tokio::spawn(async move { processor.process_batch(batch, &token).await })
        };

        match task.await {
            Ok(Ok(())) => {
                perf::bump(&counters.batches_flushed);
                log::trace!("Flushed batch of {} items", size);
            }
            Ok(Err(err)) if token.is_cancelled() || is_cancellation(&err) => {
                log::trace!("Batch of {} items cancelled", size);
            }
            Ok(Err(err)) => {
                perf::bump(&counters.batches_failed);
                log::warn!("Batch of {} items failed: {:#}", size, err);
            }
            Err(join_err) => {
                perf::bump(&counters.batches_failed);
                log::error!("Batch of {} items panicked: {}", size, join_err);
            }
        }
    }
}

impl<T> Drop for CoalescingWorkQueue<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
