//! Bounded ingestion queue between the subscription supervisor and the
//! batch flusher
//!
//! Built on a bounded `tokio::sync::mpsc` channel. The producer half never
//! waits: when the channel is full the offered record is dropped and counted.
//! The consumer half waits with a timeout so the flusher can drive its idle
//! trigger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Log every Nth drop after the first so a stalled consumer doesn't flood logs
const DROP_LOG_EVERY: u64 = 1000;

#[derive(Debug, Default)]
struct QueueCounters {
    accepted: AtomicU64,
    dropped: AtomicU64,
}

/// Result of a timed `take`
#[derive(Debug, PartialEq, Eq)]
pub enum Take<T> {
    Item(T),
    Timeout,
    /// Every producer is gone and the queue is drained
    Closed,
}

/// Create a queue holding at most `capacity` records
pub fn ingestion_queue<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let counters = Arc::new(QueueCounters::default());
    (
        QueueProducer {
            tx,
            counters: Arc::clone(&counters),
        },
        QueueConsumer { rx, counters },
    )
}

#[derive(Debug)]
pub struct QueueProducer<T> {
    tx: mpsc::Sender<T>,
    counters: Arc<QueueCounters>,
}

impl<T> Clone for QueueProducer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T> QueueProducer<T> {
    /// Enqueue without waiting. Returns `false` if the record was dropped
    /// because the queue is full or the consumer has gone away.
    pub fn offer(&self, record: T) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % DROP_LOG_EVERY == 0 {
                    log::warn!(
                        "⚠️  Ingestion queue full ({}), dropping record (dropped so far: {})",
                        self.capacity(),
                        dropped
                    );
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("⚠️  Ingestion queue closed, dropping record");
                false
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Records currently buffered
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn accepted(&self) -> u64 {
        self.counters.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct QueueConsumer<T> {
    rx: mpsc::Receiver<T>,
    counters: Arc<QueueCounters>,
}

impl<T> QueueConsumer<T> {
    /// Wait up to `timeout` for the next record
    pub async fn take(&mut self, timeout: Duration) -> Take<T> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(record)) => Take::Item(record),
            Ok(None) => Take::Closed,
            Err(_) => Take::Timeout,
        }
    }

    /// Next buffered record, if any, without waiting
    pub fn try_take(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Refuse further offers; already-buffered records can still be taken
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}
