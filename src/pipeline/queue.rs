//! In-process FIFO ingestion queue
//!
//! Producers hold an [`IngestQueue`]; the single worker owns the matching
//! [`QueueReceiver`]. Depth is tracked separately so it can be read without
//! consuming.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::{AggregatorError, AggregatorResult};
use crate::types::Event;

enum Sender {
    Unbounded(mpsc::UnboundedSender<Event>),
    Bounded(mpsc::Sender<Event>),
}

enum Receiver {
    Unbounded(mpsc::UnboundedReceiver<Event>),
    Bounded(mpsc::Receiver<Event>),
}

/// Producer side of the ingestion queue
pub struct IngestQueue {
    tx: Sender,
    depth: Arc<AtomicUsize>,
    capacity: Option<usize>,
}

/// Consumer side of the ingestion queue, owned by the worker
pub struct QueueReceiver {
    rx: Receiver,
    depth: Arc<AtomicUsize>,
}

/// Create a queue; `None` capacity means unbounded
pub fn channel(capacity: Option<usize>) -> (IngestQueue, QueueReceiver) {
    let depth = Arc::new(AtomicUsize::new(0));

    let (tx, rx) = match capacity {
        Some(cap) => {
            let (tx, rx) = mpsc::channel(cap.max(1));
            (Sender::Bounded(tx), Receiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Sender::Unbounded(tx), Receiver::Unbounded(rx))
        }
    };

    (
        IngestQueue {
            tx,
            depth: depth.clone(),
            capacity: capacity.map(|cap| cap.max(1)),
        },
        QueueReceiver { rx, depth },
    )
}

impl IngestQueue {
    /// Queue one event without waiting on persistence
    ///
    /// Fails with `QueueFull` when a bounded queue is at capacity and with
    /// `QueueClosed` once the worker is gone. Nothing is dropped silently.
    pub fn enqueue(&self, event: Event) -> AggregatorResult<()> {
        // Count before sending so the worker never decrements below zero
        self.depth.fetch_add(1, Ordering::SeqCst);

        let result = match &self.tx {
            Sender::Unbounded(tx) => tx.send(event).map_err(|_| AggregatorError::QueueClosed),
            Sender::Bounded(tx) => tx.try_send(event).map_err(|e| match e {
                TrySendError::Full(_) => AggregatorError::QueueFull {
                    capacity: self.capacity.unwrap_or_default(),
                },
                TrySendError::Closed(_) => AggregatorError::QueueClosed,
            }),
        };

        if result.is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    /// Items waiting to be consumed
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// True once the receiving worker has gone away
    pub fn is_closed(&self) -> bool {
        match &self.tx {
            Sender::Unbounded(tx) => tx.is_closed(),
            Sender::Bounded(tx) => tx.is_closed(),
        }
    }
}

impl QueueReceiver {
    /// Next event in FIFO order, waiting until one is available
    ///
    /// Returns `None` once every producer is gone and the queue is empty.
    pub async fn dequeue(&mut self) -> Option<Event> {
        let event = match &mut self.rx {
            Receiver::Unbounded(rx) => rx.recv().await,
            Receiver::Bounded(rx) => rx.recv().await,
        };

        if event.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        event
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}
