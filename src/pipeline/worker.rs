//! Single consumer worker
//!
//! The worker is the only writer to the durable store. It pulls one event at
//! a time, runs an insert-if-absent against the store and records the outcome.
//!
//! ```text
//! Running ──shutdown signal──► Draining ──in-flight item resolved──► Stopped
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::queue::QueueReceiver;
use super::stats::PipelineStats;
use crate::config::FaultPolicy;
use crate::store::{DedupStore, InsertOutcome};
use crate::types::{Event, WorkerState};

/// Result of one persist attempt as seen by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Stored { seq: i64 },
    Duplicate,
    /// Store fault that outlasted the fault policy
    Fault { error: String, attempts: u32 },
}

/// How a drain request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Worker finished its in-flight item and exited
    Clean,
    /// Bounded wait elapsed; the task was aborted
    TimedOut,
    /// Worker task panicked
    Panicked,
    /// Shutdown had already been performed
    AlreadyStopped,
}

enum Signal {
    Shutdown { sender_gone: bool },
    Next(Option<Event>),
}

/// The consumer loop. Construct with [`ConsumerWorker::new`] and start with
/// [`ConsumerWorker::spawn`].
pub struct ConsumerWorker {
    store: Arc<dyn DedupStore>,
    stats: Arc<PipelineStats>,
    queue: QueueReceiver,
    policy: FaultPolicy,
    shutdown: watch::Receiver<bool>,
}

impl ConsumerWorker {
    pub fn new(
        store: Arc<dyn DedupStore>,
        stats: Arc<PipelineStats>,
        queue: QueueReceiver,
        policy: FaultPolicy,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Self {
            store,
            stats,
            queue,
            policy,
            shutdown: shutdown_rx,
        };
        (worker, shutdown_tx)
    }

    /// Spawn the loop on the current tokio runtime
    pub fn spawn(self, shutdown_tx: watch::Sender<bool>) -> WorkerHandle {
        let stats = self.stats.clone();
        let join = tokio::spawn(self.run());
        WorkerHandle {
            shutdown_tx,
            join,
            stats,
        }
    }

    /// Run until shutdown is signalled or every producer is gone
    pub async fn run(mut self) {
        self.stats.set_worker_state(WorkerState::Running);
        info!(
            max_attempts = self.policy.max_attempts,
            "Consumer worker started"
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            // Shutdown is only observed between items, so an in-flight
            // attempt always resolves before the loop exits.
            let signal = tokio::select! {
                biased;
                changed = self.shutdown.changed() => Signal::Shutdown {
                    sender_gone: changed.is_err(),
                },
                event = self.queue.dequeue() => Signal::Next(event),
            };

            match signal {
                Signal::Shutdown { sender_gone } => {
                    if sender_gone || *self.shutdown.borrow() {
                        break;
                    }
                }
                Signal::Next(Some(event)) => {
                    self.process(event).await;
                }
                Signal::Next(None) => {
                    info!("Ingestion queue closed");
                    break;
                }
            }
        }

        self.stats.set_worker_state(WorkerState::Stopped);
        info!(
            abandoned = self.queue.depth(),
            "Consumer worker stopped"
        );
    }

    /// Persist one event and record its outcome
    ///
    /// The attempt runs in its own task, so aborting the worker loop never
    /// cancels a commit that was already issued. That task records the
    /// outcome even if nobody awaits it any more.
    pub async fn process(&self, event: Event) -> PersistOutcome {
        self.stats.begin_in_flight();
        let task = PersistTask {
            store: self.store.clone(),
            stats: self.stats.clone(),
            policy: self.policy.clone(),
        };

        match tokio::spawn(task.run(event)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if self.stats.take_in_flight() {
                    self.stats.record_failed();
                }
                error!(error = %e, "Persist task panicked");
                PersistOutcome::Fault {
                    error: e.to_string(),
                    attempts: 0,
                }
            }
        }
    }
}

/// One item's trip through the store under the fault policy
struct PersistTask {
    store: Arc<dyn DedupStore>,
    stats: Arc<PipelineStats>,
    policy: FaultPolicy,
}

impl PersistTask {
    async fn run(self, event: Event) -> PersistOutcome {
        let outcome = self.persist(&event).await;

        // Whoever takes the in-flight flag owns the count
        if self.stats.take_in_flight() {
            let key = event.key();
            match &outcome {
                PersistOutcome::Stored { seq } => {
                    self.stats.record_stored();
                    debug!(%key, seq, "Stored event");
                }
                PersistOutcome::Duplicate => {
                    self.stats.record_duplicate();
                    debug!(%key, "Dropped duplicate event");
                }
                PersistOutcome::Fault { error, attempts } => {
                    self.stats.record_failed();
                    error!(
                        %key,
                        attempts,
                        error = %error,
                        "Failed to persist event, dropping"
                    );
                }
            }
        }

        outcome
    }

    async fn persist(&self, event: &Event) -> PersistOutcome {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = self
                .store
                .insert_if_absent_within(event, self.policy.persist_timeout)
                .await;

            match result {
                Ok(InsertOutcome::Stored { seq }) => return PersistOutcome::Stored { seq },
                Ok(InsertOutcome::Duplicate) => return PersistOutcome::Duplicate,
                Err(e) => {
                    if !e.is_transient() || attempt >= self.policy.max_attempts {
                        return PersistOutcome::Fault {
                            error: e.to_string(),
                            attempts: attempt,
                        };
                    }

                    let delay = self.policy.backoff_for(attempt);
                    warn!(
                        key = %event.key(),
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Persist attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Owner-side handle to a running worker
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: Arc<PipelineStats>,
}

impl WorkerHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Request a drain and wait up to `timeout` for the worker to exit
    ///
    /// On timeout the loop is aborted. The item that was in flight keeps its
    /// own task and is recorded with its real outcome if it settles within a
    /// second `timeout`; otherwise it is counted as failed.
    pub async fn shutdown(self, timeout: Duration) -> DrainOutcome {
        let WorkerHandle {
            shutdown_tx,
            mut join,
            stats,
        } = self;

        if !join.is_finished() {
            stats.set_worker_state(WorkerState::Draining);
        }
        let _ = shutdown_tx.send(true);

        match tokio::time::timeout(timeout, &mut join).await {
            Ok(Ok(())) => DrainOutcome::Clean,
            Ok(Err(e)) => {
                error!(error = %e, "Consumer worker panicked");
                stats.set_worker_state(WorkerState::Stopped);
                DrainOutcome::Panicked
            }
            Err(_) => {
                join.abort();
                let _ = join.await;
                stats.set_worker_state(WorkerState::Stopped);
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Consumer worker did not drain in time, aborted"
                );

                // The in-flight persist task outlives the loop; give it the
                // same bound to report before writing it off
                if !settle_in_flight(&stats, timeout).await && stats.take_in_flight() {
                    stats.record_failed();
                    warn!("In-flight event did not settle, counted as failed");
                }
                DrainOutcome::TimedOut
            }
        }
    }
}

/// Wait until no item is in flight, up to `timeout`
async fn settle_in_flight(stats: &PipelineStats, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while stats.is_in_flight() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}
