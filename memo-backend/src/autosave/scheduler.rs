//! SaveScheduler — tokio driver for the autosave state machine
//!
//! A single background task owns the `SaveMachine`, the two timer deadlines
//! and at most one in-flight commit future. Callers talk to it through an
//! unbounded channel and read status through a `watch` channel, so `observe`,
//! `flush` and `reset` never block and never fail.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};

use super::machine::{CommitOutcome, SaveEffect, SaveEvent, SaveMachine, SaveSnapshot, TimerKind};
use crate::config::SchedulerConfig;
use memo_types::SaveStatus;

/// Performs one durable write attempt for an observed value
#[async_trait]
pub trait Committer<T>: Send + Sync {
    async fn commit(&self, value: T) -> Result<(), String>;
}

type CommitFuture = BoxFuture<'static, Result<(), String>>;

/// Handle to a running autosave task
pub struct SaveScheduler<T> {
    events: mpsc::UnboundedSender<SaveEvent<T>>,
    snapshot: watch::Receiver<SaveSnapshot>,
}

impl<T> SaveScheduler<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Spawn the scheduler task on the current tokio runtime
    pub fn spawn(config: SchedulerConfig, committer: Arc<dyn Committer<T>>) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(SaveSnapshot::default());
        let machine = SaveMachine::new(config);
        tokio::spawn(run(machine, rx, committer, snapshot_tx));

        Self { events, snapshot }
    }

    /// Report the latest value. Unchanged values are ignored.
    pub fn observe(&self, value: T) {
        self.send(SaveEvent::Edit(value));
    }

    /// Commit the latest observed value now, skipping the debounce wait
    pub fn flush(&self) {
        self.send(SaveEvent::Flush);
    }

    /// Cancel pending work and return to idle
    pub fn reset(&self) {
        self.send(SaveEvent::Reset);
    }

    /// Record `value` as already persisted so observing it again is a no-op
    pub fn seed(&self, value: T) {
        self.send(SaveEvent::Seed(value));
    }

    pub fn status(&self) -> SaveStatus {
        self.snapshot.borrow().status
    }

    pub fn snapshot(&self) -> SaveSnapshot {
        *self.snapshot.borrow()
    }

    /// Receiver that wakes on every status change
    pub fn subscribe(&self) -> watch::Receiver<SaveSnapshot> {
        self.snapshot.clone()
    }

    fn send(&self, event: SaveEvent<T>) {
        if self.events.send(event).is_err() {
            log::warn!("[AUTOSAVE] Scheduler task is gone, event dropped");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn settle(in_flight: &mut Option<(u64, CommitFuture)>) -> (u64, Result<(), String>) {
    match in_flight {
        Some((attempt, fut)) => (*attempt, fut.await),
        None => std::future::pending().await,
    }
}

async fn run<T>(
    mut machine: SaveMachine<T>,
    mut events: mpsc::UnboundedReceiver<SaveEvent<T>>,
    committer: Arc<dyn Committer<T>>,
    snapshot_tx: watch::Sender<SaveSnapshot>,
) where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let mut debounce_at: Option<Instant> = None;
    let mut retry_at: Option<Instant> = None;
    let mut in_flight: Option<(u64, CommitFuture)> = None;
    let mut closed = false;

    loop {
        // Once every handle is gone, let the in-flight commit finish and stop
        if closed && in_flight.is_none() {
            break;
        }

        let event = tokio::select! {
            received = events.recv(), if !closed => match received {
                Some(event) => event,
                None => {
                    closed = true;
                    continue;
                }
            },
            _ = wait_until(debounce_at), if !closed => {
                debounce_at = None;
                SaveEvent::TimerFired(TimerKind::Debounce)
            }
            _ = wait_until(retry_at), if !closed => {
                retry_at = None;
                SaveEvent::TimerFired(TimerKind::Retry)
            }
            (attempt, result) = settle(&mut in_flight) => {
                in_flight = None;
                let outcome = match result {
                    Ok(()) => {
                        log::debug!("[AUTOSAVE] Commit attempt {} succeeded", attempt);
                        CommitOutcome::Success
                    }
                    Err(e) => {
                        log::warn!("[AUTOSAVE] Commit attempt {} failed: {}", attempt, e);
                        CommitOutcome::Failure(e)
                    }
                };
                SaveEvent::CommitSettled { attempt, outcome }
            }
        };

        let was_failure = matches!(
            event,
            SaveEvent::CommitSettled {
                outcome: CommitOutcome::Failure(_),
                ..
            }
        );

        for effect in machine.handle(event, Utc::now()) {
            match effect {
                SaveEffect::StartTimer { kind, delay } => {
                    let deadline = Some(Instant::now() + delay);
                    match kind {
                        TimerKind::Debounce => debounce_at = deadline,
                        TimerKind::Retry => {
                            log::warn!(
                                "[AUTOSAVE] Retry {}/{} in {:?}",
                                machine.retry_count(),
                                machine.config().max_retries,
                                delay
                            );
                            retry_at = deadline;
                        }
                    }
                }
                SaveEffect::CancelTimer(TimerKind::Debounce) => debounce_at = None,
                SaveEffect::CancelTimer(TimerKind::Retry) => retry_at = None,
                SaveEffect::Commit { attempt, value } => {
                    debug_assert!(in_flight.is_none(), "commit started while another is in flight");
                    let committer = Arc::clone(&committer);
                    let commit: CommitFuture = Box::pin(async move { committer.commit(value).await });
                    in_flight = Some((attempt, commit));
                }
            }
        }

        if was_failure && machine.status() == SaveStatus::Error {
            log::error!("[AUTOSAVE] Retries exhausted, giving up until the next edit or flush");
        }

        snapshot_tx.send_replace(machine.snapshot());
    }

    log::debug!("[AUTOSAVE] Scheduler task stopped");
}
