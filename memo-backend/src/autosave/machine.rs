//! Pure autosave state machine.
//!
//! Every debounce, retry and concurrency decision is made here from events;
//! the machine never sleeps or performs I/O. It answers each event with the
//! effects the driver must carry out (arm/cancel a timer, start a commit).

use chrono::{DateTime, Utc};
use memo_types::SaveStatus;
use std::time::Duration;

use crate::config::SchedulerConfig;

/// The two timers the machine can arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Debounce,
    Retry,
}

/// How a commit attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Success,
    Failure(String),
}

/// Inputs to the machine
#[derive(Debug, Clone, PartialEq)]
pub enum SaveEvent<T> {
    /// A new value was observed
    Edit(T),
    /// Record a baseline value without scheduling a commit
    Seed(T),
    /// Commit the latest value now
    Flush,
    /// Back to idle, forgetting pending work
    Reset,
    TimerFired(TimerKind),
    CommitSettled { attempt: u64, outcome: CommitOutcome },
}

/// Work the driver must perform
#[derive(Debug, Clone, PartialEq)]
pub enum SaveEffect<T> {
    StartTimer { kind: TimerKind, delay: Duration },
    CancelTimer(TimerKind),
    Commit { attempt: u64, value: T },
}

/// Observable state published to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveSnapshot {
    pub status: SaveStatus,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

pub struct SaveMachine<T> {
    config: SchedulerConfig,
    status: SaveStatus,
    latest: Option<T>,
    /// Last value known to be durable (seeded or successfully committed)
    persisted: Option<T>,
    retry_count: u32,
    last_saved_at: Option<DateTime<Utc>>,
    debounce_armed: bool,
    retry_armed: bool,
    /// Attempt currently running, if any, and the value it carries
    in_flight: Option<u64>,
    committing: Option<T>,
    /// In-flight attempt whose outcome no longer matters (a reset happened)
    superseded: Option<u64>,
    /// A timer or flush asked for an attempt while one was in flight
    queued: bool,
    next_attempt: u64,
}

impl<T: Clone + PartialEq> SaveMachine<T> {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            status: SaveStatus::Idle,
            latest: None,
            persisted: None,
            retry_count: 0,
            last_saved_at: None,
            debounce_armed: false,
            retry_armed: false,
            in_flight: None,
            committing: None,
            superseded: None,
            queued: false,
            next_attempt: 1,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn latest(&self) -> Option<&T> {
        self.latest.as_ref()
    }

    /// Whether the latest observed value still needs to be committed
    pub fn has_unsaved(&self) -> bool {
        self.latest.is_some() && self.latest != self.persisted
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Debounce => self.debounce_armed,
            TimerKind::Retry => self.retry_armed,
        }
    }

    pub fn snapshot(&self) -> SaveSnapshot {
        SaveSnapshot {
            status: self.status,
            last_saved_at: self.last_saved_at,
            retry_count: self.retry_count,
        }
    }

    /// Apply one event. `now` stamps a successful save.
    pub fn handle(&mut self, event: SaveEvent<T>, now: DateTime<Utc>) -> Vec<SaveEffect<T>> {
        let mut effects = Vec::new();

        match event {
            SaveEvent::Edit(value) => {
                if self.latest.as_ref() == Some(&value) {
                    return effects;
                }
                self.latest = Some(value);
                self.cancel(TimerKind::Debounce, &mut effects);
                if self.status != SaveStatus::Saving {
                    self.status = SaveStatus::Typing;
                }
                self.arm(TimerKind::Debounce, self.config.debounce, &mut effects);
            }
            SaveEvent::Seed(value) => {
                self.persisted = Some(value.clone());
                self.latest = Some(value);
            }
            SaveEvent::Flush => {
                if !self.has_unsaved() {
                    return effects;
                }
                self.cancel(TimerKind::Debounce, &mut effects);
                self.cancel(TimerKind::Retry, &mut effects);
                self.begin_attempt(&mut effects);
            }
            SaveEvent::Reset => {
                self.cancel(TimerKind::Debounce, &mut effects);
                self.cancel(TimerKind::Retry, &mut effects);
                self.superseded = self.in_flight;
                self.status = SaveStatus::Idle;
                self.latest = None;
                self.persisted = None;
                self.retry_count = 0;
                self.last_saved_at = None;
                self.queued = false;
            }
            SaveEvent::TimerFired(kind) => {
                if !self.is_armed(kind) {
                    return effects;
                }
                match kind {
                    TimerKind::Debounce => self.debounce_armed = false,
                    TimerKind::Retry => self.retry_armed = false,
                }
                self.begin_attempt(&mut effects);
            }
            SaveEvent::CommitSettled { attempt, outcome } => {
                if self.in_flight != Some(attempt) {
                    return effects;
                }
                self.in_flight = None;
                let committed = self.committing.take();

                if self.superseded.take() == Some(attempt) {
                    self.run_queued(&mut effects);
                    return effects;
                }

                match outcome {
                    CommitOutcome::Success => {
                        self.status = SaveStatus::Saved;
                        self.retry_count = 0;
                        self.last_saved_at = Some(now);
                        self.persisted = committed;
                        self.run_queued(&mut effects);
                    }
                    CommitOutcome::Failure(_) if self.retry_count < self.config.max_retries => {
                        self.retry_count += 1;
                        self.queued = false;
                        let delay = self.config.backoff_delay(self.retry_count);
                        self.arm(TimerKind::Retry, delay, &mut effects);
                    }
                    CommitOutcome::Failure(_) => {
                        self.status = SaveStatus::Error;
                        self.retry_count = 0;
                        self.run_queued(&mut effects);
                    }
                }
            }
        }

        effects
    }

    /// Start a commit of the latest value, or queue one behind the in-flight attempt
    fn begin_attempt(&mut self, effects: &mut Vec<SaveEffect<T>>) {
        let Some(value) = self.latest.clone() else {
            return;
        };
        if self.in_flight.is_some() {
            self.queued = true;
            return;
        }

        // The attempt carries the freshest value, so pending timers are redundant
        self.cancel(TimerKind::Debounce, effects);
        self.cancel(TimerKind::Retry, effects);

        let attempt = self.next_attempt;
        self.next_attempt += 1;
        self.in_flight = Some(attempt);
        self.committing = Some(value.clone());
        self.status = SaveStatus::Saving;
        effects.push(SaveEffect::Commit { attempt, value });
    }

    /// Start the attempt requested while the previous one was running, unless
    /// a debounce is armed and will request it anyway.
    fn run_queued(&mut self, effects: &mut Vec<SaveEffect<T>>) {
        if !std::mem::take(&mut self.queued) || self.debounce_armed {
            return;
        }
        self.begin_attempt(effects);
    }

    fn arm(&mut self, kind: TimerKind, delay: Duration, effects: &mut Vec<SaveEffect<T>>) {
        match kind {
            TimerKind::Debounce => self.debounce_armed = true,
            TimerKind::Retry => self.retry_armed = true,
        }
        effects.push(SaveEffect::StartTimer { kind, delay });
    }

    fn cancel(&mut self, kind: TimerKind, effects: &mut Vec<SaveEffect<T>>) {
        let armed = match kind {
            TimerKind::Debounce => std::mem::replace(&mut self.debounce_armed, false),
            TimerKind::Retry => std::mem::replace(&mut self.retry_armed, false),
        };
        if armed {
            effects.push(SaveEffect::CancelTimer(kind));
        }
    }
}
