//! Autosave — debounced, retried commits with an observable status
//!
//! `machine` holds every decision as a pure state machine; `scheduler` runs it
//! on a tokio task with real timers and a single in-flight commit.

pub mod machine;
pub mod scheduler;

pub use machine::{CommitOutcome, SaveEffect, SaveEvent, SaveMachine, SaveSnapshot, TimerKind};
pub use scheduler::{Committer, SaveScheduler};
