//! # Timerapp Core Library
//!
//! The engine behind the Timerapp countdown timers: named timers grouped by
//! category, a per-second countdown with halfway and completion alerts, and
//! a persisted history of completed runs. The CLI is a thin layer over this
//! crate.
//!
//! ## Architecture
//!
//! - **Storage**: key-value persistence of the `timers` and `history` JSON
//!   documents (SQLite or in-memory), plus TOML configuration
//! - **Timer Store**: the in-memory timer list, saved after every mutation
//! - **Countdown Scheduler**: one cancellable Tokio task per running timer
//! - **View**: pure projections for listing timers and history
//!
//! ## Key Components
//!
//! - [`CountdownScheduler`]: command entry point and tick driver
//! - [`TimerStore`]: timer collection and state transitions
//! - [`HistoryLog`]: completed-run log and export
//! - [`KvStore`]: persistence adapter trait

pub mod error;
pub mod events;
pub mod history;
pub mod notify;
pub mod storage;
pub mod timer;
pub mod view;

pub use error::{ConfigError, CoreError, ExportError, StorageError, ValidationError};
pub use events::Event;
pub use history::{HistoryEntry, HistoryLog};
pub use notify::{LogNotifier, NoopNotifier, Notifier, RecordingNotifier};
pub use storage::{Config, Database, KvStore, MemoryStore};
pub use timer::{CountdownScheduler, NewTimer, Tick, Timer, TimerId, TimerStatus, TimerStore};
