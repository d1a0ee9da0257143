//! User-facing notification seam.
//!
//! The scheduler calls [`Notifier::notify`] for every halfway and completion
//! event, after releasing its lock. Delivery is fire-and-forget.

use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::events::Event;

pub trait Notifier: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Drops every event.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: &Event) {}
}

/// Writes alerts to the tracing log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &Event) {
        if let Some(message) = event.alert_message() {
            info!(timer_id = %event.timer_id(), "{message}");
        }
    }
}

/// Keeps every event it receives, in order.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
