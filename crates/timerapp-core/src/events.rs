use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::TimerId;

/// Every state change in the system produces an Event.
/// Front ends render them; the notifier decides which ones reach the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerAdded {
        id: TimerId,
        name: String,
        category: String,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    TimerStarted {
        id: TimerId,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        id: TimerId,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        id: TimerId,
        at: DateTime<Utc>,
    },
    TimerDeleted {
        id: TimerId,
        at: DateTime<Utc>,
    },
    /// Remaining time first reached half the duration during this run.
    HalfwayReached {
        id: TimerId,
        name: String,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerCompleted {
        id: TimerId,
        name: String,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn timer_id(&self) -> &TimerId {
        match self {
            Event::TimerAdded { id, .. }
            | Event::TimerStarted { id, .. }
            | Event::TimerPaused { id, .. }
            | Event::TimerReset { id, .. }
            | Event::TimerDeleted { id, .. }
            | Event::HalfwayReached { id, .. }
            | Event::TimerCompleted { id, .. } => id,
        }
    }

    /// Whether the event is meant to interrupt the user.
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Event::HalfwayReached { .. } | Event::TimerCompleted { .. }
        )
    }

    /// The message shown for alert events.
    pub fn alert_message(&self) -> Option<String> {
        match self {
            Event::HalfwayReached { name, .. } => Some(format!("Halfway done: {name}")),
            Event::TimerCompleted { name, .. } => Some(format!("Timer Completed! {name}")),
            _ => None,
        }
    }
}
