//! Timer entity and its state transitions.
//!
//! ## State Transitions
//!
//! ```text
//! Paused -> Running -> Completed
//!   ^          |           |
//!   +-- pause -+           |
//!   +------- reset --------+
//! ```
//!
//! Transitions are pure: they take the current time and return the event
//! they produced. Persisting and scheduling are the store's and scheduler's
//! business.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::events::Event;

/// Opaque timer identifier. Never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(String);

impl TimerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TimerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TimerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerStatus {
    Paused,
    Running,
    /// Reached zero through countdown. Only a reset leaves this state.
    Completed,
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TimerStatus::Paused => "Paused",
            TimerStatus::Running => "Running",
            TimerStatus::Completed => "Completed",
        };
        f.write_str(label)
    }
}

/// Validated input for a new timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTimer {
    name: String,
    duration: u64,
    category: String,
    halfway_alert: bool,
}

impl NewTimer {
    /// # Errors
    /// Returns `ValidationError` for a blank name or category, or a zero duration.
    pub fn new(
        name: impl Into<String>,
        duration: u64,
        category: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let name = non_blank(name.into(), "name")?;
        let category = non_blank(category.into(), "category")?;
        if duration == 0 {
            return Err(ValidationError::InvalidDuration {
                input: duration.to_string(),
            });
        }
        Ok(Self {
            name,
            duration,
            category,
            halfway_alert: true,
        })
    }

    /// Build from raw form input, where the duration is still text.
    ///
    /// # Errors
    /// Same as [`NewTimer::new`], plus non-numeric durations.
    pub fn parse(name: &str, duration: &str, category: &str) -> Result<Self, ValidationError> {
        let secs = duration
            .trim()
            .parse::<u64>()
            .map_err(|_| ValidationError::InvalidDuration {
                input: duration.to_string(),
            })?;
        Self::new(name, secs, category)
    }

    pub fn with_halfway_alert(mut self, enabled: bool) -> Self {
        self.halfway_alert = enabled;
        self
    }
}

fn non_blank(value: String, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Blank { field });
    }
    Ok(trimmed.to_string())
}

/// A user-defined countdown.
///
/// Field names on the wire match the payloads the mobile app wrote, so a
/// `timers` document from either side loads unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    id: TimerId,
    name: String,
    category: String,
    duration: u64,
    remaining: u64,
    status: TimerStatus,
    #[serde(default = "default_halfway_alert")]
    halfway_alert: bool,
    #[serde(default)]
    halfway_notified: bool,
}

fn default_halfway_alert() -> bool {
    true
}

/// Result of one countdown tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// The timer is gone or not running; its countdown process should end.
    Stopped,
    Counted { remaining: u64 },
    Halfway(Event),
    Completed(Event),
}

impl Tick {
    pub fn is_finished(&self) -> bool {
        matches!(self, Tick::Stopped | Tick::Completed(_))
    }

    pub fn alert(&self) -> Option<&Event> {
        match self {
            Tick::Halfway(event) | Tick::Completed(event) => Some(event),
            Tick::Stopped | Tick::Counted { .. } => None,
        }
    }
}

impl Timer {
    pub fn new(input: NewTimer) -> Self {
        Self {
            id: TimerId::generate(),
            name: input.name,
            category: input.category,
            duration: input.duration,
            remaining: input.duration,
            status: TimerStatus::Paused,
            halfway_alert: input.halfway_alert,
            halfway_notified: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn id(&self) -> &TimerId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn halfway_alert(&self) -> bool {
        self.halfway_alert
    }

    pub fn halfway_notified(&self) -> bool {
        self.halfway_notified
    }

    /// The `remaining` value at which the halfway alert fires.
    pub fn halfway_mark(&self) -> u64 {
        self.duration / 2
    }

    /// Paused with the full duration left and no alert spent.
    pub fn is_pristine(&self) -> bool {
        self.status == TimerStatus::Paused
            && self.remaining == self.duration
            && !self.halfway_notified
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self, at: DateTime<Utc>) -> Option<Event> {
        if self.status != TimerStatus::Paused || self.remaining == 0 {
            return None;
        }
        self.status = TimerStatus::Running;
        Some(Event::TimerStarted {
            id: self.id.clone(),
            remaining_secs: self.remaining,
            at,
        })
    }

    pub fn pause(&mut self, at: DateTime<Utc>) -> Option<Event> {
        if self.status != TimerStatus::Running {
            return None;
        }
        self.status = TimerStatus::Paused;
        Some(Event::TimerPaused {
            id: self.id.clone(),
            remaining_secs: self.remaining,
            at,
        })
    }

    pub fn reset(&mut self, at: DateTime<Utc>) -> Option<Event> {
        if self.is_pristine() {
            return None;
        }
        self.remaining = self.duration;
        self.status = TimerStatus::Paused;
        self.halfway_notified = false;
        Some(Event::TimerReset {
            id: self.id.clone(),
            at,
        })
    }

    /// Count down one second.
    ///
    /// The halfway check runs before the completion check, on the
    /// post-decrement value. A halfway mark of zero coincides with
    /// completion and never fires.
    pub fn tick(&mut self, at: DateTime<Utc>) -> Tick {
        if self.status != TimerStatus::Running {
            return Tick::Stopped;
        }

        let remaining = self.remaining.saturating_sub(1);
        self.remaining = remaining;

        if self.halfway_alert
            && !self.halfway_notified
            && remaining > 0
            && remaining == self.halfway_mark()
        {
            self.halfway_notified = true;
            return Tick::Halfway(Event::HalfwayReached {
                id: self.id.clone(),
                name: self.name.clone(),
                remaining_secs: remaining,
                at,
            });
        }

        if remaining == 0 {
            self.status = TimerStatus::Completed;
            return Tick::Completed(Event::TimerCompleted {
                id: self.id.clone(),
                name: self.name.clone(),
                duration_secs: self.duration,
                at,
            });
        }

        Tick::Counted { remaining }
    }

    /// Repair a timer read from storage.
    ///
    /// Returns `None` for entries that cannot satisfy the invariants at all.
    /// A `Running` timer has no live countdown after a reload, so it comes
    /// back `Paused`.
    pub(crate) fn normalized(self) -> Option<Self> {
        self.sanitized().map(Timer::interrupted)
    }

    /// The same timer with its countdown gone: `Running` becomes `Paused`.
    pub(crate) fn interrupted(mut self) -> Self {
        if self.status == TimerStatus::Running {
            self.status = TimerStatus::Paused;
        }
        self
    }

    /// Enforce the remaining/status invariants without touching a `Running`
    /// status, for re-reading timers another countdown may still own.
    pub(crate) fn sanitized(mut self) -> Option<Self> {
        if self.duration == 0 || self.name.trim().is_empty() {
            return None;
        }
        self.remaining = self.remaining.min(self.duration);
        if self.remaining == 0 {
            self.status = TimerStatus::Completed;
        } else if self.status == TimerStatus::Completed {
            self.status = TimerStatus::Paused;
        }
        Some(self)
    }
}
