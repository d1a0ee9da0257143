//! In-memory timer collection with save-on-every-mutation persistence.
//!
//! The store knows nothing about countdown processes; the scheduler cancels
//! and spawns those around calls into it. Every successful mutation rewrites
//! the whole `timers` document. A failed write is logged and the in-memory
//! state stays authoritative.
//!
//! Several processes may share one database (a foreground `run` next to
//! one-shot commands). Every mutation first re-reads the stored list, then
//! writes back that list with only the touched timer replaced. A timer reset
//! or deleted elsewhere stops ticking here, timers added elsewhere are kept,
//! and another process's `Running` entries are never rewritten.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::model::{NewTimer, Tick, Timer, TimerId, TimerStatus};
use crate::events::Event;
use crate::history::{HistoryEntry, HistoryLog};
use crate::storage::{KvStore, TIMERS_KEY};

pub struct TimerStore {
    kv: Arc<dyn KvStore>,
    history: HistoryLog,
    timers: Vec<Timer>,
    halfway_alert_default: bool,
}

impl TimerStore {
    /// Build a store from whatever is persisted in `kv`.
    pub fn load(kv: Arc<dyn KvStore>) -> Self {
        let timers = Self::load_all(kv.as_ref());
        info!(count = timers.len(), "loaded timers");
        Self {
            history: HistoryLog::new(Arc::clone(&kv)),
            kv,
            timers,
            halfway_alert_default: true,
        }
    }

    /// Default `halfwayAlert` for timers created from now on.
    pub fn with_halfway_alert_default(mut self, enabled: bool) -> Self {
        self.halfway_alert_default = enabled;
        self
    }

    /// Read the persisted timer list.
    ///
    /// Absent, unreadable or unparseable payloads yield an empty list.
    /// Individual entries that fail to parse are skipped.
    pub fn load_all(kv: &dyn KvStore) -> Vec<Timer> {
        Self::read_stored(kv)
            .unwrap_or_default()
            .into_iter()
            .map(Timer::interrupted)
            .collect()
    }

    /// The stored list with `Running` left as is, or `None` when there is no
    /// usable payload.
    fn read_stored(kv: &dyn KvStore) -> Option<Vec<Timer>> {
        let raw = match kv.get(TIMERS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to read timers");
                return None;
            }
        };
        let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "timers payload is unparseable; treating as empty");
                return None;
            }
        };
        let timers = values
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Timer>(value) {
                Ok(timer) => timer.sanitized(),
                Err(e) => {
                    warn!(error = %e, "skipping malformed timer entry");
                    None
                }
            })
            .collect();
        Some(timers)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn timers(&self) -> &[Timer] {
        &self.timers
    }

    pub fn get(&self, id: &TimerId) -> Option<&Timer> {
        self.timers.iter().find(|t| t.id() == id)
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Create a paused timer. Invalid input is a silent no-op.
    pub fn add_timer(&mut self, name: &str, duration: u64, category: &str) -> Option<TimerId> {
        match NewTimer::new(name, duration, category) {
            Ok(input) => Some(self.add(input.with_halfway_alert(self.halfway_alert_default))),
            Err(e) => {
                debug!(error = %e, "rejected new timer");
                None
            }
        }
    }

    /// Create a paused timer from validated input, keeping its halfway setting.
    pub fn add(&mut self, input: NewTimer) -> TimerId {
        let stored = self.refresh();
        let timer = Timer::new(input);
        let id = timer.id().clone();
        let event = Event::TimerAdded {
            id: id.clone(),
            name: timer.name().to_string(),
            category: timer.category().to_string(),
            duration_secs: timer.duration(),
            at: Utc::now(),
        };
        self.timers.push(timer);
        self.persist_change(&id, stored);
        log_event(&event);
        id
    }

    pub fn start_timer(&mut self, id: &TimerId, at: DateTime<Utc>) -> Option<Event> {
        self.mutate(id, |timer| timer.start(at))
    }

    pub fn pause_timer(&mut self, id: &TimerId, at: DateTime<Utc>) -> Option<Event> {
        self.mutate(id, |timer| timer.pause(at))
    }

    pub fn reset_timer(&mut self, id: &TimerId, at: DateTime<Utc>) -> Option<Event> {
        self.mutate(id, |timer| timer.reset(at))
    }

    pub fn delete_timer(&mut self, id: &TimerId, at: DateTime<Utc>) -> Option<Event> {
        let stored = self.refresh();
        let index = self.timers.iter().position(|t| t.id() == id)?;
        self.timers.remove(index);
        self.persist_change(id, stored);
        let event = Event::TimerDeleted { id: id.clone(), at };
        log_event(&event);
        Some(event)
    }

    /// Advance one running timer by one second.
    ///
    /// Persists after every tick that touched a timer, and appends a history
    /// entry when the timer completes.
    pub fn tick(&mut self, id: &TimerId, at: DateTime<Utc>) -> Tick {
        let stored = self.refresh();
        let Some(timer) = self.timers.iter_mut().find(|t| t.id() == id) else {
            return Tick::Stopped;
        };
        let tick = timer.tick(at);
        if matches!(tick, Tick::Stopped) {
            return tick;
        }

        if let Tick::Completed(_) = tick {
            let entry = HistoryEntry {
                name: timer.name().to_string(),
                time: at,
                duration: timer.duration(),
            };
            if let Err(e) = self.history.append(entry) {
                warn!(timer_id = %id, error = %e, "failed to record history entry");
            }
        }

        self.persist_change(id, stored);
        match &tick {
            Tick::Counted { remaining } => debug!(timer_id = %id, remaining, "tick"),
            Tick::Halfway(event) | Tick::Completed(event) => log_event(event),
            Tick::Stopped => {}
        }
        tick
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn mutate<F>(&mut self, id: &TimerId, f: F) -> Option<Event>
    where
        F: FnOnce(&mut Timer) -> Option<Event>,
    {
        let stored = self.refresh();
        let timer = self.timers.iter_mut().find(|t| t.id() == id)?;
        let event = f(timer)?;
        self.persist_change(id, stored);
        log_event(&event);
        Some(event)
    }

    /// Adopt the stored list and return it as the base for the next write.
    ///
    /// A stored `Running` entry stays `Running` only if this store is the
    /// one running it; otherwise it reads as `Paused`, as on load. Without
    /// a usable payload the in-memory list is kept.
    fn refresh(&mut self) -> Vec<Timer> {
        let Some(stored) = Self::read_stored(self.kv.as_ref()) else {
            return self.timers.clone();
        };
        let timers = stored
            .iter()
            .map(|timer| {
                let running_here = self
                    .get(timer.id())
                    .is_some_and(|t| t.status() == TimerStatus::Running);
                if running_here {
                    timer.clone()
                } else {
                    timer.clone().interrupted()
                }
            })
            .collect();
        self.timers = timers;
        stored
    }

    /// Write `stored` back with the entry for `id` replaced, appended or
    /// removed to match memory.
    fn persist_change(&self, id: &TimerId, mut stored: Vec<Timer>) {
        let index = stored.iter().position(|t| t.id() == id);
        match (self.get(id), index) {
            (Some(timer), Some(index)) => stored[index] = timer.clone(),
            (Some(timer), None) => stored.push(timer.clone()),
            (None, Some(index)) => {
                stored.remove(index);
            }
            (None, None) => {}
        }
        write_timers(self.kv.as_ref(), &stored);
    }
}

fn write_timers(kv: &dyn KvStore, timers: &[Timer]) {
    let json = match serde_json::to_string(timers) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to serialize timers");
            return;
        }
    };
    if let Err(e) = kv.set(TIMERS_KEY, &json) {
        warn!(error = %e, "failed to persist timers");
    }
}

fn log_event(event: &Event) {
    info!(timer_id = %event.timer_id(), ?event, "timer event");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::{Database, MemoryStore};

    fn store() -> (Arc<MemoryStore>, TimerStore) {
        let kv = Arc::new(MemoryStore::new());
        let store = TimerStore::load(kv.clone());
        (kv, store)
    }

    fn persisted(kv: &MemoryStore) -> Vec<Timer> {
        TimerStore::load_all(kv)
    }

    #[test]
    fn add_timer_persists_full_list() {
        let (kv, mut store) = store();
        let a = store.add_timer("Focus", 5, "Work").unwrap();
        let b = store.add_timer("Break", 4, "Personal").unwrap();

        let saved = persisted(&kv);
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].id(), &a);
        assert_eq!(saved[1].id(), &b);
        assert_eq!(saved[1].remaining(), 4);
    }

    #[test]
    fn add_timer_rejects_invalid_input_silently() {
        let (kv, mut store) = store();
        assert!(store.add_timer("", 5, "Work").is_none());
        assert!(store.add_timer("Focus", 0, "Work").is_none());
        assert!(store.add_timer("Focus", 5, "   ").is_none());
        assert!(store.timers().is_empty());
        assert!(kv.get(TIMERS_KEY).unwrap().is_none());
    }

    #[test]
    fn halfway_default_applies_to_new_timers() {
        let kv = Arc::new(MemoryStore::new());
        let mut store = TimerStore::load(kv).with_halfway_alert_default(false);
        let id = store.add_timer("Quiet", 10, "Work").unwrap();
        assert!(!store.get(&id).unwrap().halfway_alert());
    }

    #[test]
    fn reset_is_idempotent_and_skips_persist() {
        let (kv, mut store) = store();
        let id = store.add_timer("Focus", 5, "Work").unwrap();
        let before = kv.get(TIMERS_KEY).unwrap();
        assert!(store.reset_timer(&id, Utc::now()).is_none());
        assert_eq!(kv.get(TIMERS_KEY).unwrap(), before);
    }

    #[test]
    fn unknown_ids_are_noops() {
        let (_kv, mut store) = store();
        let ghost = TimerId::from("ghost");
        assert!(store.start_timer(&ghost, Utc::now()).is_none());
        assert!(store.pause_timer(&ghost, Utc::now()).is_none());
        assert!(store.reset_timer(&ghost, Utc::now()).is_none());
        assert!(store.delete_timer(&ghost, Utc::now()).is_none());
        assert_eq!(store.tick(&ghost, Utc::now()), Tick::Stopped);
    }

    #[test]
    fn completion_appends_one_history_entry() {
        let (_kv, mut store) = store();
        let id = store.add_timer("Focus", 5, "Work").unwrap();
        let started = Utc::now();
        store.start_timer(&id, started);
        for _ in 0..5 {
            store.tick(&id, Utc::now());
        }
        assert_eq!(store.tick(&id, Utc::now()), Tick::Stopped);

        let entries = store.history().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Focus");
        assert_eq!(entries[0].duration, 5);
        assert!(entries[0].time >= started);
    }

    #[test]
    fn every_tick_is_persisted() {
        let (kv, mut store) = store();
        let id = store.add_timer("Break", 4, "Personal").unwrap();
        store.start_timer(&id, Utc::now());
        store.tick(&id, Utc::now());
        assert_eq!(persisted(&kv)[0].remaining(), 3);
    }

    #[test]
    fn history_survives_timer_deletion() {
        let (_kv, mut store) = store();
        let id = store.add_timer("Tea", 1, "Home").unwrap();
        store.start_timer(&id, Utc::now());
        store.tick(&id, Utc::now());
        assert!(store.delete_timer(&id, Utc::now()).is_some());
        assert!(store.timers().is_empty());
        assert_eq!(store.history().entries().len(), 1);
    }

    #[test]
    fn load_all_treats_garbage_as_empty() {
        let kv = MemoryStore::with_entries([(TIMERS_KEY, "not json")]);
        assert!(TimerStore::load_all(&kv).is_empty());
        let kv = MemoryStore::with_entries([(TIMERS_KEY, r#"{"a":1}"#)]);
        assert!(TimerStore::load_all(&kv).is_empty());
    }

    #[test]
    fn load_all_skips_malformed_entries() {
        let kv = MemoryStore::with_entries([(
            TIMERS_KEY,
            r#"[{"id":"1","name":"Tea","category":"Home","duration":60,"remaining":60,"status":"Paused","halfwayAlert":true,"halfwayNotified":false},
                {"id":"2","name":"Broken","category":"Home","duration":null,"remaining":null,"status":"Paused"}]"#,
        )]);
        let timers = TimerStore::load_all(&kv);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].name(), "Tea");
    }

    #[test]
    fn reload_pauses_timers_left_running() {
        let (kv, mut store) = store();
        let id = store.add_timer("Focus", 5, "Work").unwrap();
        store.start_timer(&id, Utc::now());
        store.tick(&id, Utc::now());

        let reloaded = TimerStore::load(kv);
        let timer = reloaded.get(&id).unwrap();
        assert_eq!(timer.status(), TimerStatus::Paused);
        assert_eq!(timer.remaining(), 4);
    }

    fn names(timers: &[Timer]) -> Vec<&str> {
        timers.iter().map(Timer::name).collect()
    }

    #[test]
    fn tick_keeps_timers_added_by_another_store() {
        let db: Arc<dyn KvStore> = Arc::new(Database::open_memory().unwrap());
        let mut runner = TimerStore::load(Arc::clone(&db));
        let focus = runner.add_timer("Focus", 5, "Work").unwrap();
        runner.start_timer(&focus, Utc::now());

        let mut other = TimerStore::load(Arc::clone(&db));
        other.add_timer("Tea", 180, "Home").unwrap();

        runner.tick(&focus, Utc::now());
        let saved = TimerStore::load_all(db.as_ref());
        assert_eq!(names(&saved), ["Focus", "Tea"]);
        assert_eq!(saved[0].remaining(), 4);
        assert_eq!(names(runner.timers()), ["Focus", "Tea"]);
    }

    #[test]
    fn reset_from_another_store_stops_the_countdown() {
        let db: Arc<dyn KvStore> = Arc::new(Database::open_memory().unwrap());
        let mut runner = TimerStore::load(Arc::clone(&db));
        let focus = runner.add_timer("Focus", 5, "Work").unwrap();
        runner.start_timer(&focus, Utc::now());
        runner.tick(&focus, Utc::now());

        let mut other = TimerStore::load(Arc::clone(&db));
        assert!(other.reset_timer(&focus, Utc::now()).is_some());

        assert_eq!(runner.tick(&focus, Utc::now()), Tick::Stopped);
        let saved = TimerStore::load_all(db.as_ref());
        assert!(saved[0].is_pristine());
    }

    #[test]
    fn delete_from_another_store_is_not_undone() {
        let db: Arc<dyn KvStore> = Arc::new(Database::open_memory().unwrap());
        let mut runner = TimerStore::load(Arc::clone(&db));
        let focus = runner.add_timer("Focus", 5, "Work").unwrap();
        let tea = runner.add_timer("Tea", 5, "Home").unwrap();
        runner.start_timer(&focus, Utc::now());

        let mut other = TimerStore::load(Arc::clone(&db));
        assert!(other.delete_timer(&tea, Utc::now()).is_some());

        runner.tick(&focus, Utc::now());
        assert_eq!(names(&TimerStore::load_all(db.as_ref())), ["Focus"]);
        assert!(runner.get(&tea).is_none());
    }

    #[test]
    fn add_from_another_store_keeps_running_status() {
        let db: Arc<dyn KvStore> = Arc::new(Database::open_memory().unwrap());
        let mut runner = TimerStore::load(Arc::clone(&db));
        let focus = runner.add_timer("Focus", 5, "Work").unwrap();
        runner.start_timer(&focus, Utc::now());

        let mut other = TimerStore::load(Arc::clone(&db));
        assert_eq!(other.get(&focus).unwrap().status(), TimerStatus::Paused);
        other.add_timer("Tea", 180, "Home").unwrap();

        assert!(matches!(
            runner.tick(&focus, Utc::now()),
            Tick::Counted { remaining: 4 }
        ));
    }

    struct FailingStore;

    impl KvStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Locked)
        }
    }

    #[test]
    fn write_failures_keep_in_memory_state() {
        let mut store = TimerStore::load(Arc::new(FailingStore));
        let id = store.add_timer("Focus", 2, "Work").unwrap();
        store.start_timer(&id, Utc::now());
        store.tick(&id, Utc::now());
        assert!(matches!(store.tick(&id, Utc::now()), Tick::Completed(_)));
        assert_eq!(store.get(&id).unwrap().status(), TimerStatus::Completed);
    }
}
