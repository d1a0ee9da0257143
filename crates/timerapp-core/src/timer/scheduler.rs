//! Countdown scheduler.
//!
//! Every running timer owns one Tokio task that ticks it once per period.
//! The store and the table of active runs share a single mutex; each tick
//! and each command is one critical section, and the lock is never held
//! across an `.await`.
//!
//! A run is identified by a generation number. A task only ticks while its
//! generation still owns the timer id, so a task that was already waiting on
//! the lock when its run was cancelled cannot touch the timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

use super::model::{Tick, Timer, TimerId};
use super::store::TimerStore;
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::history::HistoryEntry;
use crate::notify::Notifier;
use crate::storage::Config;

struct ActiveRun {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Shared {
    store: TimerStore,
    runs: HashMap<TimerId, ActiveRun>,
    next_generation: u64,
    active: watch::Sender<usize>,
}

impl Shared {
    fn owns(&self, id: &TimerId, generation: u64) -> bool {
        self.runs
            .get(id)
            .is_some_and(|run| run.generation == generation)
    }

    /// Abort the run for `id`, if any.
    fn cancel(&mut self, id: &TimerId) {
        if let Some(run) = self.runs.remove(id) {
            run.handle.abort();
            debug!(timer_id = %id, generation = run.generation, "cancelled countdown");
            self.publish();
        }
    }

    /// Forget a run that ended by itself.
    fn finish(&mut self, id: &TimerId) {
        if self.runs.remove(id).is_some() {
            self.publish();
        }
    }

    fn publish(&self) {
        self.active.send_replace(self.runs.len());
    }
}

/// Drives running timers and routes every command through the store.
pub struct CountdownScheduler {
    shared: Arc<Mutex<Shared>>,
    notifier: Arc<dyn Notifier>,
    period: Duration,
    runtime: Handle,
}

impl CountdownScheduler {
    /// Create a scheduler that spawns its tick tasks on the current Tokio runtime.
    ///
    /// # Errors
    /// Returns `CoreError::Runtime` when called outside a Tokio runtime.
    pub fn new(store: TimerStore, notifier: Arc<dyn Notifier>, period: Duration) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| CoreError::Runtime(e.to_string()))?;
        let (active, _) = watch::channel(0);
        Ok(Self {
            shared: Arc::new(Mutex::new(Shared {
                store,
                runs: HashMap::new(),
                next_generation: 0,
                active,
            })),
            notifier,
            period,
            runtime,
        })
    }

    /// Create a scheduler paced and defaulted by `config`.
    ///
    /// # Errors
    /// Same as [`CountdownScheduler::new`].
    pub fn from_config(
        store: TimerStore,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Result<Self> {
        let store = store.with_halfway_alert_default(config.timer.halfway_alert);
        Self::new(store, notifier, config.tick_interval())
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_shared(&self.shared)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn timers(&self) -> Vec<Timer> {
        self.lock().store.timers().to_vec()
    }

    pub fn get(&self, id: &TimerId) -> Option<Timer> {
        self.lock().store.get(id).cloned()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().store.history().entries()
    }

    pub fn is_active(&self, id: &TimerId) -> bool {
        self.lock().runs.contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().runs.len()
    }

    /// Watch the number of active countdowns.
    pub fn subscribe_active(&self) -> watch::Receiver<usize> {
        self.lock().active.subscribe()
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn add_timer(&self, name: &str, duration: u64, category: &str) -> Option<TimerId> {
        self.lock().store.add_timer(name, duration, category)
    }

    /// Start counting down. A no-op while a countdown for `id` is active,
    /// and for timers that are not paused.
    pub fn start_timer(&self, id: &TimerId) -> Option<Event> {
        let mut shared = self.lock();
        if shared.runs.contains_key(id) {
            return None;
        }
        let event = shared.store.start_timer(id, Utc::now())?;
        self.spawn_run(&mut shared, id.clone());
        Some(event)
    }

    pub fn pause_timer(&self, id: &TimerId) -> Option<Event> {
        let mut shared = self.lock();
        shared.cancel(id);
        shared.store.pause_timer(id, Utc::now())
    }

    pub fn reset_timer(&self, id: &TimerId) -> Option<Event> {
        let mut shared = self.lock();
        shared.cancel(id);
        shared.store.reset_timer(id, Utc::now())
    }

    pub fn delete_timer(&self, id: &TimerId) -> Option<Event> {
        let mut shared = self.lock();
        shared.cancel(id);
        shared.store.delete_timer(id, Utc::now())
    }

    /// Pause every running timer.
    pub fn pause_all(&self) -> Vec<Event> {
        let mut shared = self.lock();
        let ids: Vec<TimerId> = shared.runs.keys().cloned().collect();
        ids.iter()
            .filter_map(|id| {
                shared.cancel(id);
                shared.store.pause_timer(id, Utc::now())
            })
            .collect()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn spawn_run(&self, shared: &mut Shared, id: TimerId) {
        let generation = shared.next_generation;
        shared.next_generation += 1;
        let handle = self.runtime.spawn(run_countdown(
            Arc::clone(&self.shared),
            Arc::clone(&self.notifier),
            id.clone(),
            generation,
            self.period,
        ));
        debug!(timer_id = %id, generation, "spawned countdown");
        shared.runs.insert(id, ActiveRun { generation, handle });
        shared.publish();
    }
}

impl Drop for CountdownScheduler {
    fn drop(&mut self) {
        let mut shared = self.lock();
        for (_, run) in shared.runs.drain() {
            run.handle.abort();
        }
        shared.publish();
    }
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_countdown(
    shared: Arc<Mutex<Shared>>,
    notifier: Arc<dyn Notifier>,
    id: TimerId,
    generation: u64,
    period: Duration,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;

        let tick = {
            let mut guard = lock_shared(&shared);
            if !guard.owns(&id, generation) {
                return;
            }
            let tick = guard.store.tick(&id, Utc::now());
            if tick.is_finished() {
                guard.finish(&id);
            }
            tick
        };

        if let Some(event) = tick.alert() {
            notifier.notify(event);
        }
        if tick.is_finished() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::storage::MemoryStore;
    use crate::timer::TimerStatus;

    const SECOND: Duration = Duration::from_secs(1);

    fn scheduler() -> (Arc<MemoryStore>, Arc<RecordingNotifier>, CountdownScheduler) {
        let kv = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler =
            CountdownScheduler::new(TimerStore::load(kv.clone()), notifier.clone(), SECOND)
                .unwrap();
        (kv, notifier, scheduler)
    }

    /// Let `n` ticks land, stopping halfway between two tick instants.
    async fn ticks(n: u64) {
        time::sleep(SECOND * n as u32 + Duration::from_millis(500)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn focus_timer_completes_after_five_ticks() {
        let (_kv, notifier, scheduler) = scheduler();
        let id = scheduler.add_timer("Focus", 5, "Work").unwrap();
        let started = Utc::now();
        assert!(scheduler.start_timer(&id).is_some());

        ticks(5).await;

        let timer = scheduler.get(&id).unwrap();
        assert_eq!(timer.status(), TimerStatus::Completed);
        assert_eq!(timer.remaining(), 0);
        assert!(!scheduler.is_active(&id));

        let history = scheduler.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].name, "Focus");
        assert_eq!(history[0].duration, 5);
        assert!(history[0].time >= started);

        let alerts = notifier.events();
        assert_eq!(alerts.len(), 2);
        assert!(matches!(alerts[0], Event::HalfwayReached { remaining_secs: 2, .. }));
        assert!(matches!(alerts[1], Event::TimerCompleted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn break_timer_paused_after_two_ticks() {
        let (_kv, notifier, scheduler) = scheduler();
        let id = scheduler.add_timer("Break", 4, "Personal").unwrap();
        scheduler.start_timer(&id);

        ticks(2).await;
        assert!(scheduler.pause_timer(&id).is_some());

        let timer = scheduler.get(&id).unwrap();
        assert_eq!(timer.remaining(), 2);
        assert_eq!(timer.status(), TimerStatus::Paused);
        // The second tick lands on floor(4 / 2) before the pause.
        assert!(timer.halfway_notified());
        assert!(!scheduler.is_active(&id));
        assert!(scheduler.history().is_empty());
        assert!(notifier
            .events()
            .iter()
            .all(|e| !matches!(e, Event::TimerCompleted { .. })));

        ticks(3).await;
        assert_eq!(scheduler.get(&id).unwrap().remaining(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_keeps_one_countdown() {
        let (_kv, _notifier, scheduler) = scheduler();
        let id = scheduler.add_timer("Focus", 60, "Work").unwrap();
        assert!(scheduler.start_timer(&id).is_some());
        assert!(scheduler.start_timer(&id).is_none());
        assert_eq!(scheduler.active_count(), 1);

        ticks(10).await;
        assert_eq!(scheduler.get(&id).unwrap().remaining(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_pause_does_not_double_tick() {
        let (_kv, _notifier, scheduler) = scheduler();
        let id = scheduler.add_timer("Focus", 60, "Work").unwrap();
        scheduler.start_timer(&id);
        ticks(3).await;
        scheduler.pause_timer(&id);
        scheduler.start_timer(&id);
        ticks(4).await;
        assert_eq!(scheduler.get(&id).unwrap().remaining(), 53);
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_running_timer_stops_countdown() {
        let (kv, _notifier, scheduler) = scheduler();
        let id = scheduler.add_timer("Focus", 30, "Work").unwrap();
        let other = scheduler.add_timer("Tea", 30, "Home").unwrap();
        scheduler.start_timer(&id);
        ticks(2).await;

        assert!(scheduler.delete_timer(&id).is_some());
        assert!(!scheduler.is_active(&id));
        ticks(3).await;

        assert!(scheduler.get(&id).is_none());
        let saved = TimerStore::load_all(kv.as_ref());
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id(), &other);
        assert_eq!(saved[0].remaining(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_running_timer_cancels_and_restores() {
        let (_kv, _notifier, scheduler) = scheduler();
        let id = scheduler.add_timer("Focus", 10, "Work").unwrap();
        scheduler.start_timer(&id);
        ticks(6).await;
        assert!(scheduler.reset_timer(&id).is_some());
        ticks(2).await;

        let timer = scheduler.get(&id).unwrap();
        assert!(timer.is_pristine());
        assert!(!scheduler.is_active(&id));
        assert!(scheduler.reset_timer(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn completed_timer_needs_reset_before_restart() {
        let (_kv, _notifier, scheduler) = scheduler();
        let id = scheduler.add_timer("Tea", 2, "Home").unwrap();
        scheduler.start_timer(&id);
        ticks(2).await;
        assert!(scheduler.start_timer(&id).is_none());
        assert!(!scheduler.is_active(&id));

        scheduler.reset_timer(&id);
        assert!(scheduler.start_timer(&id).is_some());
        ticks(2).await;
        assert_eq!(scheduler.history().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timers_tick_independently() {
        let (_kv, _notifier, scheduler) = scheduler();
        let a = scheduler.add_timer("A", 10, "Work").unwrap();
        let b = scheduler.add_timer("B", 10, "Work").unwrap();
        scheduler.start_timer(&a);
        ticks(3).await;
        scheduler.start_timer(&b);
        // a ticks at 4s and 5s, b at 4.5s and 5.5s.
        time::sleep(Duration::from_millis(2250)).await;

        assert_eq!(scheduler.get(&a).unwrap().remaining(), 5);
        assert_eq!(scheduler.get(&b).unwrap().remaining(), 8);
        assert_eq!(scheduler.active_count(), 2);

        let paused = scheduler.pause_all();
        assert_eq!(paused.len(), 2);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn active_watch_reaches_zero_on_completion() {
        let (_kv, _notifier, scheduler) = scheduler();
        let id = scheduler.add_timer("Tea", 3, "Home").unwrap();
        let mut active = scheduler.subscribe_active();
        scheduler.start_timer(&id);
        assert_eq!(*active.borrow_and_update(), 1);

        active.wait_for(|n| *n == 0).await.unwrap();
        assert_eq!(
            scheduler.get(&id).unwrap().status(),
            TimerStatus::Completed
        );
    }

    #[test]
    fn new_outside_runtime_fails() {
        let kv = Arc::new(MemoryStore::new());
        let result = CountdownScheduler::new(
            TimerStore::load(kv),
            Arc::new(crate::notify::NoopNotifier),
            SECOND,
        );
        assert!(matches!(result, Err(CoreError::Runtime(_))));
    }
}
