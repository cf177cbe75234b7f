//! Cancellable repeating tick processes.
//!
//! A running timer needs a once-per-interval wake-up so the shell can
//! re-render the active item's growing display time. [`Scheduler`] installs
//! such a process and hands back a [`TickHandle`]; dropping or cancelling the
//! handle stops the process.
//!
//! # Implementations
//!
//! - [`TokioScheduler`]: spawns a task driven by `tokio::time::interval`
//! - [`ManualScheduler`]: records callbacks and fires them on demand, for
//!   deterministic tests
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use quadtodo_core::ticker::{Scheduler, TokioScheduler};
//!
//! #[tokio::main]
//! async fn main() {
//!     let scheduler = TokioScheduler::current().expect("inside a runtime");
//!     let handle = scheduler.schedule(Duration::from_secs(1), Box::new(|| println!("tick")));
//!
//!     tokio::time::sleep(Duration::from_secs(3)).await;
//!     handle.cancel();
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

/// Callback invoked on every tick.
pub type TickCallback = Box<dyn FnMut() + Send + 'static>;

/// Handle to a live tick process. Cancels the process when dropped.
pub struct TickHandle {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl TickHandle {
    /// Wraps the action that stops the underlying process.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stops the tick process.
    pub fn cancel(mut self) {
        self.fire_cancel();
    }

    fn fire_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.fire_cancel();
    }
}

impl fmt::Debug for TickHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickHandle")
            .field("live", &self.cancel.is_some())
            .finish()
    }
}

/// Installs repeating tick processes.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Calls `on_tick` once per `interval`, first one interval from now,
    /// until the returned handle is cancelled or dropped.
    fn schedule(&self, interval: Duration, on_tick: TickCallback) -> TickHandle;
}

/// Scheduler backed by tokio tasks.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Uses the runtime of the calling context, if there is one.
    #[must_use]
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, interval: Duration, mut on_tick: TickCallback) -> TickHandle {
        let task = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                trace!("Tick");
                on_tick();
            }
        });

        TickHandle::new(move || task.abort())
    }
}

struct ScheduledTick {
    interval: Duration,
    on_tick: Arc<Mutex<TickCallback>>,
}

#[derive(Default)]
struct ManualState {
    next_id: u64,
    installed: usize,
    live: BTreeMap<u64, ScheduledTick>,
}

/// Scheduler whose ticks fire only when [`fire`](Self::fire) is called.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// code under test owns another.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invokes every live callback once. Returns how many fired.
    ///
    /// The scheduler lock is not held while a callback runs, so callbacks may
    /// schedule or cancel tick processes; one cancelled mid-round is skipped.
    pub fn fire(&self) -> usize {
        let round: Vec<(u64, Arc<Mutex<TickCallback>>)> = self
            .lock()
            .live
            .iter()
            .map(|(id, tick)| (*id, Arc::clone(&tick.on_tick)))
            .collect();

        let mut fired = 0;
        for (id, on_tick) in round {
            if !self.lock().live.contains_key(&id) {
                continue;
            }
            let mut on_tick = on_tick.lock().unwrap_or_else(|p| p.into_inner());
            (*on_tick)();
            fired += 1;
        }
        fired
    }

    /// Number of tick processes currently installed and not cancelled.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Number of tick processes ever installed.
    #[must_use]
    pub fn installed_count(&self) -> usize {
        self.lock().installed
    }

    /// Intervals of the live processes.
    #[must_use]
    pub fn live_intervals(&self) -> Vec<Duration> {
        self.lock().live.values().map(|t| t.interval).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, interval: Duration, on_tick: TickCallback) -> TickHandle {
        let id = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.installed += 1;
            state.live.insert(
                id,
                ScheduledTick {
                    interval,
                    on_tick: Arc::new(Mutex::new(on_tick)),
                },
            );
            id
        };

        let state = Arc::clone(&self.state);
        TickHandle::new(move || {
            state.lock().unwrap_or_else(|p| p.into_inner()).live.remove(&id);
        })
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualScheduler")
            .field("installed", &state.installed)
            .field("live", &state.live.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, TickCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let callback: TickCallback = Box::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn manual_scheduler_fires_live_callbacks() {
        let scheduler = ManualScheduler::new();
        let (count, callback) = counter();

        let _handle = scheduler.schedule(Duration::from_secs(1), callback);
        assert_eq!(scheduler.live_count(), 1);

        assert_eq!(scheduler.fire(), 1);
        assert_eq!(scheduler.fire(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancel_removes_process() {
        let scheduler = ManualScheduler::new();
        let (count, callback) = counter();

        let handle = scheduler.schedule(Duration::from_secs(1), callback);
        handle.cancel();

        assert_eq!(scheduler.live_count(), 0);
        assert_eq!(scheduler.fire(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.installed_count(), 1);
    }

    #[test]
    fn drop_cancels() {
        let scheduler = ManualScheduler::new();
        let (_count, callback) = counter();

        {
            let _handle = scheduler.schedule(Duration::from_secs(1), callback);
            assert_eq!(scheduler.live_count(), 1);
        }

        assert_eq!(scheduler.live_count(), 0);
    }

    #[test]
    fn callback_may_cancel_its_own_process() {
        let scheduler = ManualScheduler::new();
        let slot: Arc<Mutex<Option<TickHandle>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);

        let handle = scheduler.schedule(
            Duration::from_secs(1),
            Box::new(move || {
                if let Some(handle) = inner.lock().unwrap().take() {
                    handle.cancel();
                }
            }),
        );
        *slot.lock().unwrap() = Some(handle);

        assert_eq!(scheduler.fire(), 1);
        assert_eq!(scheduler.live_count(), 0);
        assert_eq!(scheduler.fire(), 0);
    }

    #[test]
    fn process_cancelled_mid_round_is_skipped() {
        let scheduler = ManualScheduler::new();
        let (count, callback) = counter();
        let victim: Arc<Mutex<Option<TickHandle>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&victim);

        // Installed first, so it runs first in the round.
        let _killer = scheduler.schedule(
            Duration::from_secs(1),
            Box::new(move || {
                inner.lock().unwrap().take();
            }),
        );
        *victim.lock().unwrap() = Some(scheduler.schedule(Duration::from_secs(1), callback));

        assert_eq!(scheduler.fire(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.live_count(), 1);
    }

    #[test]
    fn records_interval() {
        let scheduler = ManualScheduler::new();
        let (_count, callback) = counter();
        let _handle = scheduler.schedule(Duration::from_millis(250), callback);
        assert_eq!(scheduler.live_intervals(), vec![Duration::from_millis(250)]);
    }

    #[test]
    fn tokio_scheduler_requires_runtime() {
        assert!(TokioScheduler::current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_ticks_each_interval() {
        let scheduler = TokioScheduler::current().expect("runtime present");
        let (count, callback) = counter();

        let handle = scheduler.schedule(Duration::from_secs(1), callback);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
