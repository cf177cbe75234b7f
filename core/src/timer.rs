//! Timer state machine.
//!
//! A category is either idle or running exactly one item. Every command goes
//! through [`transition`], a pure table from `(active item, command)` to the
//! next active item plus the ordered [`TimerAction`]s that realise it. The
//! stop-before-start rule and the cancel-before-install rule for the tick
//! process live in that table and nowhere else.
//!
//! | Active | Command     | Next | Actions                                         |
//! |--------|-------------|------|-------------------------------------------------|
//! | none   | `Start(a)`  | a    | cancel tick, begin a, install tick              |
//! | b      | `Start(a)`  | a    | cancel tick, flush b, begin a, install tick     |
//! | a      | `Start(a)`  | a    | none                                            |
//! | a      | `Stop(a)`   | none | cancel tick, flush a                            |
//! | b      | `Stop(a)`   | b    | none                                            |
//! | none   | `Stop(a)`   | none | none                                            |
//! | a      | `Halt`      | none | cancel tick, flush a                            |
//! | none   | `Halt`      | none | cancel tick                                     |
//!
//! [`TimerEngine`] applies the actions to an [`ItemStore`] and owns the
//! single [`TickHandle`]. Persisting the outcome is the caller's job.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::error::{Result, TodoError, ValidationError};
use crate::store::ItemStore;
use crate::ticker::{Scheduler, TickHandle};
use crate::types::{elapsed_seconds, ItemId, ItemPatch};

/// Default interval between re-render ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Requests accepted by the timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCommand {
    Start(ItemId),
    Stop(ItemId),
    /// Teardown: stop whatever is running and cancel ticking.
    Halt,
}

/// Steps produced by [`transition`], applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerAction {
    CancelTick,
    FlushSession(ItemId),
    BeginSession(ItemId),
    InstallTick(ItemId),
}

/// The transition table.
#[must_use]
pub fn transition(
    active: Option<&ItemId>,
    command: &TimerCommand,
) -> (Option<ItemId>, Vec<TimerAction>) {
    use TimerAction::{BeginSession, CancelTick, FlushSession, InstallTick};

    match (active, command) {
        (Some(current), TimerCommand::Start(target)) if current == target => {
            (Some(current.clone()), Vec::new())
        }
        (Some(current), TimerCommand::Start(target)) => (
            Some(target.clone()),
            vec![
                CancelTick,
                FlushSession(current.clone()),
                BeginSession(target.clone()),
                InstallTick(target.clone()),
            ],
        ),
        (None, TimerCommand::Start(target)) => (
            Some(target.clone()),
            vec![
                CancelTick,
                BeginSession(target.clone()),
                InstallTick(target.clone()),
            ],
        ),
        (Some(current), TimerCommand::Stop(target)) if current == target => {
            (None, vec![CancelTick, FlushSession(current.clone())])
        }
        (Some(current), TimerCommand::Stop(_)) => (Some(current.clone()), Vec::new()),
        (None, TimerCommand::Stop(_)) => (None, Vec::new()),
        (Some(current), TimerCommand::Halt) => {
            (None, vec![CancelTick, FlushSession(current.clone())])
        }
        (None, TimerCommand::Halt) => (None, vec![CancelTick]),
    }
}

/// A session that was closed and credited to its item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedSession {
    pub item: ItemId,
    pub started_at: DateTime<Utc>,
    /// Whole seconds credited by this session.
    pub elapsed: u64,
    /// Item total after crediting.
    pub total_time: u64,
}

/// What a command changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerOutcome {
    pub flushed: Option<FlushedSession>,
    pub begun: Option<ItemId>,
}

impl TimerOutcome {
    /// Returns `true` if the command changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.flushed.is_none() && self.begun.is_none()
    }
}

type TickListener = Arc<dyn Fn(&ItemId) + Send + Sync + 'static>;

/// Per-category timer: the active item and its tick process.
pub struct TimerEngine {
    active: Option<ItemId>,
    tick: Option<TickHandle>,
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
    listener: Option<TickListener>,
}

impl TimerEngine {
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>, interval: Duration) -> Self {
        Self {
            active: None,
            tick: None,
            scheduler,
            interval,
            listener: None,
        }
    }

    /// Sets the callback run on every tick with the active item's id.
    #[must_use]
    pub fn with_tick_listener(mut self, listener: impl Fn(&ItemId) + Send + Sync + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    #[must_use]
    pub fn active(&self) -> Option<&ItemId> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn is_running(&self, id: &ItemId) -> bool {
        self.active.as_ref() == Some(id)
    }

    /// Returns `true` while a tick process is installed.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.tick.is_some()
    }

    /// Runs `command` against `store` at instant `now`.
    ///
    /// # Errors
    ///
    /// `Start` fails with [`TodoError::NotFound`] for an unknown item and
    /// with [`ValidationError::ItemDone`] for a completed one. Redundant
    /// stops are never errors.
    pub fn apply(
        &mut self,
        command: TimerCommand,
        store: &mut ItemStore,
        now: DateTime<Utc>,
    ) -> Result<TimerOutcome> {
        if let TimerCommand::Start(target) = &command {
            let item = store
                .get(target)
                .ok_or_else(|| TodoError::NotFound(target.clone()))?;
            if item.done {
                return Err(ValidationError::ItemDone(target.clone()).into());
            }
        }

        let (next, actions) = transition(self.active.as_ref(), &command);
        let mut outcome = TimerOutcome::default();

        for action in actions {
            trace!(?action, "Applying timer action");
            match action {
                TimerAction::CancelTick => self.cancel_tick(),
                TimerAction::FlushSession(id) => outcome.flushed = flush_session(store, &id, now),
                TimerAction::BeginSession(id) => {
                    store.update(&id, &ItemPatch {
                        current_session_start: Some(Some(now)),
                        ..ItemPatch::default()
                    });
                    outcome.begun = Some(id);
                }
                TimerAction::InstallTick(id) => self.install_tick(id),
            }
        }

        self.active = next;
        Ok(outcome)
    }

    /// Makes `id` the active item without touching the store, restarting the
    /// tick process. Used when a persisted session is recovered on load.
    pub fn resume(&mut self, id: ItemId) {
        debug!(item_id = %id, "Resuming timer session");
        self.cancel_tick();
        self.install_tick(id.clone());
        self.active = Some(id);
    }

    /// Returns to `previous` after a transition could not be persisted.
    pub fn rollback(&mut self, previous: Option<ItemId>) {
        match previous {
            Some(id) => self.resume(id),
            None => {
                self.cancel_tick();
                self.active = None;
            }
        }
    }

    /// Like [`rollback`](Self::rollback) but leaves no tick process behind.
    /// Used when a teardown is abandoned with the session still open.
    pub fn rollback_idle(&mut self, previous: Option<ItemId>) {
        self.cancel_tick();
        self.active = previous;
    }

    fn cancel_tick(&mut self) {
        if let Some(handle) = self.tick.take() {
            handle.cancel();
        }
    }

    fn install_tick(&mut self, id: ItemId) {
        // Never two live processes: drop the old handle before scheduling.
        self.cancel_tick();
        let listener = self.listener.clone();
        let handle = self.scheduler.schedule(
            self.interval,
            Box::new(move || {
                if let Some(listener) = &listener {
                    listener(&id);
                }
            }),
        );
        self.tick = Some(handle);
    }
}

impl fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerEngine")
            .field("active", &self.active)
            .field("ticking", &self.tick.is_some())
            .field("interval", &self.interval)
            .finish()
    }
}

/// Credits the open session of `id` to its total and closes it.
fn flush_session(store: &mut ItemStore, id: &ItemId, now: DateTime<Utc>) -> Option<FlushedSession> {
    let Some(item) = store.get(id) else {
        warn!(item_id = %id, "Active item missing from store, session dropped");
        return None;
    };
    let started_at = item.current_session_start?;
    let elapsed = elapsed_seconds(started_at, now);
    let total_time = item.total_time.saturating_add(elapsed);

    store.update(id, &ItemPatch {
        total_time: Some(total_time),
        current_session_start: Some(None),
        ..ItemPatch::default()
    });

    Some(FlushedSession {
        item: id.clone(),
        started_at,
        elapsed,
        total_time,
    })
}
