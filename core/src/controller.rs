//! Per-category list controller.
//!
//! A [`ListController`] owns one category's [`ItemStore`], its
//! [`TimerEngine`] and a handle to the [`Backend`]. Every operation mutates
//! the store first, then writes through to the backend; when the write fails
//! or times out the snapshot taken before the mutation is reinstated, so local
//! state never drifts from what was persisted.
//!
//! Operations take `&mut self`, so one controller never runs two of them at
//! once and a slow backend call cannot complete after a later action on the
//! same list.
//!
//! Ticks from the running timer are forwarded as [`TickEvent`]s on the
//! channel configured in [`ListContext`]; the shell re-renders on each one.
//! Dropping the controller cancels its tick process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::duration::display_label;
use crate::error::{Result, TodoError, ValidationError};
use crate::persistence::Backend;
use crate::store::{ItemStore, Snapshot};
use crate::ticker::Scheduler;
use crate::timer::{FlushedSession, TimerCommand, TimerEngine, DEFAULT_TICK_INTERVAL};
use crate::types::{elapsed_seconds, validate_name, Category, ItemId, ItemPatch, TodoItem};

/// Emitted once per tick interval while an item of `category` is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickEvent {
    pub category: Category,
    pub item_id: ItemId,
}

/// Collaborators shared by the controllers of one shell.
#[derive(Debug, Clone)]
pub struct ListContext {
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn Scheduler>,
    pub tick_interval: Duration,
    pub ticks: Option<UnboundedSender<TickEvent>>,
}

impl ListContext {
    pub fn new(clock: Arc<dyn Clock>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            clock,
            scheduler,
            tick_interval: DEFAULT_TICK_INTERVAL,
            ticks: None,
        }
    }

    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Forwards tick events to `sender`.
    #[must_use]
    pub fn with_tick_channel(mut self, sender: UnboundedSender<TickEvent>) -> Self {
        self.ticks = Some(sender);
        self
    }
}

/// Render model of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub id: ItemId,
    pub name: String,
    pub done: bool,
    /// `true` for the running item.
    pub active: bool,
    /// Total plus the open session, in seconds.
    pub display_time: u64,
    /// `"<bucket> (<n>s)"`, or `None` if nothing was tracked yet.
    pub label: Option<String>,
}

/// Controller for one category list.
pub struct ListController<B> {
    category: Category,
    store: ItemStore,
    timer: TimerEngine,
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
}

impl<B: Backend> ListController<B> {
    /// Creates an empty controller. Call [`load`](Self::load) to fetch items.
    pub fn new(category: Category, backend: Arc<B>, context: &ListContext) -> Self {
        let mut timer = TimerEngine::new(Arc::clone(&context.scheduler), context.tick_interval);
        if let Some(sender) = context.ticks.clone() {
            timer = timer.with_tick_listener(move |item_id| {
                let event = TickEvent {
                    category,
                    item_id: item_id.clone(),
                };
                if sender.send(event).is_err() {
                    trace!(category = %category, "Tick receiver dropped");
                }
            });
        }

        Self {
            category,
            store: ItemStore::new(),
            timer,
            backend,
            clock: Arc::clone(&context.clock),
        }
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    #[must_use]
    pub fn items(&self) -> &[TodoItem] {
        self.store.items()
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.store.len()
    }

    /// The running item, if any.
    #[must_use]
    pub fn active_item(&self) -> Option<&TodoItem> {
        self.timer.active().and_then(|id| self.store.get(id))
    }

    /// Rows in display order with live display times.
    #[must_use]
    pub fn rows(&self) -> Vec<ItemView> {
        let now = self.clock.now();
        self.store
            .items()
            .iter()
            .map(|item| {
                let display_time = item.display_time(now);
                ItemView {
                    id: item.id.clone(),
                    name: item.name.clone(),
                    done: item.done,
                    active: self.timer.is_running(&item.id),
                    display_time,
                    label: display_label(display_time),
                }
            })
            .collect()
    }

    /// Replaces the list with the backend's copy.
    ///
    /// A persisted open session is resumed as the running item. If the data
    /// holds several (or one on a done item), only the latest start on a
    /// not-done item is kept; the others are closed without crediting time.
    /// A resumed session counts from its stored start, so a timer started by
    /// one shell keeps running while no shell is open.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the previous list is kept.
    pub async fn load(&mut self) -> Result<Snapshot> {
        let items = self.backend.load(self.category).await?;
        let mut store = ItemStore::from_items(items);

        let resumed = store
            .items()
            .iter()
            .filter(|item| !item.done)
            .filter_map(|item| item.current_session_start.map(|start| (start, item.id.clone())))
            .max_by_key(|(start, _)| *start)
            .map(|(_, id)| id);

        let stale: Vec<ItemId> = store
            .items()
            .iter()
            .filter(|item| item.is_running() && Some(&item.id) != resumed.as_ref())
            .map(|item| item.id.clone())
            .collect();

        for id in &stale {
            warn!(category = %self.category, item_id = %id, "Closing stray open session");
            store.update(id, &ItemPatch::clear_session());
            let patch = ItemPatch::clear_session();
            if let Err(e) = self
                .backend
                .update(self.category, id, &patch, store.items())
                .await
            {
                warn!(item_id = %id, error = %e, "Failed to persist closed session");
            }
        }

        self.timer.rollback(None);
        self.store = store;
        if let Some(id) = resumed {
            let now = self.clock.now();
            let started = self.store.get(&id).and_then(|item| item.current_session_start);
            if let Some(started_at) = started {
                info!(
                    category = %self.category,
                    item_id = %id,
                    %started_at,
                    running_secs = elapsed_seconds(started_at, now),
                    "Resuming running timer"
                );
            }
            self.timer.resume(id);
        }

        debug!(category = %self.category, count = self.store.len(), "List loaded");
        Ok(self.store.snapshot())
    }

    /// Appends a new item named `name`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyName`] for a blank name; the backend error if
    /// the item could not be created, in which case it is removed again.
    pub async fn add(&mut self, name: &str) -> Result<Snapshot> {
        let mut draft = TodoItem::new(validate_name(name)?);
        draft.category = Some(self.category);
        draft.created_at = Some(self.clock.now());
        let draft_id = draft.id.clone();

        let before = self.store.snapshot();
        self.store.insert(draft.clone());

        match self
            .backend
            .create(self.category, &draft, self.store.items())
            .await
        {
            Ok(saved) => {
                debug!(category = %self.category, item_id = %saved.id, "Item added");
                if saved != draft {
                    self.store.replace(&draft_id, saved);
                }
                Ok(self.store.snapshot())
            }
            Err(e) => {
                self.store.restore(before);
                Err(e.into())
            }
        }
    }

    /// Flips `done`. A running item is stopped first, crediting its session.
    ///
    /// # Errors
    ///
    /// [`TodoError::NotFound`] for an unknown id, or the backend error.
    pub async fn toggle_done(&mut self, id: &ItemId) -> Result<Snapshot> {
        let done = self
            .store
            .get(id)
            .ok_or_else(|| TodoError::NotFound(id.clone()))?
            .done;
        if self.timer.is_running(id) {
            self.stop(id).await?;
        }
        self.commit_patch(id, ItemPatch::done(!done)).await
    }

    /// Deletes the item. A running item is stopped first and its session
    /// persisted before the delete. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the item is kept.
    pub async fn remove(&mut self, id: &ItemId) -> Result<Snapshot> {
        if !self.store.contains(id) {
            return Ok(self.store.snapshot());
        }
        if self.timer.is_running(id) {
            self.stop(id).await?;
        }

        let before = self.store.snapshot();
        self.store.remove(id);
        if let Err(e) = self
            .backend
            .delete(self.category, id, self.store.items())
            .await
        {
            self.store.restore(before);
            return Err(e.into());
        }

        debug!(category = %self.category, item_id = %id, "Item removed");
        Ok(self.store.snapshot())
    }

    /// Replaces the item's name.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyName`], [`TodoError::NotFound`] or the backend
    /// error.
    pub async fn rename(&mut self, id: &ItemId, name: &str) -> Result<Snapshot> {
        let name = validate_name(name)?;
        self.commit_patch(id, ItemPatch::rename(name)).await
    }

    /// Merges a partial update of `name` and/or `done`.
    ///
    /// Marking the running item done stops it first.
    ///
    /// # Errors
    ///
    /// [`ValidationError::TimerManagedField`] if the patch writes
    /// `totalTime` or `currentSessionStart`, which only the timer may change.
    pub async fn update(&mut self, id: &ItemId, mut patch: ItemPatch) -> Result<Snapshot> {
        if patch.touches_session() {
            return Err(ValidationError::TimerManagedField.into());
        }
        if let Some(name) = &patch.name {
            patch.name = Some(validate_name(name)?);
        }
        if !self.store.contains(id) {
            return Err(TodoError::NotFound(id.clone()));
        }
        if patch.is_empty() {
            return Ok(self.store.snapshot());
        }
        if patch.done == Some(true) && self.timer.is_running(id) {
            self.stop(id).await?;
        }
        self.commit_patch(id, patch).await
    }

    /// Starts timing `id`, stopping the running item first.
    ///
    /// Starting the item that is already running changes nothing.
    ///
    /// # Errors
    ///
    /// [`TodoError::NotFound`], [`ValidationError::ItemDone`], or the backend
    /// error. If the previous item's session could not be saved, nothing
    /// changes; if only the new session could not be saved, the previous one
    /// stays stopped and nothing runs.
    pub async fn start(&mut self, id: &ItemId) -> Result<Snapshot> {
        let before = self.store.snapshot();
        let previous = self.timer.active().cloned();
        let now = self.clock.now();

        let outcome = self
            .timer
            .apply(TimerCommand::Start(id.clone()), &mut self.store, now)?;

        if let Some(flushed) = &outcome.flushed {
            if let Err(e) = self.persist_session(&flushed.item).await {
                self.store.restore(before);
                self.timer.rollback(previous);
                return Err(e);
            }
            log_flush(self.category, flushed);
        }

        if let Some(begun) = &outcome.begun {
            if let Err(e) = self.persist_session(begun).await {
                self.store.update(begun, &ItemPatch::clear_session());
                self.timer.rollback(None);
                return Err(e);
            }
            info!(category = %self.category, item_id = %begun, "Timer started");
        }

        Ok(self.store.snapshot())
    }

    /// Stops timing `id`, crediting the elapsed whole seconds.
    ///
    /// Stopping an item that is not running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the session is then still open.
    pub async fn stop(&mut self, id: &ItemId) -> Result<Snapshot> {
        self.run_stop(TimerCommand::Stop(id.clone())).await?;
        Ok(self.store.snapshot())
    }

    /// Flushes the running session and cancels ticking. Call before the
    /// shell exits.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the session stays open in storage and is
    /// resumed by the next [`load`](Self::load).
    pub async fn teardown(&mut self) -> Result<Option<FlushedSession>> {
        self.run_stop(TimerCommand::Halt).await
    }

    /// [`teardown`](Self::teardown) bounded by `limit`.
    ///
    /// # Errors
    ///
    /// [`TodoError::Timeout`] if the flush did not finish in time. The list
    /// is then put back to the still-open session that storage holds, with
    /// no tick process; a later `teardown` can retry the flush, and the next
    /// [`load`](Self::load) resumes the session otherwise.
    pub async fn teardown_with_timeout(
        &mut self,
        limit: Duration,
    ) -> Result<Option<FlushedSession>> {
        let before = self.store.snapshot();
        let previous = self.timer.active().cloned();

        let outcome = tokio::time::timeout(limit, self.teardown()).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                self.store.restore(before);
                self.timer.rollback_idle(previous.clone());
                warn!(
                    category = %self.category,
                    item_id = ?previous,
                    ?limit,
                    "Teardown timed out, session left open"
                );
                Err(TodoError::Timeout(limit))
            }
        }
    }

    async fn run_stop(&mut self, command: TimerCommand) -> Result<Option<FlushedSession>> {
        let before = self.store.snapshot();
        let previous = self.timer.active().cloned();
        let now = self.clock.now();

        let outcome = self.timer.apply(command, &mut self.store, now)?;
        let Some(flushed) = outcome.flushed else {
            return Ok(None);
        };

        if let Err(e) = self.persist_session(&flushed.item).await {
            self.store.restore(before);
            self.timer.rollback(previous);
            return Err(e);
        }
        log_flush(self.category, &flushed);
        Ok(Some(flushed))
    }

    async fn persist_session(&self, id: &ItemId) -> Result<()> {
        let patch = self
            .store
            .get(id)
            .map(ItemPatch::session_of)
            .ok_or_else(|| TodoError::NotFound(id.clone()))?;
        self.backend
            .update(self.category, id, &patch, self.store.items())
            .await?;
        Ok(())
    }

    async fn commit_patch(&mut self, id: &ItemId, patch: ItemPatch) -> Result<Snapshot> {
        let before = self.store.snapshot();
        if self.store.update(id, &patch).is_none() {
            return Err(TodoError::NotFound(id.clone()));
        }

        if let Err(e) = self
            .backend
            .update(self.category, id, &patch, self.store.items())
            .await
        {
            self.store.restore(before);
            return Err(e.into());
        }

        debug!(category = %self.category, item_id = %id, "Item updated");
        Ok(self.store.snapshot())
    }
}

impl<B> std::fmt::Debug for ListController<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListController")
            .field("category", &self.category)
            .field("items", &self.store.len())
            .field("timer", &self.timer)
            .finish()
    }
}

fn log_flush(category: Category, flushed: &FlushedSession) {
    info!(
        category = %category,
        item_id = %flushed.item,
        elapsed_secs = flushed.elapsed,
        total_secs = flushed.total_time,
        "Timer stopped"
    );
}
