//! In-memory ordered item collection for one category.
//!
//! The collection is held behind an [`Arc`] and mutated copy-on-write, so a
//! [`Snapshot`] handed to a renderer or a backend never changes underneath
//! it.
//!
//! # Ordering
//!
//! After every mutation the items form a stable partition: every not-done
//! item precedes every done item, and relative order inside each group is
//! insertion order. A toggled item therefore lands at the boundary between
//! the two groups.

use std::sync::Arc;

use tracing::trace;

use crate::error::ValidationError;
use crate::types::{validate_name, ItemId, ItemPatch, TodoItem};

/// Immutable view of a category's items at one point in time.
pub type Snapshot = Arc<Vec<TodoItem>>;

/// Ordered collection of the items of one category.
#[derive(Debug, Clone, Default)]
pub struct ItemStore {
    items: Snapshot,
}

impl ItemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from loaded items, applying the partition order.
    #[must_use]
    pub fn from_items(items: Vec<TodoItem>) -> Self {
        let mut store = Self {
            items: Arc::new(items),
        };
        store.partition();
        store
    }

    /// Current snapshot. Cheap to clone and unaffected by later mutations.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.items)
    }

    #[must_use]
    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&TodoItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Appends a new not-done item named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] if `name` is blank.
    pub fn add(&mut self, name: &str) -> Result<Snapshot, ValidationError> {
        let item = TodoItem::new(validate_name(name)?);
        Ok(self.insert(item))
    }

    /// Inserts `item` at the end of its partition.
    pub fn insert(&mut self, item: TodoItem) -> Snapshot {
        let items = Arc::make_mut(&mut self.items);
        if item.done {
            items.push(item);
        } else {
            let boundary = items.iter().position(|i| i.done).unwrap_or(items.len());
            items.insert(boundary, item);
        }
        self.snapshot()
    }

    /// Flips `done` on the item. Returns `None` if the id is unknown.
    pub fn toggle_done(&mut self, id: &ItemId) -> Option<Snapshot> {
        let done = self.get(id)?.done;
        self.update(id, &ItemPatch::done(!done))
    }

    /// Removes the item. Unknown ids are ignored.
    pub fn remove(&mut self, id: &ItemId) -> Snapshot {
        if self.contains(id) {
            Arc::make_mut(&mut self.items).retain(|item| &item.id != id);
        }
        self.snapshot()
    }

    /// Merges `patch` into the item. Returns `None` if the id is unknown.
    pub fn update(&mut self, id: &ItemId, patch: &ItemPatch) -> Option<Snapshot> {
        let index = self.items.iter().position(|item| &item.id == id)?;
        let items = Arc::make_mut(&mut self.items);
        patch.apply_to(&mut items[index]);
        if patch.done.is_some() {
            self.partition();
        }
        trace!(item_id = %id, "Item updated");
        Some(self.snapshot())
    }

    /// Swaps the item stored under `id` for `item` (which may carry a new
    /// id). Returns `false` if `id` is unknown.
    pub fn replace(&mut self, id: &ItemId, item: TodoItem) -> bool {
        let Some(index) = self.items.iter().position(|i| &i.id == id) else {
            return false;
        };
        let done_changed = self.items[index].done != item.done;
        Arc::make_mut(&mut self.items)[index] = item;
        if done_changed {
            self.partition();
        }
        true
    }

    /// Reinstates an earlier snapshot wholesale.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.items = snapshot;
    }

    fn partition(&mut self) {
        if self.items.windows(2).all(|w| !w[0].done || w[1].done) {
            return;
        }
        Arc::make_mut(&mut self.items).sort_by_key(|item| item.done);
    }
}
