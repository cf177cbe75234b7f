//! The four quadrant lists and item lookup by row number or id prefix.

use std::sync::Arc;

use thiserror::Error;

use quadtodo_core::{Backend, Category, ItemId, ItemView, ListContext, ListController, Result};

/// Errors from resolving an item selector against a list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    /// No row number or id prefix matched.
    #[error("no item matches '{0}'")]
    NoMatch(String),

    /// The id prefix matched more than one item.
    #[error("'{selector}' is ambiguous ({count} items match)")]
    Ambiguous { selector: String, count: usize },
}

/// Opens list controllers that share one backend and list context.
pub struct Board<B> {
    backend: Arc<B>,
    context: ListContext,
}

impl<B: Backend> Board<B> {
    pub fn new(backend: Arc<B>, context: ListContext) -> Self {
        Self { backend, context }
    }

    /// Opens and loads the list of one quadrant.
    pub async fn open(&self, category: Category) -> Result<ListController<B>> {
        let mut list = ListController::new(category, Arc::clone(&self.backend), &self.context);
        list.load().await?;
        Ok(list)
    }

    /// Opens every quadrant in display order.
    pub async fn open_all(&self) -> Result<Vec<ListController<B>>> {
        let mut lists = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            lists.push(self.open(category).await?);
        }
        Ok(lists)
    }
}

/// Resolves `selector` to an item id.
///
/// A number is a 1-based row as printed by `list`; anything else is matched
/// as an id prefix, which must be unique.
pub fn resolve(rows: &[ItemView], selector: &str) -> std::result::Result<ItemId, SelectError> {
    let selector = selector.trim();

    if let Ok(row) = selector.parse::<usize>() {
        if let Some(view) = row.checked_sub(1).and_then(|index| rows.get(index)) {
            return Ok(view.id.clone());
        }
    }

    if let Some(exact) = rows.iter().find(|view| view.id.as_str() == selector) {
        return Ok(exact.id.clone());
    }

    let matches: Vec<&ItemView> = rows
        .iter()
        .filter(|view| !selector.is_empty() && view.id.as_str().starts_with(selector))
        .collect();

    match matches.as_slice() {
        [only] => Ok(only.id.clone()),
        [] => Err(SelectError::NoMatch(selector.to_string())),
        many => Err(SelectError::Ambiguous {
            selector: selector.to_string(),
            count: many.len(),
        }),
    }
}
