//! Persistence backends for category lists.
//!
//! Every backend implements [`Backend`]. Write operations receive both the
//! single changed item and the full post-mutation list, so a backend can
//! choose its own granularity:
//!
//! - [`LocalBackend`] overwrites the whole list under the category label in a
//!   [`KeyValueStore`] ([`FileStore`] on disk, [`MemoryStore`] in tests)
//! - [`RemoteBackend`] issues one object-store request per changed item,
//!   scoped to the logged-in owner
//!
//! [`AnyBackend`] picks one of the two at startup from [`Config`].

mod local;
mod remote;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::auth::{AuthError, SessionHandle};
use crate::config::{BackendKind, Config};
use crate::types::{Category, ItemId, ItemPatch, TodoItem};

pub use local::{FileStore, KeyValueStore, LocalBackend, MemoryStore};
pub use remote::RemoteBackend;

/// Errors raised by storage backends.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored or received JSON could not be (de)serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// The record does not exist or is not visible to this user.
    #[error("record not found: {0}")]
    NotFound(ItemId),

    /// The server answered with a body we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Missing or rejected login.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The backend could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Storage capability behind a list controller.
///
/// `items` is always the category's full list after the local mutation.
pub trait Backend: Send + Sync {
    /// Loads the category's items, oldest first.
    fn load(
        &self,
        category: Category,
    ) -> impl Future<Output = Result<Vec<TodoItem>, PersistenceError>> + Send;

    /// Stores a new item. Returns the item as saved, which may carry a
    /// server-assigned id and timestamps.
    fn create(
        &self,
        category: Category,
        item: &TodoItem,
        items: &[TodoItem],
    ) -> impl Future<Output = Result<TodoItem, PersistenceError>> + Send;

    /// Writes the fields set in `patch` for item `id`.
    fn update(
        &self,
        category: Category,
        id: &ItemId,
        patch: &ItemPatch,
        items: &[TodoItem],
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Deletes item `id`. Deleting an absent item succeeds.
    fn delete(
        &self,
        category: Category,
        id: &ItemId,
        items: &[TodoItem],
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Backend chosen at runtime.
#[derive(Debug)]
pub enum AnyBackend {
    Local(LocalBackend<Arc<dyn KeyValueStore>>),
    Remote(RemoteBackend),
}

impl AnyBackend {
    /// Builds the backend selected by `config`. The remote backend reads the
    /// owner identity from `session` on every request.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Unavailable`] if the remote backend is
    /// selected without remote settings, or the HTTP client error.
    pub fn from_config(config: &Config, session: SessionHandle) -> Result<Self, PersistenceError> {
        match config.backend {
            BackendKind::Local => {
                info!(dir = %config.data_dir.display(), "Using local file storage");
                let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.data_dir));
                Ok(Self::Local(LocalBackend::new(store)))
            }
            BackendKind::Remote => {
                let remote = config.remote.as_ref().ok_or_else(|| {
                    PersistenceError::Unavailable("remote backend is not configured".to_string())
                })?;
                info!(server = %remote.server_url, "Using remote object store");
                Ok(Self::Remote(RemoteBackend::new(remote, session)?))
            }
        }
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Local(_) => BackendKind::Local,
            Self::Remote(_) => BackendKind::Remote,
        }
    }
}

impl Backend for AnyBackend {
    async fn load(&self, category: Category) -> Result<Vec<TodoItem>, PersistenceError> {
        match self {
            Self::Local(backend) => backend.load(category).await,
            Self::Remote(backend) => backend.load(category).await,
        }
    }

    async fn create(
        &self,
        category: Category,
        item: &TodoItem,
        items: &[TodoItem],
    ) -> Result<TodoItem, PersistenceError> {
        match self {
            Self::Local(backend) => backend.create(category, item, items).await,
            Self::Remote(backend) => backend.create(category, item, items).await,
        }
    }

    async fn update(
        &self,
        category: Category,
        id: &ItemId,
        patch: &ItemPatch,
        items: &[TodoItem],
    ) -> Result<(), PersistenceError> {
        match self {
            Self::Local(backend) => backend.update(category, id, patch, items).await,
            Self::Remote(backend) => backend.update(category, id, patch, items).await,
        }
    }

    async fn delete(
        &self,
        category: Category,
        id: &ItemId,
        items: &[TodoItem],
    ) -> Result<(), PersistenceError> {
        match self {
            Self::Local(backend) => backend.delete(category, id, items).await,
            Self::Remote(backend) => backend.delete(category, id, items).await,
        }
    }
}
