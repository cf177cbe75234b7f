//! Error types for Quadtodo.
//!
//! Each concern owns its error enum ([`ValidationError`] here,
//! [`PersistenceError`] in the persistence module, [`AuthError`] in the auth
//! module, [`ConfigError`](crate::config::ConfigError) in the config module).
//! [`TodoError`] is the crate-level type returned by list controller
//! operations.

use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthError;
use crate::persistence::PersistenceError;
use crate::types::ItemId;

/// Input rejected before any state was mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Item name is empty after trimming.
    #[error("item name cannot be empty")]
    EmptyName,

    /// Time tracking was requested for an item that is already done.
    #[error("cannot track time on completed item {0}")]
    ItemDone(ItemId),

    /// A partial update tried to write fields owned by the timer.
    #[error("totalTime and currentSessionStart can only change through the timer")]
    TimerManagedField,

    /// Category label or slug did not match any quadrant.
    #[error("unknown category: {0}")]
    UnknownCategory(String),
}

/// Errors returned by list controller operations.
#[derive(Error, Debug)]
pub enum TodoError {
    /// Input validation failed; nothing was changed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The item does not exist (locally or in the remote store).
    #[error("item not found: {0}")]
    NotFound(ItemId),

    /// Storage or network failure. Local state was rolled back.
    #[error("persistence error: {0}")]
    Persistence(PersistenceError),

    /// Sign-up/login failure or remote access without a session.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A flush did not complete within the allotted time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<PersistenceError> for TodoError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Auth(auth) => Self::Auth(auth),
            PersistenceError::NotFound(id) => Self::NotFound(id),
            other => Self::Persistence(other),
        }
    }
}

/// A specialized `Result` type for Quadtodo operations.
pub type Result<T> = std::result::Result<T, TodoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        assert_eq!(
            ValidationError::EmptyName.to_string(),
            "item name cannot be empty"
        );
        assert_eq!(
            ValidationError::ItemDone(ItemId::new("abc")).to_string(),
            "cannot track time on completed item abc"
        );
        assert_eq!(
            ValidationError::UnknownCategory("Someday".to_string()).to_string(),
            "unknown category: Someday"
        );
    }

    #[test]
    fn todo_error_wraps_validation() {
        let err: TodoError = ValidationError::EmptyName.into();
        assert!(matches!(err, TodoError::Validation(ValidationError::EmptyName)));
        assert_eq!(
            err.to_string(),
            "validation error: item name cannot be empty"
        );
    }

    #[test]
    fn persistence_not_found_lifts_to_not_found() {
        let err: TodoError = PersistenceError::NotFound(ItemId::new("gone")).into();
        assert!(matches!(err, TodoError::NotFound(ref id) if id.as_str() == "gone"));
    }

    #[test]
    fn persistence_auth_lifts_to_auth() {
        let err: TodoError = PersistenceError::Auth(AuthError::NotLoggedIn).into();
        assert!(matches!(err, TodoError::Auth(AuthError::NotLoggedIn)));
    }

    #[test]
    fn other_persistence_errors_stay_wrapped() {
        let err: TodoError = PersistenceError::ServerError {
            status: 500,
            message: "boom".to_string(),
        }
        .into();
        assert!(matches!(err, TodoError::Persistence(_)));
        assert_eq!(err.to_string(), "persistence error: server error: 500 - boom");
    }

    #[test]
    fn timeout_display() {
        let err = TodoError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "timed out after 5s");
    }

    #[test]
    fn result_type_alias_works() {
        fn example_function() -> Result<i32> {
            Ok(42)
        }

        fn example_error_function() -> Result<i32> {
            Err(TodoError::NotFound(ItemId::new("x")))
        }

        assert!(example_function().is_ok());
        assert!(example_error_function().is_err());
    }
}
