//! Identity provider client.
//!
//! [`AuthClient`] signs users up, logs them in and out against the object
//! store's user endpoints. The logged-in [`Identity`] lives in a
//! [`SessionHandle`] that the remote backend shares, so every item request
//! carries the current session token and is scoped to its owner.
//!
//! When given a [`KeyValueStore`], the client saves the identity under
//! `currentUser` and restores it on construction, so a login survives
//! restarts.
//!
//! # Example
//!
//! ```rust,ignore
//! use quadtodo_core::auth::AuthClient;
//! use quadtodo_core::config::RemoteConfig;
//!
//! let config = RemoteConfig::new("https://api.example.com/parse", "app-id");
//! let auth = AuthClient::new(&config)?;
//! let me = auth.log_in("alice", "hunter2").await?;
//! println!("Logged in as {}", me.username);
//! ```

use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use reqwest::{Method, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::persistence::KeyValueStore;
use crate::rest::{
    RestClient, ServerFault, CODE_INVALID_SESSION, CODE_OBJECT_NOT_FOUND, CODE_USERNAME_TAKEN,
};

/// Key under which the logged-in identity is persisted.
pub const CURRENT_USER_KEY: &str = "currentUser";

/// Errors from sign-up, login and session-scoped access.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Remote data was accessed without a logged-in user.
    #[error("not logged in")]
    NotLoggedIn,

    /// Username or password was empty.
    #[error("username and password are required")]
    MissingCredentials,

    /// The server rejected the username/password pair.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// Sign-up with a username that already exists.
    #[error("username already taken: {0}")]
    UsernameTaken(String),

    /// The session token expired or was revoked. Log in again.
    #[error("session expired, please log in again")]
    InvalidSession,

    /// The server refused access to the resource.
    #[error("access denied: {0}")]
    Forbidden(String),

    /// The server could not be reached.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    /// Any other error reported by the server.
    #[error("server error: {status} - {message}")]
    Server { status: u16, message: String },

    /// The response could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// Maps an error response to an auth error.
    pub(crate) fn from_fault(status: u16, fault: &ServerFault) -> Self {
        match fault.code {
            Some(CODE_INVALID_SESSION) => return Self::InvalidSession,
            Some(CODE_OBJECT_NOT_FOUND) => return Self::InvalidCredentials,
            _ => {}
        }
        match status {
            401 | 403 => Self::Forbidden(fault.error.clone()),
            _ => Self::Server {
                status,
                message: fault.error.clone(),
            },
        }
    }
}

/// The logged-in user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Object id of the user record.
    pub id: String,

    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Token sent as `X-Parse-Session-Token`.
    pub session_token: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("created_at", &self.created_at)
            .field("session_token", &"[REDACTED]")
            .finish()
    }
}

/// Shared slot holding the current identity.
///
/// Clones refer to the same slot.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Identity>>>,
}

impl SessionHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that starts out logged in as `identity`.
    #[must_use]
    pub fn with_identity(identity: Identity) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(identity))),
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    pub fn set(&self, identity: Identity) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = Some(identity);
    }

    /// Clears the slot, returning what was there.
    pub fn take(&self) -> Option<Identity> {
        self.inner.write().unwrap_or_else(|p| p.into_inner()).take()
    }
}

/// `POST /users` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    object_id: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    session_token: String,
}

/// `POST /login` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    object_id: String,
    username: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    session_token: String,
}

/// Client for the identity provider.
pub struct AuthClient {
    rest: RestClient,
    session: SessionHandle,
    persistence: Option<Arc<dyn KeyValueStore>>,
}

impl AuthClient {
    /// Creates a client with an empty session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(config: &RemoteConfig) -> Result<Self, AuthError> {
        let rest = RestClient::new(config)
            .map_err(|e| AuthError::Unavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            rest,
            session: SessionHandle::new(),
            persistence: None,
        })
    }

    /// Persists the identity in `store` and restores any saved one.
    ///
    /// An unreadable saved identity is discarded with a warning.
    #[must_use]
    pub fn with_persistence(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        match store.get(CURRENT_USER_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Identity>(&raw) {
                Ok(identity) => {
                    debug!(username = %identity.username, "Restored saved login");
                    self.session.set(identity);
                }
                Err(e) => warn!(error = %e, "Discarding unreadable saved login"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read saved login"),
        }
        self.persistence = Some(store);
        self
    }

    /// The session slot shared with the remote backend.
    #[must_use]
    pub fn session(&self) -> SessionHandle {
        self.session.clone()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<Identity> {
        self.session.current()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }

    /// Registers a new user and logs them in.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingCredentials`] for an empty username or password
    /// - [`AuthError::UsernameTaken`] if the username exists
    /// - [`AuthError::Unavailable`] if the server cannot be reached
    pub async fn sign_up(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<Identity, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let email = email.map(str::trim).filter(|e| !e.is_empty());

        let mut body = json!({ "username": username, "password": password });
        if let Some(email) = email {
            body["email"] = json!(email);
        }

        debug!(username = %username, "Signing up");
        let response = self
            .send(self.rest.request(Method::POST, "users", None).json(&body))
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let fault = ServerFault::read(response).await;
            if fault.code == Some(CODE_USERNAME_TAKEN) {
                return Err(AuthError::UsernameTaken(username.to_string()));
            }
            return Err(AuthError::from_fault(status, &fault));
        }

        let created: SignUpResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("failed to parse sign-up response: {e}")))?;

        let identity = Identity {
            id: created.object_id,
            username: username.to_string(),
            email: email.map(str::to_string),
            created_at: created.created_at,
            session_token: created.session_token,
        };
        info!(username = %identity.username, "Signed up");
        self.remember(identity.clone());
        Ok(identity)
    }

    /// Logs in with username and password.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingCredentials`] for an empty username or password
    /// - [`AuthError::InvalidCredentials`] if the server rejects them
    /// - [`AuthError::Unavailable`] if the server cannot be reached
    pub async fn log_in(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        debug!(username = %username, "Logging in");
        let body = json!({ "username": username, "password": password });
        let response = self
            .send(self.rest.request(Method::POST, "login", None).json(&body))
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let fault = ServerFault::read(response).await;
            return Err(AuthError::from_fault(status, &fault));
        }

        let user: LoginResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("failed to parse login response: {e}")))?;

        let identity = Identity {
            id: user.object_id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
            session_token: user.session_token,
        };
        info!(username = %identity.username, "Logged in");
        self.remember(identity.clone());
        Ok(identity)
    }

    /// Logs out. The local session is cleared even if the server call fails;
    /// an already-expired session is not an error.
    ///
    /// # Errors
    ///
    /// Returns the server or transport error after clearing the local session.
    pub async fn log_out(&self) -> Result<(), AuthError> {
        let Some(identity) = self.session.take() else {
            return Ok(());
        };
        self.forget();

        let response = self
            .send(self.rest.request(
                Method::POST,
                "logout",
                Some(identity.session_token.as_str()),
            ))
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let fault = ServerFault::read(response).await;
            match AuthError::from_fault(status, &fault) {
                AuthError::InvalidSession => {}
                other => return Err(other),
            }
        }

        info!(username = %identity.username, "Logged out");
        Ok(())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, AuthError> {
        request
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(self.rest.describe_send_error(&e)))
    }

    fn remember(&self, identity: Identity) {
        if let Some(store) = &self.persistence {
            match serde_json::to_string(&identity) {
                Ok(raw) => {
                    if let Err(e) = store.set(CURRENT_USER_KEY, &raw) {
                        warn!(error = %e, "Failed to save login");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to serialize login"),
            }
        }
        self.session.set(identity);
    }

    fn forget(&self) {
        if let Some(store) = &self.persistence {
            if let Err(e) = store.remove(CURRENT_USER_KEY) {
                warn!(error = %e, "Failed to remove saved login");
            }
        }
    }
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.rest.base_url())
            .field("logged_in", &self.session.is_logged_in())
            .field("persistent", &self.persistence.is_some())
            .finish()
    }
}
