//! Per-item backend over the object store's REST API.
//!
//! Items are `TodoItem` objects under `/classes/TodoItem`. Each object holds
//! the owner as a `userId` pointer and an ACL granting read and write to that
//! owner only, so a session token never sees another user's items.

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{Backend, PersistenceError};
use crate::auth::{AuthError, Identity, SessionHandle};
use crate::config::RemoteConfig;
use crate::rest::{RestClient, ServerFault, CODE_INVALID_SESSION, CODE_OBJECT_NOT_FOUND};
use crate::types::{Category, ItemId, ItemPatch, TodoItem};

const CLASS_PATH: &str = "classes/TodoItem";

/// Upper bound on items fetched per category.
const QUERY_LIMIT: u32 = 1_000;

/// A timestamp as the server may return it: epoch millis (as written by us),
/// an ISO string (`createdAt`) or a `{"__type": "Date", "iso": ...}` object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteTimestamp {
    Millis(i64),
    Iso(DateTime<Utc>),
    Date { iso: DateTime<Utc> },
}

impl RemoteTimestamp {
    fn into_datetime(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(ms) => DateTime::from_timestamp_millis(ms),
            Self::Iso(at) | Self::Date { iso: at } => Some(at),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteRecord {
    object_id: String,
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    total_time: Option<u64>,
    #[serde(default)]
    current_session_start: Option<RemoteTimestamp>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    created_at: Option<RemoteTimestamp>,
    #[serde(default)]
    updated_at: Option<RemoteTimestamp>,
}

impl RemoteRecord {
    fn into_item(self) -> TodoItem {
        TodoItem {
            id: ItemId::new(self.object_id),
            name: self.name,
            done: self.done,
            total_time: self.total_time.unwrap_or(0),
            current_session_start: self
                .current_session_start
                .and_then(RemoteTimestamp::into_datetime),
            category: self.category.and_then(|c| c.parse().ok()),
            created_at: self.created_at.and_then(RemoteTimestamp::into_datetime),
            updated_at: self.updated_at.and_then(RemoteTimestamp::into_datetime),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<RemoteRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    object_id: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

fn owner_pointer(identity: &Identity) -> Value {
    json!({ "__type": "Pointer", "className": "_User", "objectId": identity.id })
}

fn millis(at: Option<DateTime<Utc>>) -> Value {
    at.map_or(Value::Null, |at| json!(at.timestamp_millis()))
}

/// Request body for the fields set in `patch`.
fn patch_body(patch: &ItemPatch) -> Map<String, Value> {
    let mut body = Map::new();
    if let Some(name) = &patch.name {
        body.insert("name".to_string(), json!(name));
    }
    if let Some(done) = patch.done {
        body.insert("done".to_string(), json!(done));
    }
    if let Some(total) = patch.total_time {
        body.insert("totalTime".to_string(), json!(total));
    }
    if let Some(start) = patch.current_session_start {
        body.insert("currentSessionStart".to_string(), millis(start));
    }
    body
}

/// Object-store backend scoped to the logged-in user.
pub struct RemoteBackend {
    rest: RestClient,
    session: SessionHandle,
}

impl RemoteBackend {
    /// Creates a backend that reads the owner from `session` on every call.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &RemoteConfig, session: SessionHandle) -> Result<Self, PersistenceError> {
        Ok(Self {
            rest: RestClient::new(config)?,
            session,
        })
    }

    fn identity(&self) -> Result<Identity, PersistenceError> {
        self.session
            .current()
            .ok_or(PersistenceError::Auth(AuthError::NotLoggedIn))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, PersistenceError> {
        request
            .send()
            .await
            .map_err(|e| PersistenceError::Unavailable(self.rest.describe_send_error(&e)))
    }

    /// Passes successful responses through and maps failures. `id` names the
    /// record the request addressed, if any.
    async fn check(
        &self,
        response: Response,
        id: Option<&ItemId>,
    ) -> Result<Response, PersistenceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let fault = ServerFault::read(response).await;
        if fault.code == Some(CODE_INVALID_SESSION) {
            return Err(AuthError::InvalidSession.into());
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::Forbidden(fault.error).into());
        }
        if let Some(id) = id {
            if status == StatusCode::NOT_FOUND || fault.code == Some(CODE_OBJECT_NOT_FOUND) {
                return Err(PersistenceError::NotFound(id.clone()));
            }
        }

        warn!(status = %status, error = %fault.error, "Object store request failed");
        Err(PersistenceError::ServerError {
            status: status.as_u16(),
            message: fault.error,
        })
    }
}

impl fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("base_url", &self.rest.base_url())
            .field("logged_in", &self.session.is_logged_in())
            .finish()
    }
}

impl Backend for RemoteBackend {
    async fn load(&self, category: Category) -> Result<Vec<TodoItem>, PersistenceError> {
        let identity = self.identity()?;
        let filter = json!({
            "category": category.label(),
            "userId": owner_pointer(&identity),
        });
        let limit = QUERY_LIMIT.to_string();

        let request = self
            .rest
            .request(Method::GET, CLASS_PATH, Some(identity.session_token.as_str()))
            .query(&[
                ("where", filter.to_string().as_str()),
                ("order", "createdAt"),
                ("limit", limit.as_str()),
            ]);
        let response = self.check(self.send(request).await?, None).await?;

        let body: QueryResponse = response.json().await.map_err(|e| {
            PersistenceError::InvalidResponse(format!("failed to parse query response: {e}"))
        })?;

        debug!(category = %category, count = body.results.len(), "Fetched items");
        Ok(body.results.into_iter().map(RemoteRecord::into_item).collect())
    }

    async fn create(
        &self,
        category: Category,
        item: &TodoItem,
        _items: &[TodoItem],
    ) -> Result<TodoItem, PersistenceError> {
        let identity = self.identity()?;
        let mut acl = Map::new();
        acl.insert(identity.id.clone(), json!({ "read": true, "write": true }));

        let body = json!({
            "name": item.name,
            "category": category.label(),
            "done": item.done,
            "totalTime": item.total_time,
            "currentSessionStart": millis(item.current_session_start),
            "userId": owner_pointer(&identity),
            "ACL": acl,
        });

        let request = self
            .rest
            .request(Method::POST, CLASS_PATH, Some(identity.session_token.as_str()))
            .json(&body);
        let response = self.check(self.send(request).await?, None).await?;

        let created: CreateResponse = response.json().await.map_err(|e| {
            PersistenceError::InvalidResponse(format!("failed to parse create response: {e}"))
        })?;

        debug!(category = %category, item_id = %created.object_id, "Created item");
        let mut saved = item.clone();
        saved.id = ItemId::new(created.object_id);
        saved.category = Some(category);
        saved.created_at = created.created_at;
        saved.updated_at = created.created_at;
        Ok(saved)
    }

    async fn update(
        &self,
        _category: Category,
        id: &ItemId,
        patch: &ItemPatch,
        _items: &[TodoItem],
    ) -> Result<(), PersistenceError> {
        let body = patch_body(patch);
        if body.is_empty() {
            return Ok(());
        }
        let identity = self.identity()?;

        let request = self
            .rest
            .request(
                Method::PUT,
                &format!("{CLASS_PATH}/{id}"),
                Some(identity.session_token.as_str()),
            )
            .json(&body);
        self.check(self.send(request).await?, Some(id)).await?;

        debug!(item_id = %id, fields = body.len(), "Updated item");
        Ok(())
    }

    async fn delete(
        &self,
        _category: Category,
        id: &ItemId,
        _items: &[TodoItem],
    ) -> Result<(), PersistenceError> {
        let identity = self.identity()?;

        let request = self.rest.request(
            Method::DELETE,
            &format!("{CLASS_PATH}/{id}"),
            Some(identity.session_token.as_str()),
        );
        match self.check(self.send(request).await?, Some(id)).await {
            Ok(_) => {
                debug!(item_id = %id, "Deleted item");
                Ok(())
            }
            Err(PersistenceError::NotFound(_)) => {
                debug!(item_id = %id, "Item already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
