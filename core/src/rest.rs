//! Pieces shared by the object-store and identity-provider HTTP clients.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;

use crate::config::RemoteConfig;

pub(crate) const APP_ID_HEADER: &str = "X-Parse-Application-Id";
pub(crate) const REST_KEY_HEADER: &str = "X-Parse-REST-API-Key";
pub(crate) const SESSION_TOKEN_HEADER: &str = "X-Parse-Session-Token";

/// Server error code: object not found, or invalid username/password on login.
pub(crate) const CODE_OBJECT_NOT_FOUND: i64 = 101;
/// Server error code: username already taken.
pub(crate) const CODE_USERNAME_TAKEN: i64 = 202;
/// Server error code: session token expired or revoked.
pub(crate) const CODE_INVALID_SESSION: i64 = 209;

/// Connection details common to every request.
#[derive(Debug, Clone)]
pub(crate) struct RestClient {
    http: Client,
    base_url: String,
    app_id: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RestClient {
    pub(crate) fn new(config: &RemoteConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            api_key: config.api_key.clone(),
            timeout: config.request_timeout,
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds a request to `<base_url>/<path>` carrying the application headers
    /// and, if given, the session token.
    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
        session_token: Option<&str>,
    ) -> RequestBuilder {
        let mut request = self
            .http
            .request(method, format!("{}/{}", self.base_url, path))
            .header(APP_ID_HEADER, &self.app_id);
        if let Some(key) = &self.api_key {
            request = request.header(REST_KEY_HEADER, key);
        }
        if let Some(token) = session_token {
            request = request.header(SESSION_TOKEN_HEADER, token);
        }
        request
    }

    /// Human readable reason for a request that never produced a response.
    pub(crate) fn describe_send_error(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!("request timed out after {:?}", self.timeout)
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            format!("request failed: {err}")
        }
    }
}

/// Error body returned by the server: `{"code": 101, "error": "..."}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ServerFault {
    #[serde(default)]
    pub(crate) code: Option<i64>,
    #[serde(default)]
    pub(crate) error: String,
}

impl ServerFault {
    /// Reads the error body, falling back to the raw text if it is not JSON.
    pub(crate) async fn read(response: Response) -> Self {
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str(&body).unwrap_or(Self {
            code: None,
            error: body,
        })
    }
}
