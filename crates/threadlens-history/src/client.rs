//! HTTP client for the backend history endpoints.
//!
//! Two calls: the authoritative listing (`GET /api/v1/auth/history`) and
//! per-session hydration (`GET /api/v1/auth/history/{id}`). Both are
//! authorized via a bearer credential in a header; the credential itself is
//! opaque to this crate.

use serde::{Deserialize, Serialize};
use threadlens_core::errors::HistoryError;
use threadlens_core::session::{Message, QueryParams};

/// One row of the history listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryListing {
    /// Server-assigned session id.
    pub session_uuid: String,
    /// Listing title.
    pub title: String,
    /// Creation timestamp, as the backend formats it.
    pub created_at: String,
}

/// Full session payload returned by hydration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    /// Server-assigned session id.
    pub session_uuid: String,
    /// Listing title.
    pub title: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Originating query parameters, when the backend recorded them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<QueryParams>,
    /// Persisted transcript.
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Client for the history endpoints.
#[derive(Clone, Debug)]
pub struct HistoryClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl HistoryClient {
    /// Create a client for the given API base URL and optional bearer token.
    #[must_use]
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let mut req = self.http.get(url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Fetch the authoritative session listing.
    pub async fn list(&self) -> Result<Vec<HistoryListing>, HistoryError> {
        let url = format!("{}/api/v1/auth/history", self.api_url);
        let response = self
            .request(url)
            .send()
            .await
            .map_err(|e| HistoryError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status(status.as_u16()));
        }
        response
            .json()
            .await
            .map_err(|e| HistoryError::Decode(e.to_string()))
    }

    /// Hydrate one session: params plus persisted transcript.
    pub async fn fetch_session(&self, id: &str) -> Result<SessionDetail, HistoryError> {
        let url = format!("{}/api/v1/auth/history/{id}", self.api_url);
        let response = self
            .request(url)
            .send()
            .await
            .map_err(|e| HistoryError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status(status.as_u16()));
        }
        response
            .json()
            .await
            .map_err(|e| HistoryError::Decode(e.to_string()))
    }
}
