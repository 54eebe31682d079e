//! HTTP Copilot Service
//!
//! Copilot backend over the dashboard's JSON API.
//!
//! # Endpoints
//!
//! - `POST /copilot/sessions` - open a conversation (greeting)
//! - `POST /copilot/questions` - ask without a conversation
//! - `POST /copilot/sessions/{id}/questions` - ask within a conversation
//! - `POST /copilot/sessions/{id}/picks` - pick an offered option
//! - `GET /copilot/sessions/{id}` - poll a conversation that is still working
//!
//! Every endpoint answers with a [`Reply`] document.

use std::time::Duration;

use async_trait::async_trait;

use super::traits::{CopilotService, RemoteError, Reply};
use crate::messages::SessionId;

/// HTTP copilot client
#[derive(Clone)]
pub struct HttpCopilotService {
    /// Base URL without trailing slash
    base_url: String,
    /// Parsed base URL that endpoint paths are appended to
    base: reqwest::Url,
    /// Bearer token sent with every request
    token: Option<String>,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpCopilotService {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let base = reqwest::Url::parse(&base_url)
            .map_err(|e| RemoteError::Connection(format!("invalid base URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::Connection(format!(
                "base URL {base_url} cannot carry a path"
            )));
        }
        Ok(Self {
            base_url,
            base,
            token: None,
            http_client,
        })
    }

    /// Authenticate requests with a bearer token
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Append path segments to the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RemoteError::Connection(format!("base URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn sessions_url(&self) -> Result<reqwest::Url, RemoteError> {
        self.endpoint(&["copilot", "sessions"])
    }

    fn session_url(&self, session: &SessionId) -> Result<reqwest::Url, RemoteError> {
        self.endpoint(&["copilot", "sessions", session.as_str()])
    }

    fn questions_url(&self, session: Option<&SessionId>) -> Result<reqwest::Url, RemoteError> {
        match session {
            Some(session) => self.endpoint(&["copilot", "sessions", session.as_str(), "questions"]),
            None => self.endpoint(&["copilot", "questions"]),
        }
    }

    fn picks_url(&self, session: &SessionId) -> Result<reqwest::Url, RemoteError> {
        self.endpoint(&["copilot", "sessions", session.as_str(), "picks"])
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Reply, RemoteError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| RemoteError::Connection(e.to_string()))?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message: if body.is_empty() {
                    status.canonical_reason().unwrap_or_default().to_string()
                } else {
                    body
                },
            });
        }

        response
            .json::<Reply>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl CopilotService for HttpCopilotService {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    async fn start_session(&self) -> Result<Reply, RemoteError> {
        let url = self.sessions_url()?;
        tracing::debug!(%url, "Starting copilot session");
        self.execute(self.http_client.post(url)).await
    }

    async fn ask(
        &self,
        session: Option<&SessionId>,
        question: &str,
    ) -> Result<Reply, RemoteError> {
        let body = serde_json::json!({ "question": question });
        self.execute(self.http_client.post(self.questions_url(session)?).json(&body))
            .await
    }

    async fn pick(&self, session: &SessionId, token: &str) -> Result<Reply, RemoteError> {
        let body = serde_json::json!({ "token": token });
        self.execute(self.http_client.post(self.picks_url(session)?).json(&body))
            .await
    }

    async fn poll(&self, session: &SessionId) -> Result<Reply, RemoteError> {
        self.execute(self.http_client.get(self.session_url(session)?))
            .await
    }
}
