//! Completion service seam and the OpenAI-compatible HTTP client.
//!
//! The classifier only needs "send these chat messages, give me the text
//! back". [`CompletionService`] is that seam; [`OpenAiCompatClient`] talks to
//! any `/chat/completions` endpoint (Groq by default).

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use riskclause_shared::{AppConfig, Result, RiskClauseError, api_key};

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("riskclause/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in [`ServiceError::Http`].
const MAX_ERROR_BODY: usize = 500;

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// Chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Body of a chat-completions request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// ServiceError / CompletionService
// ---------------------------------------------------------------------------

/// Failure reported by a completion service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The service asked us to slow down; the request may be retried.
    #[error("rate limited")]
    RateLimited,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<ServiceError> for RiskClauseError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::RateLimited => RiskClauseError::RateLimited { attempts: 1 },
            ServiceError::Transport(msg) => RiskClauseError::Network(msg),
            other => RiskClauseError::Service(other.to_string()),
        }
    }
}

/// An external chat-completion service.
///
/// Implementations are explicitly constructed and handed to the
/// [`Classifier`](crate::Classifier); they live as long as the classifier.
pub trait CompletionService: Send + Sync {
    /// Send one request and return the assistant's raw text.
    fn complete(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = std::result::Result<String, ServiceError>> + Send;
}

// ---------------------------------------------------------------------------
// OpenAiCompatClient
// ---------------------------------------------------------------------------

/// HTTP client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiCompatClient {
    /// Create a client for `base_url` (e.g. `https://api.groq.com/openai/v1`).
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = url::Url::parse(base_url).map_err(|e| {
            RiskClauseError::config(format!("invalid completion base URL '{base_url}': {e}"))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RiskClauseError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base.as_str().trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    /// Build a client from the `[provider]` config section and its API key env var.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let key = api_key(config)?;
        Self::new(
            &config.provider.base_url,
            key,
            Duration::from_secs(config.provider.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CompletionService for OpenAiCompatClient {
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ServiceError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("undecodable body: {e}")))?;

        let content = envelope
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::InvalidResponse("no message content".into()))?;

        debug!(chars = content.len(), model = %request.model, "completion received");
        Ok(content)
    }
}
