use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::conversation::{Message, Role};
use crate::settings::Settings;

/// Every way a completion call can fail. Callers treat these as one opaque
/// channel and show the display string to the user.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request to the completion API failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("authentication rejected ({status}): {message}")]
    Auth { status: StatusCode, message: String },
    #[error("rate limited by the completion API: {message}")]
    RateLimited { message: String },
    #[error("completion API returned {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("malformed completion response: {0}")]
    Malformed(String),
    #[error("completion response contained no text")]
    Empty,
}

impl CompletionError {
    /// Text shown to the user when a call fails.
    pub fn notice(&self) -> String {
        format!("Error: {self}")
    }

    fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| body.trim().to_string());
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth { status, message },
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { message },
            _ => Self::Api { status, message },
        }
    }
}

// Structures matching the chat completions endpoint
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Blocking-per-turn wrapper around the remote completion endpoint.
///
/// Only built once a credential is known, so a request without one is unrepresentable.
#[derive(Clone)]
pub struct CompletionGateway {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for CompletionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionGateway")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl CompletionGateway {
    pub fn new(api_key: impl Into<String>, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends the whole history and returns the first choice's text.
    #[instrument(skip_all, fields(model = %settings.model, temperature = %settings.temperature, messages = history.len()))]
    pub async fn complete(
        &self,
        history: &[Message],
        settings: &Settings,
    ) -> Result<String, CompletionError> {
        let request_payload = ChatCompletionRequest {
            model: settings.model.id(),
            messages: history
                .iter()
                .map(|m| WireMessage {
                    role: m.role(),
                    content: m.content(),
                })
                .collect(),
            temperature: settings.temperature.value(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(%status, error_body = %body, "Completion API request failed");
            return Err(CompletionError::from_status(status, &body));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(CompletionError::Empty)?;

        debug!(chars = text.len(), "Received completion");
        Ok(text)
    }
}
