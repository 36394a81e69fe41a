//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! All OpenAI wire types are private to this module. The provider is
//! stateless: one system message, one user message, one round-trip.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::config::OpenAiConfig;
use crate::llm::{CompletionBackendError, CompletionRequest};

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Covers the ASI:One API, OpenAI itself, and local servers (Ollama, LM
/// Studio…). Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: Option<f32>,
    api_key: Option<String>,
    require_api_key: bool,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from config values and an optional API key.
    ///
    /// When present the key is sent as `Authorization: Bearer <key>`.
    pub fn new(config: &OpenAiConfig, api_key: Option<String>) -> Result<Self, CompletionBackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CompletionBackendError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            require_api_key: config.require_api_key,
        })
    }

    /// Send one completion request and return the first choice's text as-is.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionBackendError> {
        if self.require_api_key && self.api_key.is_none() {
            return Err(CompletionBackendError::MissingApiKey);
        }

        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                Message { role: "system", content: &request.system },
                Message { role: "user", content: &request.user },
            ],
            max_tokens: request.max_tokens,
            temperature: self.temperature,
        };

        debug!(
            model = %payload.model,
            max_tokens = payload.max_tokens,
            content_len = request.user.len(),
            "sending completion request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full completion request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, timeout = e.is_timeout(), "completion HTTP request failed");
            CompletionBackendError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            let message = describe_error(status, &body);
            error!(%status, %message, "completion backend returned HTTP error");
            return Err(CompletionBackendError::Status(message));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CompletionBackendError::Transport(format!("failed to read response body: {e}")))?;
        trace!(response = %body, "full completion response payload");

        extract_text(&body)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Pull the first choice's content out of a response body.
fn extract_text(body: &str) -> Result<String, CompletionBackendError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        error!(error = %e, "failed to deserialize completion response");
        CompletionBackendError::MalformedResponse(format!("failed to parse response body: {e}"))
    })?;

    debug!(choices = parsed.choices.len(), "received completion response");

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CompletionBackendError::MalformedResponse("missing content in first choice".into()))
}

/// Render a non-2xx response as one line, using the error envelope if present.
fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => {
            let code = env
                .error
                .code
                .map(|v| match v {
                    serde_json::Value::String(s) => format!(" [code={s}]"),
                    other => format!(" [code={other}]"),
                })
                .unwrap_or_default();
            format!("HTTP {status}{code}: {}", env.error.message)
        }
        Err(_) => format!("HTTP {status}: {body}"),
    }
}
