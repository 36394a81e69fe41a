//! Completion backend abstraction.
//!
//! [`CompletionClient`] is the seam the session handler depends on: one
//! `complete` call per inbound message, one attempt, text or error. Tests
//! plug in their own implementations; production code uses [`LlmProvider`],
//! an enum over the concrete backends in [`providers`].
//!
//! Provider instances are shared immutable capabilities, clone them freely.

pub mod providers;

use std::future::Future;

use thiserror::Error;

// ── Request ───────────────────────────────────────────────────────────────────

/// One stateless completion: a system instruction plus a single user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

// ── Error ─────────────────────────────────────────────────────────────────────

/// Any failure talking to the text-generation backend.
#[derive(Debug, Error)]
pub enum CompletionBackendError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("no API key configured for the completion backend")]
    MissingApiKey,
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion backend returned {0}")]
    Status(String),
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}

// ── Client trait ──────────────────────────────────────────────────────────────

/// A text-generation backend.
///
/// Uses a native `async fn`-in-trait shape (`impl Future + Send`) so callers
/// stay generic without boxing.
pub trait CompletionClient: Send + Sync + 'static {
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<String, CompletionBackendError>> + Send;
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Adding a backend = new module + new variant + new `complete` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
}

impl LlmProvider {
    /// Short provider name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::OpenAiCompatible(_) => "openai",
        }
    }
}

impl CompletionClient for LlmProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionBackendError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(request).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(request).await,
        }
    }
}
