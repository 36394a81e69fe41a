//! Dummy provider: echoes the user text back prefixed with `[echo]`.
//! Lets the full envelope round-trip run without an API key.

use crate::llm::{CompletionBackendError, CompletionRequest};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionBackendError> {
        Ok(format!("[echo] {}", request.user))
    }
}
