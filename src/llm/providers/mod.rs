//! Completion provider implementations.
//!
//! `build(config, api_key)` is the factory, called once at startup.

pub mod dummy;
pub mod openai_compatible;

use crate::config::LlmConfig;
use crate::llm::{CompletionBackendError, LlmProvider};

/// Construct an `LlmProvider` from config and an optional API key.
///
/// `api_key` comes from `ASI_API_KEY` / `LLM_API_KEY`, never TOML.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, CompletionBackendError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider)),
        "openai" | "openai-compatible" | "asi1" => {
            let p = openai_compatible::OpenAiCompatibleProvider::new(&config.openai, api_key)?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        _ => Err(CompletionBackendError::UnknownProvider(config.provider.clone())),
    }
}
