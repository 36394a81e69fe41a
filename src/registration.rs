//! One-shot directory registration at startup.
//!
//! Runs only when both the directory API key and the identity seed are
//! configured. The outcome is logged and returned; it never stops the agent
//! from serving, and there is no retry.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{Config, DirectoryConfig};
use crate::identity::Identity;
use crate::protocol::manifest::{ProtocolManifest, chat_manifest};

/// Readme published with the registration.
pub const AGENT_README: &str = include_str!("../config/agent_readme.md");

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("directory request failed: {0}")]
    Request(String),

    #[error("directory rejected registration: {0}")]
    Rejected(String),
}

/// Body of the registration call.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub address: String,
    pub endpoint: String,
    pub active: bool,
    pub readme: String,
    pub description: String,
    pub protocols: Vec<ProtocolManifest>,
    /// Unix seconds; part of the signed proof.
    pub timestamp: i64,
    /// Hex ed25519 signature over `"{address}:{timestamp}"`, proving
    /// ownership of the seed-derived key.
    pub signature: String,
}

impl RegistrationRequest {
    pub fn build(config: &Config, identity: &Identity) -> Self {
        let timestamp = Utc::now().timestamp();
        let signature = identity.sign_hex(ownership_proof(&identity.address, timestamp).as_bytes());
        Self {
            name: config.agent.name.clone(),
            address: identity.address.clone(),
            endpoint: config.transport.endpoint_url.clone(),
            active: true,
            readme: AGENT_README.to_string(),
            description: config.agent.description.clone(),
            protocols: vec![chat_manifest()],
            timestamp,
            signature,
        }
    }
}

/// Message signed for the ownership proof.
pub fn ownership_proof(address: &str, timestamp: i64) -> String {
    format!("{address}:{timestamp}")
}

/// A directory service the agent can register with.
pub trait Directory: Send + Sync {
    fn register(
        &self,
        api_key: &str,
        request: &RegistrationRequest,
    ) -> impl Future<Output = Result<(), RegistrationError>> + Send;
}

/// Agentverse-style HTTP directory: `POST {api_base_url}/agents`.
#[derive(Debug, Clone)]
pub struct AgentverseDirectory {
    client: Client,
    url: String,
}

impl AgentverseDirectory {
    pub fn new(config: &DirectoryConfig) -> Result<Self, RegistrationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RegistrationError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/agents", config.api_base_url.trim_end_matches('/')),
        })
    }
}

impl Directory for AgentverseDirectory {
    async fn register(&self, api_key: &str, request: &RegistrationRequest) -> Result<(), RegistrationError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| RegistrationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistrationError::Rejected(format!("HTTP {status}: {body}")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    Failed,
    Skipped,
}

/// Register once if credentials allow it.
pub async fn bootstrap<D: Directory>(config: &Config, identity: &Identity, directory: &D) -> RegistrationOutcome {
    let api_key = match (&config.directory_api_key, &config.seed_phrase) {
        (Some(key), Some(_)) => key,
        _ => {
            warn!("ILABS_AGENTVERSE_API_KEY or AGENT_SEED_PHRASE not set, skipping directory registration");
            return RegistrationOutcome::Skipped;
        }
    };

    let request = RegistrationRequest::build(config, identity);
    match directory.register(api_key, &request).await {
        Ok(()) => {
            info!(name = %request.name, address = %request.address, endpoint = %request.endpoint, "registered with directory");
            RegistrationOutcome::Registered
        }
        Err(e) => {
            error!(error = %e, "failed to register with directory");
            RegistrationOutcome::Failed
        }
    }
}
