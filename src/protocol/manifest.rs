//! Capability manifest for the chat protocol, published at registration and
//! served at `GET /manifest`.

use serde::Serialize;

use super::{CHAT_ACK_DIGEST, CHAT_MESSAGE_DIGEST, PROTOCOL_DIGEST, PROTOCOL_NAME, PROTOCOL_VERSION};

#[derive(Debug, Clone, Serialize)]
pub struct ProtocolManifest {
    pub version: &'static str,
    pub metadata: ManifestMetadata,
    pub models: Vec<ModelEntry>,
    pub interactions: Vec<Interaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestMetadata {
    pub name: &'static str,
    pub version: &'static str,
    pub digest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub digest: String,
    pub name: &'static str,
}

/// A request model and the models this agent may answer it with.
#[derive(Debug, Clone, Serialize)]
pub struct Interaction {
    pub request: String,
    pub responses: Vec<String>,
}

/// The chat protocol as this agent speaks it.
pub fn chat_manifest() -> ProtocolManifest {
    let message = CHAT_MESSAGE_DIGEST.clone();
    let ack = CHAT_ACK_DIGEST.clone();
    ProtocolManifest {
        version: "1.0",
        metadata: ManifestMetadata {
            name: PROTOCOL_NAME,
            version: PROTOCOL_VERSION,
            digest: PROTOCOL_DIGEST.clone(),
        },
        models: vec![
            ModelEntry { digest: message.clone(), name: "ChatMessage" },
            ModelEntry { digest: ack.clone(), name: "ChatAcknowledgement" },
        ],
        interactions: vec![
            Interaction { request: message.clone(), responses: vec![ack.clone(), message] },
            Interaction { request: ack, responses: vec![] },
        ],
    }
}
