//! Signed transport envelope.
//!
//! Every message crosses the fabric wrapped in an [`Envelope`]: routing
//! metadata, the model's schema digest, and the model JSON base64-encoded in
//! `payload`. The sender signs `SHA256` over the routing fields and payload.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{ChatProtocolMessage, CodecError, PROTOCOL_DIGEST};
use crate::identity::{self, Identity};

/// The only envelope version this agent speaks.
pub const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub sender: String,
    #[serde(default)]
    pub target: String,
    pub session: Uuid,
    pub schema_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Unix seconds after which the envelope must be dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Envelope {
    /// Wrap `message` for `target`, signed by `identity`.
    pub fn seal(
        identity: &Identity,
        target: &str,
        session: Uuid,
        message: &ChatProtocolMessage,
    ) -> Result<Self, CodecError> {
        let payload = BASE64.encode(message.to_json()?);
        let mut envelope = Self {
            version: ENVELOPE_VERSION,
            sender: identity.address.clone(),
            target: target.to_string(),
            session,
            schema_digest: message.schema_digest().to_string(),
            protocol_digest: Some(PROTOCOL_DIGEST.clone()),
            payload: Some(payload),
            expires: None,
            nonce: Some(OsRng.next_u64()),
            signature: None,
        };
        envelope.signature = Some(identity.sign_hex(&envelope.digest()));
        Ok(envelope)
    }

    /// Digest covered by the signature.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.sender.as_bytes());
        hasher.update(self.target.as_bytes());
        hasher.update(self.session.as_bytes());
        hasher.update(self.schema_digest.as_bytes());
        if let Some(payload) = &self.payload {
            hasher.update(payload.as_bytes());
        }
        if let Some(expires) = self.expires {
            hasher.update(expires.to_be_bytes());
        }
        if let Some(nonce) = self.nonce {
            hasher.update(nonce.to_be_bytes());
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    /// `true` when the signature matches the sender's address.
    pub fn verify(&self) -> bool {
        match &self.signature {
            Some(sig) => identity::verify_hex(&self.sender, &self.digest(), sig),
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|at| at < Utc::now().timestamp())
    }

    /// Check version and decode the base64 payload into model JSON.
    pub fn decode_payload(&self) -> Result<String, CodecError> {
        if self.version != ENVELOPE_VERSION {
            return Err(CodecError::UnsupportedVersion(self.version));
        }
        let encoded = self.payload.as_deref().ok_or(CodecError::MissingPayload)?;
        let bytes = BASE64.decode(encoded)?;
        Ok(String::from_utf8(bytes)?)
    }
}
