//! Agent identity: ed25519 keypair, fabric address, and `public_id`.
//!
//! With a seed phrase the signing key seed is `SHA256(seed_phrase)`, so the
//! address is stable across restarts. Without one an ephemeral key is
//! generated and the agent runs unregistered.
//!
//! ```text
//! address   = "agent1q" + hex(verifying_key)          (fabric address)
//! public_id = hex(SHA256(verifying_key))[..8]          (log-friendly id)
//! ```

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Prefix shared by every agent address on the fabric.
pub const ADDRESS_PREFIX: &str = "agent1q";

/// Loaded agent identity. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Fabric address peers reply to.
    pub address: String,
    /// First 8 hex chars of `SHA256(verifying_key)`.
    pub public_id: String,
    /// `false` when the key was generated for this run only.
    pub persistent: bool,
    signing_key: SigningKey,
}

impl Identity {
    /// Derive the identity deterministically from `seed_phrase`.
    pub fn from_seed(seed_phrase: &str) -> Self {
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&Sha256::digest(seed_phrase.as_bytes()));
        Self::from_signing_key(SigningKey::from_bytes(&seed), true)
    }

    /// Generate a random identity that lives for this process only.
    pub fn ephemeral() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng), false)
    }

    fn from_signing_key(signing_key: SigningKey, persistent: bool) -> Self {
        let vk = signing_key.verifying_key().to_bytes();
        Self {
            address: compute_address(&vk),
            public_id: compute_public_id(&vk),
            persistent,
            signing_key,
        }
    }

    /// Sign `message`, returning the hex-encoded 64-byte signature.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

/// Load the identity from the configured seed, or fall back to an ephemeral one.
pub fn setup(seed_phrase: Option<&str>) -> Identity {
    match seed_phrase {
        Some(seed) => Identity::from_seed(seed),
        None => {
            warn!("AGENT_SEED_PHRASE not set, using an ephemeral identity for this run");
            Identity::ephemeral()
        }
    }
}

pub fn compute_address(verifying_key_bytes: &[u8; 32]) -> String {
    format!("{ADDRESS_PREFIX}{}", hex::encode(verifying_key_bytes))
}

pub fn compute_public_id(verifying_key_bytes: &[u8; 32]) -> String {
    let digest = Sha256::digest(verifying_key_bytes);
    hex::encode(digest)[..8].to_string()
}

/// Check a hex signature produced by [`Identity::sign_hex`] against an address.
///
/// Returns `false` for anything malformed rather than erroring: callers only
/// ever need a yes/no.
pub fn verify_hex(address: &str, message: &[u8], signature_hex: &str) -> bool {
    let Some(vk_hex) = address.strip_prefix(ADDRESS_PREFIX) else {
        return false;
    };
    let Ok(vk_bytes) = hex::decode(vk_hex) else {
        return false;
    };
    let Ok(vk_bytes): Result<[u8; 32], _> = vk_bytes.try_into() else {
        return false;
    };
    let Ok(vk) = VerifyingKey::from_bytes(&vk_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_bytes): Result<[u8; 64], _> = sig_bytes.try_into() else {
        return false;
    };
    vk.verify(message, &Signature::from_bytes(&sig_bytes)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_address() {
        let a = Identity::from_seed("av-deploy-example");
        let b = Identity::from_seed("av-deploy-example");
        assert_eq!(a.address, b.address);
        assert_eq!(a.public_id, b.public_id);
        assert!(a.persistent);
    }

    #[test]
    fn different_seeds_differ() {
        let a = Identity::from_seed("one");
        let b = Identity::from_seed("two");
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn address_shape() {
        let id = Identity::from_seed("shape");
        assert!(id.address.starts_with(ADDRESS_PREFIX));
        assert_eq!(id.address.len(), ADDRESS_PREFIX.len() + 64);
        assert_eq!(id.public_id.len(), 8);
        assert!(id.public_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ephemeral_identities_are_unique() {
        let a = Identity::ephemeral();
        let b = Identity::ephemeral();
        assert_ne!(a.address, b.address);
        assert!(!a.persistent);
    }

    #[test]
    fn setup_without_seed_is_ephemeral() {
        assert!(!setup(None).persistent);
        assert!(setup(Some("seed")).persistent);
    }

    #[test]
    fn signature_verifies_against_address() {
        let id = Identity::from_seed("signer");
        let sig = id.sign_hex(b"payload");
        assert!(verify_hex(&id.address, b"payload", &sig));
        assert!(!verify_hex(&id.address, b"tampered", &sig));
    }

    #[test]
    fn verify_rejects_garbage() {
        let id = Identity::from_seed("signer");
        let sig = id.sign_hex(b"x");
        assert!(!verify_hex("not-an-address", b"x", &sig));
        assert!(!verify_hex(&id.address, b"x", "zz"));
        assert!(!verify_hex(&format!("{ADDRESS_PREFIX}abcd"), b"x", &sig));
    }
}
