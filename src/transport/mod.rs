//! Fabric transport: the inbound envelope server and the outbound [`Outbox`].

pub mod outbox;
pub mod server;

use thiserror::Error;

pub use outbox::{HttpOutbox, Outbox};
pub use server::EnvelopeServer;

/// Failure delivering an outbound envelope.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no route to {0}: not a known peer and no relay configured")]
    NoRoute(String),
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] crate::protocol::CodecError),
    #[error("delivery request failed: {0}")]
    Request(String),
    #[error("peer endpoint returned {0}")]
    Status(String),
}
