//! Supervisor dispatch: the trait every protocol message handler implements.
//!
//! Handlers register under the schema digest of the model they accept. The
//! supervisor decodes nothing itself; it hands the raw payload JSON plus the
//! envelope metadata to the matching handler.

use uuid::Uuid;

/// Transport metadata of one inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    /// Opaque address of the peer; only ever used as the reply destination.
    pub sender: String,
    /// Session the envelope travelled in. Replies reuse it.
    pub session: Uuid,
}

/// A handler for one message model.
///
/// Implementations must be `Send + Sync` so the dispatch table can be shared
/// with the supervisor task.
pub trait MessageHandler: Send + Sync {
    /// Schema digest of the model this handler accepts. Unique per table.
    fn schema_digest(&self) -> &str;

    /// Short name for logs.
    fn name(&self) -> &str;

    /// Handle one inbound payload (model JSON).
    ///
    /// Implementations **must not block** the supervisor loop: anything that
    /// awaits I/O moves into a `tokio::spawn` task.
    fn handle(&self, ctx: MessageContext, payload: String);
}
