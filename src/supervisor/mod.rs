//! Supervisor: owns the inbound bus and routes envelopes to message handlers.

pub mod bus;
pub mod dispatch;

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::AppError;
use crate::protocol::{Envelope, PROTOCOL_DIGEST};
use crate::runtime::{Component, ComponentFuture};
use bus::SupervisorBus;
use dispatch::{MessageContext, MessageHandler};

/// What happened to one routed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the named handler.
    Dispatched(String),
    /// No handler registered for the envelope's schema digest.
    UnknownSchema,
    /// Payload could not be decoded from the envelope.
    Undecodable,
}

/// Explicit schema-digest → handler table.
pub struct DispatchTable {
    handlers: HashMap<String, Box<dyn MessageHandler>>,
}

impl DispatchTable {
    /// Build the table.
    ///
    /// # Panics
    ///
    /// Panics if two handlers share a schema digest, a programming error that
    /// must surface before the process starts serving.
    pub fn new(handlers: Vec<Box<dyn MessageHandler>>) -> Self {
        let mut table: HashMap<String, Box<dyn MessageHandler>> = HashMap::new();
        for h in handlers {
            let digest = h.schema_digest().to_string();
            debug!(handler = %h.name(), %digest, "registering message handler");
            if let Some(prev) = table.insert(digest.clone(), h) {
                panic!("duplicate handler for schema digest {digest:?} (previous: {})", prev.name());
            }
        }
        Self { handlers: table }
    }

    /// Handler names, sorted.
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.values().map(|h| h.name().to_string()).collect();
        names.sort();
        names
    }

    /// Route one envelope. Never blocks: handlers spawn their own work.
    pub fn route(&self, envelope: Envelope) -> RouteOutcome {
        let Some(handler) = self.handlers.get(&envelope.schema_digest) else {
            warn!(
                sender = %envelope.sender,
                schema_digest = %envelope.schema_digest,
                "no handler for schema digest, dropping envelope"
            );
            return RouteOutcome::UnknownSchema;
        };

        if let Some(proto) = &envelope.protocol_digest {
            if proto != PROTOCOL_DIGEST.as_str() {
                debug!(protocol_digest = %proto, "protocol digest mismatch, routing by schema digest");
            }
        }

        let payload = match envelope.decode_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(sender = %envelope.sender, error = %e, "undecodable envelope payload");
                return RouteOutcome::Undecodable;
            }
        };

        debug!(handler = %handler.name(), sender = %envelope.sender, session = %envelope.session, "routing envelope");
        trace!(%payload, "envelope payload");

        let ctx = MessageContext { sender: envelope.sender, session: envelope.session };
        handler.handle(ctx, payload);
        RouteOutcome::Dispatched(handler.name().to_string())
    }
}

/// Run the routing loop until `shutdown` is cancelled or the bus closes.
pub async fn run(bus: SupervisorBus, table: DispatchTable, shutdown: CancellationToken) {
    info!(handlers = ?table.handler_names(), "supervisor ready");

    // Drop our own sender so the loop ends once every transport is gone.
    let SupervisorBus { mut rx, handle } = bus;
    drop(handle);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("supervisor shutting down");
                break;
            }

            msg = rx.recv() => {
                match msg {
                    Some(envelope) => {
                        table.route(envelope);
                    }
                    None => {
                        info!("bus closed, supervisor exiting");
                        break;
                    }
                }
            }
        }
    }
}

/// The routing loop as a runtime [`Component`].
pub struct Supervisor {
    bus: SupervisorBus,
    table: DispatchTable,
}

impl Supervisor {
    pub fn new(bus: SupervisorBus, table: DispatchTable) -> Self {
        Self { bus, table }
    }
}

impl Component for Supervisor {
    fn id(&self) -> &str {
        "supervisor"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            run(self.bus, self.table, shutdown).await;
            Ok::<(), AppError>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use uuid::Uuid;

    use crate::identity::Identity;
    use crate::protocol::{ChatMessage, ChatProtocolMessage, ContentPart};

    /// Records every call instead of doing work.
    struct Recorder {
        digest: String,
        seen: Arc<Mutex<Vec<(MessageContext, String)>>>,
    }

    impl MessageHandler for Recorder {
        fn schema_digest(&self) -> &str {
            &self.digest
        }
        fn name(&self) -> &str {
            "recorder"
        }
        fn handle(&self, ctx: MessageContext, payload: String) {
            self.seen.lock().unwrap().push((ctx, payload));
        }
    }

    fn chat_envelope() -> Envelope {
        let id = Identity::from_seed("peer");
        let msg = ChatProtocolMessage::Message(ChatMessage::new(vec![ContentPart::text("Hello")]));
        Envelope::seal(&id, "agent1qme", Uuid::new_v4(), &msg).unwrap()
    }

    fn recorder_for(digest: &str) -> (Box<dyn MessageHandler>, Arc<Mutex<Vec<(MessageContext, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Box::new(Recorder { digest: digest.to_string(), seen: seen.clone() }), seen)
    }

    #[test]
    fn routes_by_schema_digest() {
        let env = chat_envelope();
        let (handler, seen) = recorder_for(&env.schema_digest);
        let table = DispatchTable::new(vec![handler]);
        let sender = env.sender.clone();
        let session = env.session;

        assert_eq!(table.route(env), RouteOutcome::Dispatched("recorder".into()));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, MessageContext { sender, session });
        let msg: ChatMessage = serde_json::from_str(&seen[0].1).unwrap();
        assert_eq!(msg.text(), "Hello");
    }

    #[test]
    fn unknown_digest_is_dropped() {
        let (handler, seen) = recorder_for("model:other");
        let table = DispatchTable::new(vec![handler]);
        assert_eq!(table.route(chat_envelope()), RouteOutcome::UnknownSchema);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn undecodable_payload_is_dropped() {
        let mut env = chat_envelope();
        env.payload = Some("***".into());
        let (handler, seen) = recorder_for(&env.schema_digest);
        let table = DispatchTable::new(vec![handler]);
        assert_eq!(table.route(env), RouteOutcome::Undecodable);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    #[should_panic(expected = "duplicate handler")]
    fn duplicate_digest_panics() {
        let (a, _) = recorder_for("model:x");
        let (b, _) = recorder_for("model:x");
        DispatchTable::new(vec![a, b]);
    }

    #[tokio::test]
    async fn run_routes_until_bus_closes() {
        let env = chat_envelope();
        let (handler, seen) = recorder_for(&env.schema_digest);
        let table = DispatchTable::new(vec![handler]);
        let bus = SupervisorBus::new(4);
        let handle = bus.handle.clone();

        let task = tokio::spawn(run(bus, table, CancellationToken::new()));
        handle.submit(env.clone()).await.unwrap();
        handle.submit(env).await.unwrap();
        drop(handle);

        task.await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (handler, _) = recorder_for("model:x");
        let bus = SupervisorBus::new(4);
        let _keep_open = bus.handle.clone();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(bus, DispatchTable::new(vec![handler]), shutdown.clone()));
        shutdown.cancel();
        task.await.unwrap();
    }
}
