//! Acknowledgement handler: accepts acknowledgements for our outbound
//! messages so they are not treated as unroutable, and does nothing else.

use tracing::{debug, warn};

use crate::protocol::{CHAT_ACK_DIGEST, ChatAcknowledgement};
use crate::supervisor::dispatch::{MessageContext, MessageHandler};

#[derive(Debug, Clone, Default)]
pub struct AckHandler;

impl MessageHandler for AckHandler {
    fn schema_digest(&self) -> &str {
        CHAT_ACK_DIGEST.as_str()
    }

    fn name(&self) -> &str {
        "chat-ack"
    }

    fn handle(&self, ctx: MessageContext, payload: String) {
        match serde_json::from_str::<ChatAcknowledgement>(&payload) {
            Ok(ack) => debug!(
                sender = %ctx.sender,
                acknowledged_msg_id = %ack.acknowledged_msg_id,
                "received acknowledgement"
            ),
            Err(e) => warn!(sender = %ctx.sender, error = %e, "undecodable acknowledgement"),
        }
    }
}
