//! Session handler: the chat protocol state machine for inbound `ChatMessage`s.
//!
//! Per message, in order:
//!   1. acknowledge the message id to the sender, before anything can fail
//!   2. concatenate the text parts into the user utterance
//!   3. one completion call (even when the utterance is empty)
//!   4. on failure, answer with [`FALLBACK_ANSWER`] and log the error
//!   5. reply `[text(answer), end-session]` to the sender
//!
//! Every reply closes the session from this agent's side. Nothing is kept
//! between messages; concurrent invocations share only immutable state.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::llm::{CompletionClient, CompletionRequest};
use crate::protocol::{
    CHAT_MESSAGE_DIGEST, ChatAcknowledgement, ChatMessage, ChatProtocolMessage, ContentPart,
};
use crate::supervisor::dispatch::{MessageContext, MessageHandler};
use crate::transport::Outbox;

/// System instruction sent with every completion.
pub const SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Answer user queries clearly and politely.";

/// Answer used whenever the completion backend fails.
pub const FALLBACK_ANSWER: &str = "Sorry, I wasn't able to process that.";

struct Inner<C, O> {
    client: C,
    outbox: O,
    max_tokens: u32,
}

/// Handles inbound chat messages. Clones share the same client and outbox.
pub struct SessionHandler<C, O> {
    inner: Arc<Inner<C, O>>,
}

impl<C, O> Clone for SessionHandler<C, O> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: CompletionClient, O: Outbox> SessionHandler<C, O> {
    pub fn new(client: C, outbox: O, max_tokens: u32) -> Self {
        Self { inner: Arc::new(Inner { client, outbox, max_tokens }) }
    }

    /// Process one inbound message to completion and return the reply sent.
    ///
    /// Never fails: backend errors become the fallback answer, delivery
    /// errors are logged and left to the transport.
    pub async fn handle_message(&self, ctx: &MessageContext, msg: ChatMessage) -> ChatMessage {
        let inner = &self.inner;
        let sender = ctx.sender.as_str();

        let ack = ChatAcknowledgement::for_message(msg.msg_id);
        if let Err(e) = inner
            .outbox
            .send(sender, ctx.session, ChatProtocolMessage::Acknowledgement(ack))
            .await
        {
            warn!(%sender, msg_id = %msg.msg_id, error = %e, "failed to send acknowledgement");
        }

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: msg.text(),
            max_tokens: inner.max_tokens,
        };
        debug!(
            %sender,
            msg_id = %msg.msg_id,
            text_len = request.user.len(),
            peer_ended_session = msg.ends_session(),
            "querying model"
        );

        let answer = match inner.client.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                error!(%sender, msg_id = %msg.msg_id, error = %e, "error querying model");
                FALLBACK_ANSWER.to_string()
            }
        };

        let reply = ChatMessage::new(vec![ContentPart::text(answer), ContentPart::EndSession]);
        if let Err(e) = inner
            .outbox
            .send(sender, ctx.session, ChatProtocolMessage::Message(reply.clone()))
            .await
        {
            warn!(%sender, reply_id = %reply.msg_id, error = %e, "failed to send reply");
        } else {
            info!(%sender, msg_id = %msg.msg_id, reply_id = %reply.msg_id, "replied and ended session");
        }

        reply
    }
}

impl<C: CompletionClient, O: Outbox> MessageHandler for SessionHandler<C, O> {
    fn schema_digest(&self) -> &str {
        CHAT_MESSAGE_DIGEST.as_str()
    }

    fn name(&self) -> &str {
        "chat"
    }

    fn handle(&self, ctx: MessageContext, payload: String) {
        let msg: ChatMessage = match serde_json::from_str(&payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(sender = %ctx.sender, error = %e, "undecodable chat message, dropping");
                return;
            }
        };

        // One task per message so a slow backend never holds up the others.
        let this = self.clone();
        tokio::spawn(async move {
            this.handle_message(&ctx, msg).await;
        });
    }
}
