//! Chat protocol message handlers, one per inbound model.
//!
//! - **chat**: [`SessionHandler`]: acknowledge, ask the completion backend,
//!   reply with the answer and an end-session marker.
//! - **ack**: [`AckHandler`]: acknowledgements of our own replies; logged only.

pub mod ack;
pub mod chat;

pub use ack::AckHandler;
pub use chat::{FALLBACK_ANSWER, SYSTEM_PROMPT, SessionHandler};
