//! ASI1 chat agent: answers chat protocol messages with an LLM completion.
//!
//! The binary in `main.rs` wires these modules together; integration tests
//! drive the same dispatch path with test doubles.

pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod llm;
pub mod logger;
pub mod protocol;
pub mod registration;
pub mod runtime;
pub mod supervisor;
pub mod transport;
