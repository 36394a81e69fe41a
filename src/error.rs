//! Application-wide error types.
//!
//! Only startup failures surface as [`AppError`]. Per-message failures have
//! their own enums next to the code that produces them and are recovered
//! where they happen.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("transport error: {0}")]
    Transport(String),
}
