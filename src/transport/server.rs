//! Axum envelope server: the agent's inbound side of the fabric.
//!
//! ```text
//! POST /submit    signed Envelope → supervisor bus, 200 `{}` once queued
//! GET  /health    liveness + advertised address
//! GET  /manifest  chat protocol capability manifest
//! ```
//!
//! `/submit` answers as soon as the envelope is queued; handling happens on
//! the supervisor side. Signatures are not checked.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::protocol::manifest::chat_manifest;
use crate::protocol::{Envelope, envelope::ENVELOPE_VERSION};
use crate::runtime::{Component, ComponentFuture};
use crate::supervisor::bus::BusHandle;

/// Router state, cheap to clone.
#[derive(Clone)]
pub(crate) struct ServerState {
    pub agent_name: Arc<str>,
    pub address: Arc<str>,
    pub bus: BusHandle,
}

pub struct EnvelopeServer {
    bind_addr: String,
    state: ServerState,
}

impl EnvelopeServer {
    pub fn new(bind_addr: impl Into<String>, agent_name: &str, address: &str, bus: BusHandle) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            state: ServerState {
                agent_name: Arc::from(agent_name),
                address: Arc::from(address),
                bus,
            },
        }
    }
}

impl Component for EnvelopeServer {
    fn id(&self) -> &str {
        "envelope-server"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(serve(self.bind_addr, self.state, shutdown))
    }
}

async fn serve(bind_addr: String, state: ServerState, shutdown: CancellationToken) -> Result<(), AppError> {
    let router = build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Transport(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, "envelope server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Transport(format!("envelope server error: {e}")))?;

    info!("envelope server shut down");
    Ok(())
}

pub(crate) fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .route("/health", get(health))
        .route("/manifest", get(manifest))
        .with_state(state)
}

fn reject(status: StatusCode, code: &str, msg: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": code, "message": format!("{msg}") }))).into_response()
}

/// POST /submit
async fn submit(State(state): State<ServerState>, body: axum::body::Bytes) -> Response {
    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(env) => env,
        Err(e) => {
            debug!(error = %e, "rejecting malformed envelope");
            return reject(StatusCode::BAD_REQUEST, "malformed_envelope", e);
        }
    };

    if envelope.version != ENVELOPE_VERSION {
        return reject(
            StatusCode::BAD_REQUEST,
            "unsupported_version",
            format!("envelope version {} not supported", envelope.version),
        );
    }
    if !envelope.target.is_empty() && envelope.target != *state.address {
        warn!(target = %envelope.target, sender = %envelope.sender, "envelope addressed to another agent");
        return reject(StatusCode::BAD_REQUEST, "wrong_target", "envelope target does not match this agent");
    }
    if envelope.is_expired() {
        return reject(StatusCode::BAD_REQUEST, "expired", "envelope has expired");
    }
    if let Err(e) = envelope.decode_payload() {
        return reject(StatusCode::BAD_REQUEST, "bad_payload", e);
    }

    debug!(sender = %envelope.sender, schema_digest = %envelope.schema_digest, "envelope accepted");

    match state.bus.submit(envelope).await {
        Ok(()) => (StatusCode::OK, Json(json!({}))).into_response(),
        Err(_) => reject(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "agent is shutting down"),
    }
}

/// GET /health
async fn health(State(state): State<ServerState>) -> Response {
    Json(json!({
        "status": "ok",
        "agent": &*state.agent_name,
        "address": &*state.address,
    }))
    .into_response()
}

/// GET /manifest
async fn manifest() -> Response {
    Json(chat_manifest()).into_response()
}
