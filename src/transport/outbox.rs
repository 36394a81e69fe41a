//! Outbound delivery.
//!
//! [`Outbox`] is the seam the message handlers send through. [`HttpOutbox`]
//! seals each message into a signed [`Envelope`] and POSTs it to the peer's
//! submit endpoint: a configured peer URL if there is one, else the mailbox
//! relay. One attempt, no retry.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use uuid::Uuid;

use super::TransportError;
use crate::config::TransportConfig;
use crate::identity::Identity;
use crate::protocol::{ChatProtocolMessage, Envelope};

/// Per-delivery HTTP timeout.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Something that can deliver protocol messages to a peer address.
pub trait Outbox: Send + Sync + 'static {
    fn send(
        &self,
        target: &str,
        session: Uuid,
        message: ChatProtocolMessage,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Envelope delivery over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOutbox {
    client: Client,
    identity: Identity,
    peers: HashMap<String, String>,
    relay_url: Option<String>,
}

impl HttpOutbox {
    pub fn new(config: &TransportConfig, identity: Identity) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            identity,
            peers: config.peers.clone(),
            relay_url: config.relay_url.clone(),
        })
    }

    /// Submit URL for `target`: its peer entry, else the relay.
    pub fn resolve(&self, target: &str) -> Result<&str, TransportError> {
        self.peers
            .get(target)
            .or(self.relay_url.as_ref())
            .map(String::as_str)
            .ok_or_else(|| TransportError::NoRoute(target.to_string()))
    }
}

impl Outbox for HttpOutbox {
    async fn send(&self, target: &str, session: Uuid, message: ChatProtocolMessage) -> Result<(), TransportError> {
        let url = self.resolve(target)?;
        let envelope = Envelope::seal(&self.identity, target, session, &message)?;

        debug!(%target, %url, schema_digest = %envelope.schema_digest, "delivering envelope");

        let response = self
            .client
            .post(url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status(format!("HTTP {status}: {body}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use tokio::net::TcpListener;

    use crate::config::Config;
    use crate::protocol::{ChatAcknowledgement, ChatMessage, ContentPart};

    type Captured = Arc<Mutex<Vec<Envelope>>>;

    async fn capture_server(status: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(
                "/submit",
                post(move |State(c): State<Captured>, Json(env): Json<Envelope>| async move {
                    c.lock().unwrap().push(env);
                    status
                }),
            )
            .with_state(captured.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}/submit"), captured)
    }

    fn outbox(peers: &[(&str, &str)], relay: Option<&str>) -> HttpOutbox {
        let mut cfg = Config::test_default().transport;
        cfg.peers = peers.iter().map(|(a, u)| (a.to_string(), u.to_string())).collect();
        cfg.relay_url = relay.map(str::to_string);
        HttpOutbox::new(&cfg, Identity::from_seed("outbox-test")).unwrap()
    }

    #[test]
    fn resolve_prefers_peer_then_relay() {
        let o = outbox(&[("agent1qpeer", "http://peer/submit")], Some("http://relay/submit"));
        assert_eq!(o.resolve("agent1qpeer").unwrap(), "http://peer/submit");
        assert_eq!(o.resolve("agent1qother").unwrap(), "http://relay/submit");
    }

    #[test]
    fn resolve_without_route_errors() {
        let o = outbox(&[], None);
        assert!(matches!(o.resolve("agent1qnobody"), Err(TransportError::NoRoute(_))));
    }

    #[tokio::test]
    async fn delivers_signed_envelope() {
        let (url, captured) = capture_server(StatusCode::OK).await;
        let o = outbox(&[("agent1qpeer", &url)], None);
        let session = Uuid::new_v4();
        let msg = ChatMessage::new(vec![ContentPart::text("Hi there!"), ContentPart::EndSession]);

        o.send("agent1qpeer", session, ChatProtocolMessage::Message(msg)).await.unwrap();

        let envs = captured.lock().unwrap();
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].target, "agent1qpeer");
        assert_eq!(envs[0].session, session);
        assert!(envs[0].verify());
        let decoded: ChatMessage = serde_json::from_str(&envs[0].decode_payload().unwrap()).unwrap();
        assert_eq!(decoded.text(), "Hi there!");
        assert!(decoded.ends_session());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (url, _) = capture_server(StatusCode::SERVICE_UNAVAILABLE).await;
        let o = outbox(&[], Some(&url));
        let ack = ChatProtocolMessage::Acknowledgement(ChatAcknowledgement::for_message(Uuid::new_v4()));
        let err = o.send("agent1qpeer", Uuid::new_v4(), ack).await.unwrap_err();
        assert!(matches!(err, TransportError::Status(s) if s.contains("503")));
    }
}
