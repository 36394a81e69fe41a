//! Inbound envelope bus between the transport and the supervisor.

use tokio::sync::mpsc;

use crate::protocol::Envelope;

/// The bus receiver has been dropped; the supervisor is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusClosed;

/// Cloneable sender given to transports to submit inbound envelopes.
#[derive(Debug, Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<Envelope>,
}

impl BusHandle {
    /// Queue an envelope for routing. Waits for room when the buffer is full.
    pub async fn submit(&self, envelope: Envelope) -> Result<(), BusClosed> {
        self.tx.send(envelope).await.map_err(|_| BusClosed)
    }
}

/// Owns the supervisor-side channel end.
pub struct SupervisorBus {
    /// Supervisor receives inbound envelopes here.
    pub rx: mpsc::Receiver<Envelope>,
    /// Cloned into every transport.
    pub handle: BusHandle,
}

impl SupervisorBus {
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        Self { rx, handle: BusHandle { tx } }
    }
}
