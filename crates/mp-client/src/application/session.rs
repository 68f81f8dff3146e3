//! ReplicationSession: one participant's per-tick replication loop.
//!
//! Each `update()`:
//!
//! 1. ticks the transport client (status events, bounded receive),
//! 2. applies every received command to the shared state with the replay
//!    guard held,
//! 3. returns the client events so the host can react (status display,
//!    giving up after `ReconnectExhausted`).
//!
//! Host actions go the other way through [`ReplicationSession::replicate`].

use std::net::SocketAddr;

use mp_core::{CommandDispatcher, SharedStateHandle};
use tokio::sync::mpsc;
use tracing::debug;

use crate::application::replicate_actions::{ActionReplicator, HostAction};
use crate::infrastructure::network::{ClientError, ClientEvent, TransportClient};

/// Outcome of [`ReplicationSession::replicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicateOutcome {
    Sent,
    /// The action was an echo of a remote command and was not sent.
    Suppressed,
}

pub struct ReplicationSession {
    client: TransportClient,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    dispatcher: CommandDispatcher,
    replicator: ActionReplicator,
}

impl ReplicationSession {
    pub fn new(
        client: TransportClient,
        events: mpsc::UnboundedReceiver<ClientEvent>,
        dispatcher: CommandDispatcher,
        replicator: ActionReplicator,
    ) -> Self {
        Self {
            client,
            events,
            dispatcher,
            replicator,
        }
    }

    /// See [`TransportClient::connect`].
    ///
    /// # Errors
    ///
    /// Propagates [`ClientError`] from the client.
    pub fn connect(&mut self, endpoint: Option<SocketAddr>) -> Result<(), ClientError> {
        self.client.connect(endpoint)
    }

    /// Runs one tick and returns every event the client raised.
    pub fn update(&mut self) -> Vec<ClientEvent> {
        self.client.tick();

        let mut surfaced = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let ClientEvent::CommandReceived {
                source, command, ..
            } = &event
            {
                let _replaying = self.replicator.guard().enter();
                let outcome = self.dispatcher.dispatch(*source, command);
                debug!("dispatch from {source}: {outcome:?}");
            }
            surfaced.push(event);
        }
        surfaced
    }

    /// Sends the command for a host action, unless it is an echo.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] if the client is not connected,
    /// or [`ClientError::Encoding`] if the command cannot be encoded.
    pub fn replicate(&mut self, action: HostAction) -> Result<ReplicateOutcome, ClientError> {
        match self.replicator.to_command(action) {
            Some((command, options)) => {
                self.client.send(&command, options)?;
                Ok(ReplicateOutcome::Sent)
            }
            None => Ok(ReplicateOutcome::Suppressed),
        }
    }

    pub fn client(&self) -> &TransportClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut TransportClient {
        &mut self.client
    }

    pub fn shared_state(&self) -> &SharedStateHandle {
        self.dispatcher.state()
    }

    pub fn replicator(&self) -> &ActionReplicator {
        &self.replicator
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
