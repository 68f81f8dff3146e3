//! In-process loopback network.
//!
//! A [`LoopbackNetwork`] is a shared hub; every call to
//! [`LoopbackNetwork::endpoint`] creates a [`LoopbackTransport`] that behaves
//! like an independent socket attached to the hub.  Messages are delivered
//! reliably and in order, and connection lifecycle events follow the same
//! rules as a real connection-oriented transport:
//!
//! ```text
//! client.connect(addr) ──► listener gets Connecting ──► listener.accept()
//!                                                        │
//!              client gets Connected  ◄──────────────────┤
//!              listener gets Connected ◄─────────────────┘
//! ```
//!
//! Connecting to an address nobody listens on yields a
//! `ProblemDetectedLocally` event for the new handle on the next
//! `run_callbacks()`.  [`LoopbackNetwork::sever`] simulates a network fault.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{
    ConnectionId, ConnectionStatus, SendMode, StatusEvent, Transport, TransportError,
};

type EndpointId = u32;

#[derive(Debug)]
struct Link {
    owner: EndpointId,
    peer: Option<ConnectionId>,
    status: ConnectionStatus,
    inbox: VecDeque<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Hub {
    next_connection: u32,
    next_endpoint: EndpointId,
    listeners: HashMap<SocketAddr, EndpointId>,
    links: HashMap<ConnectionId, Link>,
    events: HashMap<EndpointId, VecDeque<StatusEvent>>,
}

impl Hub {
    fn allocate_connection(&mut self) -> ConnectionId {
        // Handle 0 is never issued so it can never collide with a default value.
        self.next_connection = self.next_connection.wrapping_add(1).max(1);
        ConnectionId(self.next_connection)
    }

    fn push_event(&mut self, owner: EndpointId, connection: ConnectionId, status: ConnectionStatus) {
        self.events
            .entry(owner)
            .or_default()
            .push_back(StatusEvent::new(connection, status));
    }

    /// Moves a live link into a terminal status and notifies its owner.
    fn terminate(&mut self, connection: ConnectionId, status: ConnectionStatus) {
        if let Some(link) = self.links.get_mut(&connection) {
            if link.status.is_terminal() {
                return;
            }
            link.status = status;
            link.peer = None;
            let owner = link.owner;
            self.push_event(owner, connection, status);
        }
    }
}

/// Shared in-process network hub.  Cloning yields another handle to the
/// same hub.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new endpoint (socket) to the hub.
    pub fn endpoint(&self) -> LoopbackTransport {
        let mut hub = self.lock();
        hub.next_endpoint += 1;
        let id = hub.next_endpoint;
        hub.events.insert(id, VecDeque::new());
        LoopbackTransport {
            network: self.clone(),
            id,
        }
    }

    /// Breaks the link behind `connection`: both sides receive
    /// `ProblemDetectedLocally` on their next `run_callbacks()`.
    pub fn sever(&self, connection: ConnectionId) {
        let mut hub = self.lock();
        let peer = hub.links.get(&connection).and_then(|l| l.peer);
        hub.terminate(connection, ConnectionStatus::ProblemDetectedLocally);
        if let Some(peer) = peer {
            hub.terminate(peer, ConnectionStatus::ProblemDetectedLocally);
        }
    }

    /// Removes the listener bound to `addr`.  Existing connections survive;
    /// new connects to `addr` fail.
    pub fn stop_listening(&self, addr: SocketAddr) {
        self.lock().listeners.remove(&addr);
    }

    /// Current status of a connection handle, if it is still allocated.
    pub fn status(&self, connection: ConnectionId) -> Option<ConnectionStatus> {
        self.lock().links.get(&connection).map(|l| l.status)
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One endpoint attached to a [`LoopbackNetwork`].
#[derive(Debug)]
pub struct LoopbackTransport {
    network: LoopbackNetwork,
    id: EndpointId,
}

impl Transport for LoopbackTransport {
    fn listen(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        let mut hub = self.network.lock();
        match hub.listeners.get(&addr) {
            Some(owner) if *owner != self.id => Err(TransportError::ListenFailed {
                addr,
                reason: "address already in use".to_string(),
            }),
            _ => {
                hub.listeners.insert(addr, self.id);
                debug!("loopback endpoint {} listening on {addr}", self.id);
                Ok(())
            }
        }
    }

    fn connect(&mut self, endpoint: SocketAddr) -> Result<ConnectionId, TransportError> {
        let mut hub = self.network.lock();
        let local = hub.allocate_connection();

        match hub.listeners.get(&endpoint).copied() {
            Some(listener) => {
                let remote = hub.allocate_connection();
                hub.links.insert(
                    local,
                    Link {
                        owner: self.id,
                        peer: Some(remote),
                        status: ConnectionStatus::Connecting,
                        inbox: VecDeque::new(),
                    },
                );
                hub.links.insert(
                    remote,
                    Link {
                        owner: listener,
                        peer: Some(local),
                        status: ConnectionStatus::Connecting,
                        inbox: VecDeque::new(),
                    },
                );
                hub.push_event(listener, remote, ConnectionStatus::Connecting);
            }
            None => {
                hub.links.insert(
                    local,
                    Link {
                        owner: self.id,
                        peer: None,
                        status: ConnectionStatus::ProblemDetectedLocally,
                        inbox: VecDeque::new(),
                    },
                );
                hub.push_event(self.id, local, ConnectionStatus::ProblemDetectedLocally);
            }
        }
        Ok(local)
    }

    fn accept(&mut self, connection: ConnectionId) -> Result<(), TransportError> {
        let mut hub = self.network.lock();
        let link = hub
            .links
            .get_mut(&connection)
            .filter(|l| l.owner == self.id)
            .ok_or(TransportError::UnknownConnection(connection))?;
        let peer = match (link.status, link.peer) {
            (ConnectionStatus::Connecting, Some(peer)) => peer,
            (status, _) => return Err(TransportError::InvalidState { connection, status }),
        };
        link.status = ConnectionStatus::Connected;
        hub.push_event(self.id, connection, ConnectionStatus::Connected);

        if let Some(remote) = hub.links.get_mut(&peer) {
            remote.status = ConnectionStatus::Connected;
            let owner = remote.owner;
            hub.push_event(owner, peer, ConnectionStatus::Connected);
        }
        Ok(())
    }

    fn close(&mut self, connection: ConnectionId) {
        let mut hub = self.network.lock();
        let Some(link) = hub.links.remove(&connection) else {
            return;
        };
        if let Some(peer) = link.peer {
            hub.terminate(peer, ConnectionStatus::ClosedByPeer);
        }
    }

    fn send(
        &mut self,
        connection: ConnectionId,
        message: &[u8],
        _mode: SendMode,
    ) -> Result<(), TransportError> {
        let mut hub = self.network.lock();
        let link = hub
            .links
            .get(&connection)
            .filter(|l| l.owner == self.id)
            .ok_or(TransportError::UnknownConnection(connection))?;
        let peer = match (link.status, link.peer) {
            (ConnectionStatus::Connected, Some(peer)) => peer,
            (status, _) => return Err(TransportError::InvalidState { connection, status }),
        };
        let remote = hub
            .links
            .get_mut(&peer)
            .ok_or(TransportError::UnknownConnection(peer))?;
        remote.inbox.push_back(message.to_vec());
        Ok(())
    }

    fn receive(&mut self, connection: ConnectionId, max: usize) -> Vec<Vec<u8>> {
        let mut hub = self.network.lock();
        match hub.links.get_mut(&connection).filter(|l| l.owner == self.id) {
            Some(link) => {
                let count = max.min(link.inbox.len());
                link.inbox.drain(..count).collect()
            }
            None => Vec::new(),
        }
    }

    fn run_callbacks(&mut self) -> Vec<StatusEvent> {
        let mut hub = self.network.lock();
        hub.events
            .get_mut(&self.id)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
