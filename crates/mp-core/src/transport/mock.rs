//! Scripted transport for tests.
//!
//! [`MockTransport`] never touches the network.  Tests script what the
//! transport *would* report (status events, inbound messages) and afterwards
//! inspect what the code under test asked it to do (connects, sends, closes).
//!
//! The transport is `Clone`: all clones share the same state, so a test can
//! hand one clone to the client as a `Box<dyn Transport>` and keep another
//! to drive and inspect it.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    ConnectionId, ConnectionStatus, SendMode, StatusEvent, Transport, TransportError,
};

/// One recorded call to [`Transport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub connection: ConnectionId,
    pub bytes: Vec<u8>,
    pub mode: SendMode,
}

#[derive(Default)]
struct MockState {
    next_connection: u32,
    listening: Vec<SocketAddr>,
    connects: Vec<(SocketAddr, ConnectionId)>,
    accepted: Vec<ConnectionId>,
    closed: Vec<ConnectionId>,
    sent: Vec<SentMessage>,
    events: VecDeque<StatusEvent>,
    inbound: HashMap<ConnectionId, VecDeque<Vec<u8>>>,
    fail_sends: bool,
    fail_connects: bool,
}

/// A transport whose behaviour is scripted by the test.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Scripting ─────────────────────────────────────────────────────────

    /// Queues a status event for the next `run_callbacks()`.
    pub fn push_event(&self, connection: ConnectionId, status: ConnectionStatus) {
        self.lock()
            .events
            .push_back(StatusEvent::new(connection, status));
    }

    /// Queues an inbound message on `connection`.
    pub fn push_inbound(&self, connection: ConnectionId, bytes: Vec<u8>) {
        self.lock()
            .inbound
            .entry(connection)
            .or_default()
            .push_back(bytes);
    }

    /// Makes every subsequent `send()` fail with an I/O error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Makes every subsequent `connect()` fail synchronously.
    pub fn set_fail_connects(&self, fail: bool) {
        self.lock().fail_connects = fail;
    }

    // ── Inspection ────────────────────────────────────────────────────────

    /// Every `connect()` call so far with the handle it returned.
    pub fn connects(&self) -> Vec<(SocketAddr, ConnectionId)> {
        self.lock().connects.clone()
    }

    /// Handle returned by the most recent `connect()`.
    pub fn last_connection(&self) -> Option<ConnectionId> {
        self.lock().connects.last().map(|(_, id)| *id)
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    pub fn closed(&self) -> Vec<ConnectionId> {
        self.lock().closed.clone()
    }

    pub fn accepted(&self) -> Vec<ConnectionId> {
        self.lock().accepted.clone()
    }

    pub fn listening(&self) -> Vec<SocketAddr> {
        self.lock().listening.clone()
    }
}

impl Transport for MockTransport {
    fn listen(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        self.lock().listening.push(addr);
        Ok(())
    }

    fn connect(&mut self, endpoint: SocketAddr) -> Result<ConnectionId, TransportError> {
        let mut state = self.lock();
        if state.fail_connects {
            return Err(TransportError::Io(format!("connect to {endpoint} refused")));
        }
        state.next_connection += 1;
        let id = ConnectionId(state.next_connection);
        state.connects.push((endpoint, id));
        Ok(id)
    }

    fn accept(&mut self, connection: ConnectionId) -> Result<(), TransportError> {
        self.lock().accepted.push(connection);
        Ok(())
    }

    fn close(&mut self, connection: ConnectionId) {
        let mut state = self.lock();
        state.closed.push(connection);
        state.inbound.remove(&connection);
    }

    fn send(
        &mut self,
        connection: ConnectionId,
        message: &[u8],
        mode: SendMode,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.fail_sends {
            return Err(TransportError::Io("scripted send failure".to_string()));
        }
        state.sent.push(SentMessage {
            connection,
            bytes: message.to_vec(),
            mode,
        });
        Ok(())
    }

    fn receive(&mut self, connection: ConnectionId, max: usize) -> Vec<Vec<u8>> {
        let mut state = self.lock();
        match state.inbound.get_mut(&connection) {
            Some(queue) => {
                let count = max.min(queue.len());
                queue.drain(..count).collect()
            }
            None => Vec::new(),
        }
    }

    fn run_callbacks(&mut self) -> Vec<StatusEvent> {
        self.lock().events.drain(..).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
