//! Connection-oriented, reliable, message-based transport abstraction.
//!
//! The replication pipeline never talks to sockets directly.  Everything it
//! needs from the network is expressed by the [`Transport`] trait:
//!
//! - **connection ids** – every peer connection is an opaque [`ConnectionId`]
//!   that stays unique until it is explicitly closed.
//! - **status events** – lifecycle changes (`Connecting`, `Connected`,
//!   `ClosedByPeer`, `ProblemDetectedLocally`) are queued by the transport
//!   and handed out by [`Transport::run_callbacks`].
//! - **messages** – whole byte messages, delivered reliably and in order per
//!   connection when [`SendMode::Reliable`] is requested.
//!
//! # Callbacks on the caller's thread (for beginners)
//!
//! Many networking libraries report connection changes through callbacks
//! that fire from a background thread.  Here the transport only *queues*
//! status changes.  The owner pumps them with `run_callbacks()` from its own
//! `connect()` or `tick()` call and handles each one inline through the
//! [`ConnectionStatusHandler`] trait, so no handler ever runs concurrently
//! with the host's update loop.  A transport may still do blocking socket
//! work on a helper thread (TCP connects do), as long as the outcome only
//! surfaces through `run_callbacks()`.
//!
//! # Implementations
//!
//! - [`loopback::LoopbackNetwork`] – an in-process network shared by any
//!   number of endpoints.  Used by tests and single-process sessions.
//! - [`tcp::TcpTransport`] – non-blocking `std::net` sockets with
//!   length-prefixed messages.
//! - [`mock::MockTransport`] – scripted events and recorded calls for tests.

pub mod loopback;
pub mod mock;
pub mod tcp;

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque handle identifying one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a connection as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No state (the handle has been released).
    None,
    /// The connection attempt is in progress.  On a listening endpoint this
    /// is the moment to call [`Transport::accept`].
    Connecting,
    /// Both sides agree the connection is open.
    Connected,
    /// The remote side closed the connection.
    ClosedByPeer,
    /// The local side gave up on the connection (timeout, refused, I/O error).
    ProblemDetectedLocally,
}

impl ConnectionStatus {
    /// Returns `true` for the two statuses that end a connection.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionStatus::ClosedByPeer | ConnectionStatus::ProblemDetectedLocally
        )
    }
}

/// A single queued status change for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    /// The connection whose status changed.
    pub connection: ConnectionId,
    /// The new status.
    pub status: ConnectionStatus,
}

impl StatusEvent {
    pub fn new(connection: ConnectionId, status: ConnectionStatus) -> Self {
        Self { connection, status }
    }
}

/// Delivery guarantee requested for one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendMode {
    /// Delivered exactly once, in order with other reliable sends.
    Reliable,
    /// May be dropped.  Only ever used for single-frame messages.
    Unreliable,
}

/// Errors returned by [`Transport`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection id is not (or no longer) known to the transport.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// The connection exists but is not in a state that allows the operation.
    #[error("connection {connection} is {status:?}")]
    InvalidState {
        connection: ConnectionId,
        status: ConnectionStatus,
    },

    /// Binding a listening socket failed.
    #[error("failed to listen on {addr}: {reason}")]
    ListenFailed { addr: SocketAddr, reason: String },

    /// The message is larger than the transport can carry.
    #[error("message of {size} bytes exceeds the transport limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    /// An operating-system level I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Synchronous, connection-oriented, message-based transport.
///
/// Implementations must never block on the network, and must only report
/// status changes through [`run_callbacks`](Transport::run_callbacks).
pub trait Transport: Send {
    /// Starts accepting inbound connections on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ListenFailed`] if the address cannot be bound.
    fn listen(&mut self, addr: SocketAddr) -> Result<(), TransportError>;

    /// Begins an outbound connection to `endpoint` and returns its handle.
    ///
    /// A failure to reach the endpoint is normally reported later as a
    /// [`ConnectionStatus::ProblemDetectedLocally`] event for the returned
    /// handle, not as an error here.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only if no handle could be allocated at all.
    fn connect(&mut self, endpoint: SocketAddr) -> Result<ConnectionId, TransportError>;

    /// Accepts an inbound connection that was reported as `Connecting`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the connection is unknown or not pending.
    fn accept(&mut self, connection: ConnectionId) -> Result<(), TransportError>;

    /// Closes the connection and releases its handle.  Unknown ids are ignored.
    fn close(&mut self, connection: ConnectionId);

    /// Queues one message for delivery on `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the connection is unknown, not connected,
    /// or the message is too large.
    fn send(
        &mut self,
        connection: ConnectionId,
        message: &[u8],
        mode: SendMode,
    ) -> Result<(), TransportError>;

    /// Pops at most `max` received messages for `connection`, in arrival order.
    fn receive(&mut self, connection: ConnectionId, max: usize) -> Vec<Vec<u8>>;

    /// Performs pending I/O and returns all status changes queued since the
    /// previous call, in the order they happened.
    fn run_callbacks(&mut self) -> Vec<StatusEvent>;
}

/// Receives status changes pumped out of a [`Transport`].
///
/// Both the transport client and the authoritative server implement this;
/// the client forwards events for connections it does not own to an
/// optional server-side handler.
pub trait ConnectionStatusHandler {
    fn on_status_changed(&mut self, event: &StatusEvent);
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display_uses_hash_prefix() {
        assert_eq!(ConnectionId(7).to_string(), "#7");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ConnectionStatus::ClosedByPeer.is_terminal());
        assert!(ConnectionStatus::ProblemDetectedLocally.is_terminal());
        assert!(!ConnectionStatus::Connected.is_terminal());
        assert!(!ConnectionStatus::Connecting.is_terminal());
        assert!(!ConnectionStatus::None.is_terminal());
    }
}
