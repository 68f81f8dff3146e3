//! PlayerRegistry: which connection belongs to which player.
//!
//! Every accepted connection enters the registry as `AwaitingIdentity`.  The
//! first valid handshake message moves it to `Identified`:
//!
//! ```text
//! accepted ──► AwaitingIdentity ──(valid, unique name)──► Identified
//!                    │  ▲                                     │
//!                    └──┘ invalid bytes: keep waiting          │ closed
//!                    │                                        ▼
//!                    └──(duplicate name)──► removed ◄──────────┘
//! ```
//!
//! Only identified connections take part in relaying.

use std::collections::BTreeMap;

use mp_core::{ConnectionId, PlayerIdentity};
use thiserror::Error;

/// Handshake progress of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerState {
    AwaitingIdentity,
    Identified(PlayerIdentity),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("connection {0} already identified")]
    AlreadyIdentified(ConnectionId),

    #[error("player {identity} is already connected on {existing}")]
    DuplicateIdentity {
        identity: PlayerIdentity,
        existing: ConnectionId,
    },
}

/// In-memory roster keyed by connection.
///
/// A `BTreeMap` keeps iteration ordered by connection id, so relays go out
/// in the order peers connected.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    peers: BTreeMap<ConnectionId, PeerState>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a newly accepted connection.  Re-registering a known
    /// connection leaves its state alone.
    pub fn register_pending(&mut self, connection: ConnectionId) {
        self.peers
            .entry(connection)
            .or_insert(PeerState::AwaitingIdentity);
    }

    /// Binds `identity` to `connection`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownConnection`] if the connection was never registered.
    /// - [`RegistryError::AlreadyIdentified`] if the handshake already completed.
    /// - [`RegistryError::DuplicateIdentity`] if another connection holds the name.
    pub fn identify(
        &mut self,
        connection: ConnectionId,
        identity: PlayerIdentity,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.connection_of(&identity) {
            return Err(RegistryError::DuplicateIdentity { identity, existing });
        }
        match self.peers.get_mut(&connection) {
            None => Err(RegistryError::UnknownConnection(connection)),
            Some(PeerState::Identified(_)) => Err(RegistryError::AlreadyIdentified(connection)),
            Some(state) => {
                *state = PeerState::Identified(identity);
                Ok(())
            }
        }
    }

    /// Forgets `connection` and returns what it was.
    pub fn remove(&mut self, connection: ConnectionId) -> Option<PeerState> {
        self.peers.remove(&connection)
    }

    pub fn state(&self, connection: ConnectionId) -> Option<&PeerState> {
        self.peers.get(&connection)
    }

    pub fn identity_of(&self, connection: ConnectionId) -> Option<&PlayerIdentity> {
        match self.peers.get(&connection) {
            Some(PeerState::Identified(identity)) => Some(identity),
            _ => None,
        }
    }

    pub fn connection_of(&self, identity: &PlayerIdentity) -> Option<ConnectionId> {
        self.peers.iter().find_map(|(conn, state)| match state {
            PeerState::Identified(id) if id == identity => Some(*conn),
            _ => None,
        })
    }

    /// Every tracked connection, identified or not.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.peers.keys().copied().collect()
    }

    /// Identified connections other than `except`.
    pub fn identified_except(&self, except: Option<ConnectionId>) -> Vec<ConnectionId> {
        self.peers
            .iter()
            .filter(|(conn, state)| {
                Some(**conn) != except && matches!(state, PeerState::Identified(_))
            })
            .map(|(conn, _)| *conn)
            .collect()
    }

    /// Names of every identified player.
    pub fn players(&self) -> Vec<PlayerIdentity> {
        self.peers
            .values()
            .filter_map(|state| match state {
                PeerState::Identified(identity) => Some(identity.clone()),
                PeerState::AwaitingIdentity => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
