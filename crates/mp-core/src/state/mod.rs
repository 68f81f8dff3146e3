//! Replicated shared state.
//!
//! Every participant holds its own copy of [`SharedState`].  Copies stay
//! equal because they start equal and every change is made by executing the
//! same commands in the same order.
//!
//! # Readers and the single writer (for beginners)
//!
//! The state lives behind a [`SharedStateHandle`], which is a cheap-to-clone
//! `Arc<RwLock<SharedState>>`.  Any number of observers (a UI refresh, a
//! status printer) may hold read locks at the same time.  Only command
//! dispatch takes the write lock, and only for the duration of a single
//! command.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

/// Name a participant announces in its handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerIdentity(String);

impl PlayerIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerIdentity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Replicated state of a single player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSharedState {
    /// Consumable id -> permitted.
    pub consumables: BTreeMap<String, bool>,
}

impl PlayerSharedState {
    /// Returns the explicit permission for `consumable_id`, if one was set.
    pub fn permission(&self, consumable_id: &str) -> Option<bool> {
        self.consumables.get(consumable_id).copied()
    }
}

/// The whole replicated model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedState {
    pub players: BTreeMap<PlayerIdentity, PlayerSharedState>,
    /// Consumable tags forbidden for newly arriving players.
    pub default_forbidden: BTreeSet<String>,
}

impl SharedState {
    /// Adds `identity` with empty state.  Returns `false` if already present.
    pub fn add_player(&mut self, identity: PlayerIdentity) -> bool {
        if self.players.contains_key(&identity) {
            return false;
        }
        self.players.insert(identity, PlayerSharedState::default());
        true
    }

    /// Removes `identity`.  Returns `false` if it was not present.
    pub fn remove_player(&mut self, identity: &PlayerIdentity) -> bool {
        self.players.remove(identity).is_some()
    }

    /// Looks a player up by the name it is known under.
    pub fn player(&self, name: &str) -> Option<&PlayerSharedState> {
        self.players.get(&PlayerIdentity::new(name))
    }

    pub fn player_mut(&mut self, name: &str) -> Option<&mut PlayerSharedState> {
        self.players.get_mut(&PlayerIdentity::new(name))
    }
}

/// Shared, lock-protected handle to a [`SharedState`].
#[derive(Debug, Clone, Default)]
pub struct SharedStateHandle {
    inner: Arc<RwLock<SharedState>>,
}

impl SharedStateHandle {
    pub fn new(state: SharedState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Read access.  A poisoned lock is recovered, since every mutation
    /// leaves the state consistent before it can panic.
    pub fn read(&self) -> RwLockReadGuard<'_, SharedState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, SharedState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clones the current state.
    pub fn snapshot(&self) -> SharedState {
        self.read().clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
