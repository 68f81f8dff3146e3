//! Replicated commands.
//!
//! A command is a self-contained description of one action.  It only refers
//! to things by stable identifiers (player names, consumable ids), never by
//! local handles, so every participant can execute it against its own copy
//! of the [`SharedState`](crate::state::SharedState).
//!
//! # Adding a command (for beginners)
//!
//! 1. Write a payload struct in a submodule and implement [`Execute`] for it.
//! 2. Add a variant to [`MultiplayerCommand`] and a tag to [`CommandKind`].
//! 3. Extend the two `match` blocks below.
//!
//! The kind tag travels in the frame header; bincode encodes the variant
//! index in the payload.  The codec checks that both agree.

pub mod consumable;
pub mod roster;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{PlayerIdentity, SharedState};

pub use consumable::{PermitConsumableToMinion, SetDefaultForbiddenConsumables};
pub use roster::{PlayerJoined, PlayerLeft};

/// Wire tag for each command variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    PlayerJoined = 0x01,
    PlayerLeft = 0x02,
    PermitConsumableToMinion = 0x10,
    SetDefaultForbiddenConsumables = 0x11,
}

impl CommandKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(CommandKind::PlayerJoined),
            0x02 => Some(CommandKind::PlayerLeft),
            0x10 => Some(CommandKind::PermitConsumableToMinion),
            0x11 => Some(CommandKind::SetDefaultForbiddenConsumables),
            _ => None,
        }
    }
}

/// Errors raised while executing a command against local state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The entity the command targets does not exist here.
    #[error("target {0:?} not found")]
    UnresolvedTarget(String),
}

/// What a successfully executed command changed.
///
/// Handed to the host so it can refresh whatever it shows for that state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    PlayerJoined(PlayerIdentity),
    PlayerLeft(PlayerIdentity),
    ConsumablePermission {
        player: PlayerIdentity,
        consumable_id: String,
        is_allowed: bool,
    },
    DefaultForbiddenChanged(BTreeSet<String>),
}

/// Executes a command against the shared state.
pub trait Execute {
    /// # Errors
    ///
    /// Returns [`CommandError::UnresolvedTarget`] if the command refers to an
    /// entity that cannot be found.  The state is left untouched in that case.
    fn execute(&self, state: &mut SharedState) -> Result<StateChange, CommandError>;
}

/// Every command that can travel between participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiplayerCommand {
    PlayerJoined(PlayerJoined),
    PlayerLeft(PlayerLeft),
    PermitConsumableToMinion(PermitConsumableToMinion),
    SetDefaultForbiddenConsumables(SetDefaultForbiddenConsumables),
}

impl MultiplayerCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            MultiplayerCommand::PlayerJoined(_) => CommandKind::PlayerJoined,
            MultiplayerCommand::PlayerLeft(_) => CommandKind::PlayerLeft,
            MultiplayerCommand::PermitConsumableToMinion(_) => {
                CommandKind::PermitConsumableToMinion
            }
            MultiplayerCommand::SetDefaultForbiddenConsumables(_) => {
                CommandKind::SetDefaultForbiddenConsumables
            }
        }
    }

    pub fn permit_consumable(
        proper_name: impl Into<String>,
        consumable_id: impl Into<String>,
        is_allowed: bool,
    ) -> Self {
        MultiplayerCommand::PermitConsumableToMinion(PermitConsumableToMinion {
            proper_name: proper_name.into(),
            consumable_id: consumable_id.into(),
            is_allowed,
        })
    }

    pub fn set_default_forbidden<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MultiplayerCommand::SetDefaultForbiddenConsumables(SetDefaultForbiddenConsumables {
            tags: tags.into_iter().map(Into::into).collect(),
        })
    }

    pub fn player_joined(identity: PlayerIdentity) -> Self {
        MultiplayerCommand::PlayerJoined(PlayerJoined { identity })
    }

    pub fn player_left(identity: PlayerIdentity) -> Self {
        MultiplayerCommand::PlayerLeft(PlayerLeft { identity })
    }
}

impl Execute for MultiplayerCommand {
    fn execute(&self, state: &mut SharedState) -> Result<StateChange, CommandError> {
        match self {
            MultiplayerCommand::PlayerJoined(cmd) => cmd.execute(state),
            MultiplayerCommand::PlayerLeft(cmd) => cmd.execute(state),
            MultiplayerCommand::PermitConsumableToMinion(cmd) => cmd.execute(state),
            MultiplayerCommand::SetDefaultForbiddenConsumables(cmd) => cmd.execute(state),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
