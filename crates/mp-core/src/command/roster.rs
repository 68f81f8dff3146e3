//! Roster commands, issued by the authoritative server when players come and go.

use serde::{Deserialize, Serialize};

use super::{CommandError, Execute, StateChange};
use crate::state::{PlayerIdentity, SharedState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerJoined {
    pub identity: PlayerIdentity,
}

impl Execute for PlayerJoined {
    /// Adds the player.  A newcomer starts with every default-forbidden tag
    /// set to forbidden.  Joining twice leaves the existing state alone.
    fn execute(&self, state: &mut SharedState) -> Result<StateChange, CommandError> {
        let defaults: Vec<String> = state.default_forbidden.iter().cloned().collect();
        if state.add_player(self.identity.clone()) {
            if let Some(player) = state.player_mut(self.identity.as_str()) {
                for tag in defaults {
                    player.consumables.insert(tag, false);
                }
            }
        }
        Ok(StateChange::PlayerJoined(self.identity.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLeft {
    pub identity: PlayerIdentity,
}

impl Execute for PlayerLeft {
    fn execute(&self, state: &mut SharedState) -> Result<StateChange, CommandError> {
        if !state.remove_player(&self.identity) {
            return Err(CommandError::UnresolvedTarget(self.identity.to_string()));
        }
        Ok(StateChange::PlayerLeft(self.identity.clone()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joined_player_inherits_default_forbidden_tags() {
        // Arrange
        let mut state = SharedState::default();
        state.default_forbidden.insert("Meat".into());

        // Act
        PlayerJoined {
            identity: "Bob".into(),
        }
        .execute(&mut state)
        .unwrap();

        // Assert
        assert_eq!(state.player("Bob").unwrap().permission("Meat"), Some(false));
    }

    #[test]
    fn test_rejoin_keeps_existing_permissions() {
        let mut state = SharedState::default();
        state.add_player("Bob".into());
        state
            .player_mut("Bob")
            .unwrap()
            .consumables
            .insert("item1".into(), true);

        PlayerJoined {
            identity: "Bob".into(),
        }
        .execute(&mut state)
        .unwrap();

        assert_eq!(state.player("Bob").unwrap().permission("item1"), Some(true));
    }

    #[test]
    fn test_left_removes_player() {
        let mut state = SharedState::default();
        state.add_player("Bob".into());

        let change = PlayerLeft {
            identity: "Bob".into(),
        }
        .execute(&mut state)
        .unwrap();

        assert_eq!(change, StateChange::PlayerLeft("Bob".into()));
        assert!(state.players.is_empty());
    }

    #[test]
    fn test_left_for_unknown_player_is_unresolved() {
        let mut state = SharedState::default();
        let result = PlayerLeft {
            identity: "Bob".into(),
        }
        .execute(&mut state);
        assert_eq!(result, Err(CommandError::UnresolvedTarget("Bob".into())));
    }
}
