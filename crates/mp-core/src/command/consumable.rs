//! Consumable permission commands.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{CommandError, Execute, StateChange};
use crate::state::{PlayerIdentity, SharedState};

/// Permits or forbids one consumable for the player with the given name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitConsumableToMinion {
    pub proper_name: String,
    pub consumable_id: String,
    pub is_allowed: bool,
}

impl Execute for PermitConsumableToMinion {
    fn execute(&self, state: &mut SharedState) -> Result<StateChange, CommandError> {
        let player = state
            .player_mut(&self.proper_name)
            .ok_or_else(|| CommandError::UnresolvedTarget(self.proper_name.clone()))?;
        player
            .consumables
            .insert(self.consumable_id.clone(), self.is_allowed);

        Ok(StateChange::ConsumablePermission {
            player: PlayerIdentity::new(self.proper_name.as_str()),
            consumable_id: self.consumable_id.clone(),
            is_allowed: self.is_allowed,
        })
    }
}

/// Replaces the set of consumable tags forbidden by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDefaultForbiddenConsumables {
    pub tags: Vec<String>,
}

impl Execute for SetDefaultForbiddenConsumables {
    fn execute(&self, state: &mut SharedState) -> Result<StateChange, CommandError> {
        let tags: BTreeSet<String> = self.tags.iter().cloned().collect();
        state.default_forbidden = tags.clone();
        Ok(StateChange::DefaultForbiddenChanged(tags))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(name: &str) -> SharedState {
        let mut state = SharedState::default();
        state.add_player(name.into());
        state
    }

    #[test]
    fn test_permit_sets_permission_for_named_player() {
        // Arrange
        let mut state = state_with("Bob");
        let cmd = PermitConsumableToMinion {
            proper_name: "Bob".into(),
            consumable_id: "item1".into(),
            is_allowed: true,
        };

        // Act
        let change = cmd.execute(&mut state).unwrap();

        // Assert
        assert_eq!(state.player("Bob").unwrap().permission("item1"), Some(true));
        assert_eq!(
            change,
            StateChange::ConsumablePermission {
                player: "Bob".into(),
                consumable_id: "item1".into(),
                is_allowed: true,
            }
        );
    }

    #[test]
    fn test_permit_overwrites_previous_value() {
        let mut state = state_with("Bob");
        for allowed in [true, false] {
            PermitConsumableToMinion {
                proper_name: "Bob".into(),
                consumable_id: "item1".into(),
                is_allowed: allowed,
            }
            .execute(&mut state)
            .unwrap();
        }
        assert_eq!(state.player("Bob").unwrap().permission("item1"), Some(false));
    }

    #[test]
    fn test_permit_for_unknown_player_is_unresolved() {
        let mut state = state_with("Bob");
        let before = state.clone();

        let result = PermitConsumableToMinion {
            proper_name: "Ghost".into(),
            consumable_id: "item1".into(),
            is_allowed: true,
        }
        .execute(&mut state);

        assert_eq!(result, Err(CommandError::UnresolvedTarget("Ghost".into())));
        assert_eq!(state, before);
    }

    #[test]
    fn test_default_forbidden_replaces_previous_set() {
        let mut state = SharedState::default();
        state.default_forbidden.insert("Old".into());

        let change = SetDefaultForbiddenConsumables {
            tags: vec!["Meat".into(), "Berry".into(), "Meat".into()],
        }
        .execute(&mut state)
        .unwrap();

        let expected: BTreeSet<String> = ["Berry".to_string(), "Meat".to_string()].into();
        assert_eq!(state.default_forbidden, expected);
        assert_eq!(change, StateChange::DefaultForbiddenChanged(expected));
    }
}
