//! Turns locally observed host actions into replicated commands.
//!
//! # Echo suppression (for beginners)
//!
//! Applying a remote command locally changes the host simulation, and the
//! host reports that change just like a change made by the local user.
//! Without care, the client would send the command straight back out and
//! the participants would bounce it between each other forever.
//!
//! The [`ReplayGuard`] prevents that.  While a remote command is being
//! applied, the guard is held; any host action reported during that window
//! is recognised as an echo and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mp_core::{DeliveryOptions, MultiplayerCommand};
use tracing::trace;

/// A user action observed in the host simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    /// A consumable was permitted or forbidden for a named character.
    ConsumablePermitted {
        proper_name: String,
        consumable_id: String,
        is_allowed: bool,
    },
    /// The "permitted by default" row changed; carries the forbidden tags.
    DefaultForbiddenChanged { tags: Vec<String> },
}

impl HostAction {
    pub fn into_command(self) -> MultiplayerCommand {
        match self {
            HostAction::ConsumablePermitted {
                proper_name,
                consumable_id,
                is_allowed,
            } => MultiplayerCommand::permit_consumable(proper_name, consumable_id, is_allowed),
            HostAction::DefaultForbiddenChanged { tags } => {
                MultiplayerCommand::set_default_forbidden(tags)
            }
        }
    }
}

/// Flag raised while remote commands are applied locally.
///
/// Clones share the flag, so the host bridge can hold one while the session
/// holds another.
#[derive(Debug, Clone, Default)]
pub struct ReplayGuard {
    replaying: Arc<AtomicBool>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag until the returned token is dropped.
    pub fn enter(&self) -> ReplayToken {
        let was = self.replaying.swap(true, Ordering::SeqCst);
        ReplayToken {
            replaying: Arc::clone(&self.replaying),
            restore: was,
        }
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying.load(Ordering::SeqCst)
    }
}

/// RAII token returned by [`ReplayGuard::enter`].
#[must_use = "the guard is released as soon as the token is dropped"]
pub struct ReplayToken {
    replaying: Arc<AtomicBool>,
    restore: bool,
}

impl Drop for ReplayToken {
    fn drop(&mut self) {
        self.replaying.store(self.restore, Ordering::SeqCst);
    }
}

/// Converts host actions to outbound commands unless they are echoes.
#[derive(Debug, Clone)]
pub struct ActionReplicator {
    guard: ReplayGuard,
    options: DeliveryOptions,
}

impl ActionReplicator {
    pub fn new(guard: ReplayGuard, options: DeliveryOptions) -> Self {
        Self { guard, options }
    }

    /// Returns the command to send for `action`, or `None` if the action was
    /// raised by applying a remote command.
    pub fn to_command(&self, action: HostAction) -> Option<(MultiplayerCommand, DeliveryOptions)> {
        if self.guard.is_replaying() {
            trace!("suppressing echo of {action:?}");
            return None;
        }
        Some((action.into_command(), self.options))
    }

    pub fn guard(&self) -> &ReplayGuard {
        &self.guard
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn permit_action() -> HostAction {
        HostAction::ConsumablePermitted {
            proper_name: "Bob".into(),
            consumable_id: "item1".into(),
            is_allowed: true,
        }
    }

    #[test]
    fn test_action_becomes_command_outside_replay() {
        let replicator = ActionReplicator::new(ReplayGuard::new(), DeliveryOptions::default());

        let out = replicator.to_command(permit_action());

        assert_eq!(
            out,
            Some((
                MultiplayerCommand::permit_consumable("Bob", "item1", true),
                DeliveryOptions::default()
            ))
        );
    }

    #[test]
    fn test_action_during_replay_is_suppressed() {
        // Arrange
        let guard = ReplayGuard::new();
        let replicator = ActionReplicator::new(guard.clone(), DeliveryOptions::default());

        // Act
        let token = guard.enter();
        let during = replicator.to_command(permit_action());
        drop(token);
        let after = replicator.to_command(permit_action());

        // Assert
        assert!(during.is_none());
        assert!(after.is_some());
    }

    #[test]
    fn test_nested_tokens_restore_outer_state() {
        let guard = ReplayGuard::new();
        let outer = guard.enter();
        {
            let _inner = guard.enter();
        }
        assert!(guard.is_replaying());
        drop(outer);
        assert!(!guard.is_replaying());
    }

    #[test]
    fn test_default_forbidden_action_maps_to_tags_command() {
        let cmd = HostAction::DefaultForbiddenChanged {
            tags: vec!["Meat".into()],
        }
        .into_command();
        assert_eq!(cmd, MultiplayerCommand::set_default_forbidden(["Meat"]));
    }
}
