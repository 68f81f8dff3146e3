//! Command dispatch: executes received commands against the shared state and
//! tells the host what changed.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::command::{CommandError, Execute, MultiplayerCommand, StateChange};
use crate::state::SharedStateHandle;
use crate::transport::ConnectionId;

/// Host-side collaborator refreshed after every applied command.
///
/// Called synchronously on the dispatching thread with no lock held.  The
/// return value is deliberately `()`: a slow or failing refresh never affects
/// protocol state.
#[cfg_attr(test, mockall::automock)]
pub trait HostNotifier: Send + Sync {
    fn on_state_changed(&self, change: &StateChange);
}

/// A notifier that does nothing, for headless participants.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl HostNotifier for NoopNotifier {
    fn on_state_changed(&self, _change: &StateChange) {}
}

/// Result of dispatching one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied(StateChange),
    /// The command's target was not found; nothing changed.
    Skipped(CommandError),
}

/// The single writer of a [`SharedStateHandle`].
#[derive(Clone)]
pub struct CommandDispatcher {
    state: SharedStateHandle,
    notifier: Arc<dyn HostNotifier>,
}

impl CommandDispatcher {
    pub fn new(state: SharedStateHandle, notifier: Arc<dyn HostNotifier>) -> Self {
        Self { state, notifier }
    }

    pub fn state(&self) -> &SharedStateHandle {
        &self.state
    }

    /// Executes `command`, received from `source`, and notifies the host.
    pub fn dispatch(&self, source: ConnectionId, command: &MultiplayerCommand) -> DispatchOutcome {
        // The write guard is dropped before the host is called back.
        let result = command.execute(&mut self.state.write());

        match result {
            Ok(change) => {
                debug!("applied {:?} from {source}", command.kind());
                self.notifier.on_state_changed(&change);
                DispatchOutcome::Applied(change)
            }
            Err(e) => {
                warn!("skipping {:?} from {source}: {e}", command.kind());
                DispatchOutcome::Skipped(e)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
