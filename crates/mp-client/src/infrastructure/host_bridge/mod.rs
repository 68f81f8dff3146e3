//! Bridge to the host simulation.
//!
//! The real host (a game, a simulation front end) implements
//! [`HostNotifier`] to refresh whatever it displays for the changed state.
//! The binary has no host attached, so it uses [`LoggingNotifier`], which
//! logs each change and counts refreshes for status reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use mp_core::{HostNotifier, StateChange};
use tracing::info;

#[derive(Debug, Default)]
pub struct LoggingNotifier {
    refreshes: AtomicU64,
}

impl LoggingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refreshes requested so far.
    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}

impl HostNotifier for LoggingNotifier {
    fn on_state_changed(&self, change: &StateChange) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        match change {
            StateChange::PlayerJoined(identity) => info!("player {identity} joined"),
            StateChange::PlayerLeft(identity) => info!("player {identity} left"),
            StateChange::ConsumablePermission {
                player,
                consumable_id,
                is_allowed,
            } => info!(
                "{player}: {consumable_id} {}",
                if *is_allowed { "permitted" } else { "forbidden" }
            ),
            StateChange::DefaultForbiddenChanged(tags) => {
                info!("default forbidden consumables: {tags:?}")
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
