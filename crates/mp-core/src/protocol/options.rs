//! Per-send delivery options.

use serde::{Deserialize, Serialize};

use crate::transport::SendMode;

/// Delivery guarantee requested for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Reliability {
    /// Exactly once, in order with other reliable commands on the connection.
    #[default]
    ReliableOrdered,
    /// May be dropped.  Only valid for commands that fit in a single frame.
    Unreliable,
}

impl Reliability {
    pub fn send_mode(self) -> SendMode {
        match self {
            Reliability::ReliableOrdered => SendMode::Reliable,
            Reliability::Unreliable => SendMode::Unreliable,
        }
    }
}

/// Which side of the session acts on a command.
///
/// The authoritative server always sees every command first.  Routing tells
/// it whether to execute the command locally, relay it to the other peers,
/// or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Routing {
    /// Executed by the server and relayed to every other peer.
    #[default]
    All = 0x00,
    /// Relayed to every other peer but not executed by the server.
    SkipHost = 0x01,
    /// Executed by the server only.
    OnlyHost = 0x02,
}

impl Routing {
    /// Parses the routing byte of a frame header.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Routing::All),
            0x01 => Some(Routing::SkipHost),
            0x02 => Some(Routing::OnlyHost),
            _ => None,
        }
    }

    pub fn executes_on_host(self) -> bool {
        !matches!(self, Routing::SkipHost)
    }

    pub fn relays_to_peers(self) -> bool {
        !matches!(self, Routing::OnlyHost)
    }
}

/// Reliability plus routing, attached to every outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryOptions {
    pub reliability: Reliability,
    pub routing: Routing,
}

impl DeliveryOptions {
    /// Reliable, ordered, executed everywhere.
    pub fn reliable() -> Self {
        Self::default()
    }

    pub fn unreliable() -> Self {
        Self {
            reliability: Reliability::Unreliable,
            ..Self::default()
        }
    }

    pub fn with_routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
