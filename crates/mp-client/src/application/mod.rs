//! Application layer use cases for the client.
//!
//! - **`replicate_actions`** – Turns host actions into outbound commands and
//!   suppresses the echoes produced while remote commands are applied.
//! - **`session`** – The per-tick loop: tick the transport client, apply
//!   received commands, surface client events to the host.

pub mod replicate_actions;
pub mod session;
