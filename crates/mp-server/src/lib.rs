//! mp-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does mp-server do? (for beginners)
//!
//! The server is the authoritative side of a session.  Every participant
//! connects to it and announces a player name.  The server keeps the roster,
//! applies replicated commands to its own copy of the shared state, and
//! relays each command to everyone else, so that all participants converge
//! on the same state.

/// Application layer: the player roster.
pub mod application;

/// Infrastructure layer: the network server and configuration storage.
pub mod infrastructure;
