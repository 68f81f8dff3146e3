//! mp-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does mp-client do? (for beginners)
//!
//! Every participant of a session runs a client.  The client:
//!
//! 1. Connects to the authoritative server (or, in the host role, to the
//!    server on the same machine) and announces its identity.
//! 2. Each tick, pumps connection events and receives a bounded batch of
//!    command frames, which are reassembled and applied to the local copy
//!    of the shared state.
//! 3. Sends the commands for actions the local user performs in the host
//!    simulation.
//! 4. Reconnects to the same endpoint after a drop, at most a fixed number
//!    of times, then gives up and tells the host.

/// Application layer: use cases for the client.
pub mod application;

/// Infrastructure layer: network, storage, and host bridge.
pub mod infrastructure;
