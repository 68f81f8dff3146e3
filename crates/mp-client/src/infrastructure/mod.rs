//! Infrastructure layer for the client application.
//!
//! Contains the adapters that touch the outside world: the transport client
//! state machine, config file storage, and the bridge to the host simulation.

pub mod host_bridge;
pub mod network;
pub mod storage;
