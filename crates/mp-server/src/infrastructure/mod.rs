//! Infrastructure layer for mp-server: the transport-facing server and the
//! TOML configuration.

pub mod network;
pub mod storage;
