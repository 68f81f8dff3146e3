//! Persistent storage for mp-server.  Only the TOML config lives here.

pub mod config;
