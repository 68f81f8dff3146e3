//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the client's TOML file from an explicit
//! path or the platform config directory, and falls back to defaults on
//! first run.

pub mod config;
