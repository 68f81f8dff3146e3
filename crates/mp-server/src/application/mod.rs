//! Application layer for mp-server.
//!
//! Use cases here hold no sockets and do no I/O; the network server in
//! `infrastructure::network` feeds them connection and handshake events.

pub mod manage_players;
