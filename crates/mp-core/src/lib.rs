//! # mp-core
//!
//! Shared library for multiplayer sync: the wire protocol, the replicated
//! command set, the shared state model, command dispatch, the reconnection
//! policy, and the transport abstraction.
//!
//! Both the client and the authoritative server build on this crate.  It has
//! no async runtime (only tokio's channel type) and no host/UI code.
//!
//! # Architecture overview (for beginners)
//!
//! Several participants run the same simulation.  When one of them does
//! something that must be seen by everyone (for example forbidding a food
//! for a named character), the action is turned into a *command* and sent to
//! the others, who execute the same command against their own copy of the
//! shared state.
//!
//! ```text
//! host action -> MessageCodec::encode -> Transport::send
//!     -> [network] ->
//! Transport::receive -> MessageProcessor::process -> CommandDispatcher::dispatch
//! ```
//!
//! - **`protocol`** – How commands become bytes.  A 20-byte header plus a
//!   bincode payload, split into several frames when large.
//! - **`command`** – The closed set of replicated commands and how each one
//!   changes the shared state.
//! - **`state`** – The replicated model and the lock-protected handle to it.
//! - **`dispatch`** – Executes received commands and notifies the host.
//! - **`reconnect`** – The bounded retry counter used after a drop.
//! - **`transport`** – The connection-oriented, message-based transport
//!   trait and its loopback, TCP, and mock implementations.

pub mod command;
pub mod dispatch;
pub mod protocol;
pub mod reconnect;
pub mod state;
pub mod transport;

// Re-export the most-used types at the crate root so callers can write
// `mp_core::MultiplayerCommand` instead of the full module path.
pub use command::{CommandError, CommandKind, Execute, MultiplayerCommand, StateChange};
pub use dispatch::{CommandDispatcher, DispatchOutcome, HostNotifier, NoopNotifier};
pub use protocol::{
    CodecConfig, DecodedCommand, DecodingError, DeliveryOptions, EncodingError, MessageCodec,
    MessageProcessor, Reliability, Routing,
};
pub use reconnect::ReconnectPolicy;
pub use state::{PlayerIdentity, PlayerSharedState, SharedState, SharedStateHandle};
pub use transport::{
    ConnectionId, ConnectionStatus, ConnectionStatusHandler, SendMode, StatusEvent, Transport,
    TransportError,
};
