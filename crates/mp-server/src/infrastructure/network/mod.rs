//! MultiplayerServer: the authoritative side of a session.
//!
//! The server owns one listening transport.  Each `tick()` it:
//!
//! 1. pumps transport status events (accepting new connections, tearing
//!    down closed ones),
//! 2. drains a bounded batch of messages from every tracked connection.
//!
//! # Per-connection protocol (for beginners)
//!
//! ```text
//! client                                server
//! ──────                                ──────
//! connect ─────────────────────────────► Connecting -> accept()
//! "Bob" (raw identity bytes) ──────────► registry: Bob identified
//!                                        apply PlayerJoined(Bob)
//!       ◄──────────────────── roster     (default forbidden, players, permissions)
//!                                        relay PlayerJoined(Bob) to the others
//! frames ──────────────────────────────► reassemble, execute unless SkipHost,
//!                                        relay unless OnlyHost
//! close ───────────────────────────────► handle frames still queued,
//!                                        apply + relay PlayerLeft(Bob)
//! ```
//!
//! The server never answers the handshake itself; the roster commands are
//! ordinary framed commands.

use std::net::SocketAddr;

use mp_core::protocol::handshake;
use mp_core::{
    CodecConfig, CommandDispatcher, CommandKind, ConnectionId, ConnectionStatus,
    ConnectionStatusHandler, DecodedCommand, DeliveryOptions, EncodingError, MessageCodec,
    MessageProcessor, MultiplayerCommand, PlayerIdentity, SharedStateHandle, StatusEvent,
    Transport, TransportError,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::application::manage_players::{PeerState, PlayerRegistry, RegistryError};

/// Errors surfaced to callers of [`MultiplayerServer`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: TransportError,
    },

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

/// Notifications raised by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A connection was accepted and waits for its identity.
    PeerConnecting { connection: ConnectionId },
    PlayerJoined {
        connection: ConnectionId,
        identity: PlayerIdentity,
    },
    PlayerLeft {
        connection: ConnectionId,
        identity: PlayerIdentity,
    },
    /// A handshake message was refused.  For a duplicate identity the
    /// connection has also been closed.
    HandshakeRejected {
        connection: ConnectionId,
        reason: String,
    },
    CommandReceived {
        source: ConnectionId,
        command: MultiplayerCommand,
        options: DeliveryOptions,
    },
    SendFailure {
        connection: ConnectionId,
        kind: CommandKind,
        error: TransportError,
    },
}

/// Tunables of a [`MultiplayerServer`].
#[derive(Debug, Clone, Copy)]
pub struct ServerSettings {
    pub bind_addr: SocketAddr,
    /// Upper bound on messages drained per connection per tick.
    pub receive_batch_size: usize,
    pub codec: CodecConfig,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            receive_batch_size: 20,
            codec: CodecConfig::default(),
        }
    }
}

pub struct MultiplayerServer {
    transport: Box<dyn Transport>,
    settings: ServerSettings,
    registry: PlayerRegistry,
    dispatcher: CommandDispatcher,
    encoder: MessageCodec,
    processor: MessageProcessor,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl MultiplayerServer {
    /// Creates a server that is not yet listening, and the receiver for its
    /// events.
    pub fn new(
        transport: Box<dyn Transport>,
        settings: ServerSettings,
        dispatcher: CommandDispatcher,
    ) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let server = Self {
            transport,
            registry: PlayerRegistry::new(),
            dispatcher,
            encoder: MessageCodec::new(settings.codec),
            processor: MessageProcessor::new(settings.codec),
            events: tx,
            settings,
        };
        (server, rx)
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Starts listening on the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Listen`] if the transport cannot bind.
    pub fn start(&mut self) -> Result<(), ServerError> {
        let addr = self.settings.bind_addr;
        self.transport
            .listen(addr)
            .map_err(|source| ServerError::Listen { addr, source })?;
        info!("multiplayer server listening on {addr}");
        Ok(())
    }

    /// Pumps status events, then handles up to one batch of messages per
    /// connection.  Never blocks.
    pub fn tick(&mut self) {
        for event in self.transport.run_callbacks() {
            self.on_status_changed(&event);
        }

        for conn in self.registry.connections() {
            self.handle_inbound(conn, self.settings.receive_batch_size);
        }
    }

    /// Sends a host-originated command to every identified peer.  The host
    /// is expected to have applied the command already.
    ///
    /// Returns the number of peers every frame was handed to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Encoding`] if the command cannot be encoded.
    pub fn broadcast(
        &mut self,
        command: &MultiplayerCommand,
        options: DeliveryOptions,
    ) -> Result<usize, ServerError> {
        let targets = self.registry.identified_except(None);
        Ok(self.deliver(&targets, command, options)?)
    }

    pub fn players(&self) -> Vec<PlayerIdentity> {
        self.registry.players()
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn shared_state(&self) -> &SharedStateHandle {
        self.dispatcher.state()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.settings.bind_addr
    }

    /// Frames dropped as undecodable since start.
    pub fn dropped_frames(&self) -> u64 {
        self.processor.dropped_frames()
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn emit(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }

    /// Handles up to `max` queued messages of `conn` according to its
    /// handshake state.  Returns how many messages were taken.
    fn handle_inbound(&mut self, conn: ConnectionId, max: usize) -> usize {
        let messages = self.transport.receive(conn, max);
        let taken = messages.len();
        for message in messages {
            match self.registry.state(conn) {
                Some(PeerState::AwaitingIdentity) => self.on_handshake(conn, &message),
                Some(PeerState::Identified(_)) => self.on_frame(conn, &message),
                // Closed while handling an earlier message of the batch.
                None => break,
            }
        }
        taken
    }

    fn on_handshake(&mut self, conn: ConnectionId, bytes: &[u8]) {
        let identity = match handshake::decode_identity(bytes) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("ignoring invalid handshake on {conn}: {e}");
                self.emit(ServerEvent::HandshakeRejected {
                    connection: conn,
                    reason: e.to_string(),
                });
                return;
            }
        };

        match self.registry.identify(conn, identity.clone()) {
            Ok(()) => {}
            Err(e @ RegistryError::DuplicateIdentity { .. }) => {
                warn!("closing {conn}: {e}");
                self.drop_connection(conn);
                self.emit(ServerEvent::HandshakeRejected {
                    connection: conn,
                    reason: e.to_string(),
                });
                return;
            }
            Err(e) => {
                warn!("handshake on {conn} ignored: {e}");
                return;
            }
        }

        info!("player {identity} identified on {conn}");
        let joined = MultiplayerCommand::player_joined(identity.clone());
        self.dispatcher.dispatch(conn, &joined);
        self.sync_newcomer(conn);

        let others = self.registry.identified_except(Some(conn));
        self.relay(&others, &joined, DeliveryOptions::default());
        self.emit(ServerEvent::PlayerJoined {
            connection: conn,
            identity,
        });
    }

    /// Sends the whole shared state to a newly identified peer as ordinary
    /// commands: default forbidden tags first, so that the roster entries
    /// pick them up, then each player and its explicit permissions.
    fn sync_newcomer(&mut self, conn: ConnectionId) {
        let snapshot = self.dispatcher.state().snapshot();

        let mut roster = vec![MultiplayerCommand::set_default_forbidden(
            snapshot.default_forbidden.iter().cloned(),
        )];
        for (player, state) in &snapshot.players {
            roster.push(MultiplayerCommand::player_joined(player.clone()));
            for (consumable_id, is_allowed) in &state.consumables {
                roster.push(MultiplayerCommand::permit_consumable(
                    player.as_str(),
                    consumable_id.as_str(),
                    *is_allowed,
                ));
            }
        }

        debug!("sending {} roster commands to {conn}", roster.len());
        for command in &roster {
            self.relay(&[conn], command, DeliveryOptions::default());
        }
    }

    fn on_frame(&mut self, conn: ConnectionId, frame: &[u8]) {
        let Some(DecodedCommand {
            command, options, ..
        }) = self.processor.process(conn, frame)
        else {
            return;
        };

        if options.routing.executes_on_host() {
            self.dispatcher.dispatch(conn, &command);
        }
        if options.routing.relays_to_peers() {
            let targets = self.registry.identified_except(Some(conn));
            self.relay(&targets, &command, options);
        }
        self.emit(ServerEvent::CommandReceived {
            source: conn,
            command,
            options,
        });
    }

    fn on_closed(&mut self, conn: ConnectionId, status: ConnectionStatus) {
        // Everything the peer sent before closing is applied and relayed
        // first; dropping the connection discards its inbox.
        let drained = self.handle_inbound(conn, usize::MAX);
        if drained > 0 {
            debug!("handled {drained} messages from {conn} before closing");
        }

        let previous = self.registry.state(conn).cloned();
        self.drop_connection(conn);

        match previous {
            Some(PeerState::Identified(identity)) => {
                info!("player {identity} left ({status:?} on {conn})");
                let left = MultiplayerCommand::player_left(identity.clone());
                self.dispatcher.dispatch(conn, &left);
                let targets = self.registry.identified_except(None);
                self.relay(&targets, &left, DeliveryOptions::default());
                self.emit(ServerEvent::PlayerLeft {
                    connection: conn,
                    identity,
                });
            }
            Some(PeerState::AwaitingIdentity) => {
                info!("connection {conn} ended before identifying: {status:?}")
            }
            None => debug!("{status:?} for untracked connection {conn}"),
        }
    }

    fn drop_connection(&mut self, conn: ConnectionId) {
        self.transport.close(conn);
        self.processor.release(conn);
        self.registry.remove(conn);
    }

    /// [`Self::deliver`] for server-originated traffic, where an encoding
    /// failure can only be logged.
    fn relay(
        &mut self,
        targets: &[ConnectionId],
        command: &MultiplayerCommand,
        options: DeliveryOptions,
    ) {
        if let Err(e) = self.deliver(targets, command, options) {
            error!("could not relay {:?}: {e}", command.kind());
        }
    }

    /// Encodes once and sends every frame to every target.  Returns the
    /// number of targets that accepted all frames.
    fn deliver(
        &mut self,
        targets: &[ConnectionId],
        command: &MultiplayerCommand,
        options: DeliveryOptions,
    ) -> Result<usize, EncodingError> {
        if targets.is_empty() {
            return Ok(0);
        }
        let frames = self.encoder.encode(command, options)?;
        let mode = options.reliability.send_mode();

        let mut delivered = 0;
        for &conn in targets {
            let mut failed = None;
            for frame in &frames {
                if let Err(e) = self.transport.send(conn, frame, mode) {
                    failed = Some(e);
                    break;
                }
            }
            match failed {
                None => delivered += 1,
                Some(e) => {
                    error!("failed to send {:?} to {conn}: {e}", command.kind());
                    self.emit(ServerEvent::SendFailure {
                        connection: conn,
                        kind: command.kind(),
                        error: e,
                    });
                }
            }
        }
        Ok(delivered)
    }
}

impl ConnectionStatusHandler for MultiplayerServer {
    fn on_status_changed(&mut self, event: &StatusEvent) {
        let conn = event.connection;
        match event.status {
            ConnectionStatus::Connecting => match self.transport.accept(conn) {
                Ok(()) => {
                    info!("accepted connection {conn}");
                    self.registry.register_pending(conn);
                    self.emit(ServerEvent::PeerConnecting { connection: conn });
                }
                Err(e) => warn!("could not accept {conn}: {e}"),
            },
            ConnectionStatus::Connected => debug!("connection {conn} established"),
            ConnectionStatus::ClosedByPeer | ConnectionStatus::ProblemDetectedLocally => {
                self.on_closed(conn, event.status)
            }
            ConnectionStatus::None => debug!("connection {conn} has no status"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
