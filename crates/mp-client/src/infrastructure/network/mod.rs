//! Transport client: the connection state machine of one participant.
//!
//! ```text
//!              connect()                 Connected event
//! Disconnected ─────────► Connecting ───────────────────► Connected
//!      ▲                      │   (identity handshake sent)    │
//!      │                      │ ClosedByPeer /                 │ ClosedByPeer /
//!      │                      │ ProblemDetectedLocally         │ ProblemDetectedLocally
//!      └──────────────────────┴────────────────────────────────┘
//!               (policy allows) ──► new connect ──► Connecting
//! ```
//!
//! # Where do callbacks run? (for beginners)
//!
//! The transport never calls us from another thread.  It queues status
//! changes, and [`TransportClient::connect`] and [`TransportClient::tick`]
//! pump that queue, feeding each event to
//! [`ConnectionStatusHandler::on_status_changed`] inline.  Everything in this
//! module therefore runs on the host's update thread.
//!
//! # Roles
//!
//! A client created with `connect(None)` takes the authoritative host role:
//! it announces the host identity and connects to the configured local
//! endpoint (the local server, embedded or a separate `mp-server`).  `connect(Some(addr))`
//! takes the peer role with the configured player name.  The role belongs to
//! the instance, so several clients in one process never share it.

use std::net::SocketAddr;

use mp_core::protocol::handshake::{self, HandshakeError, DEFAULT_PEER_IDENTITY, HOST_IDENTITY};
use mp_core::{
    CodecConfig, ConnectionId, ConnectionStatus, ConnectionStatusHandler, DeliveryOptions,
    EncodingError, MessageCodec, MessageProcessor, MultiplayerCommand, PlayerIdentity,
    ReconnectPolicy, SendMode, StatusEvent, Transport, TransportError,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Errors surfaced to callers of [`TransportClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// `send` was called while the client is not connected.
    #[error("not connected (state: {state:?})")]
    NotConnected { state: ConnectionState },

    /// `connect` was called while a connection is active or in progress.
    #[error("already {state:?}")]
    AlreadyConnected { state: ConnectionState },

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid identity: {0}")]
    Handshake(#[from] HandshakeError),
}

/// Lifecycle state of the client's logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Which side of the session this client plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRole {
    /// The authoritative participant, announced as [`HOST_IDENTITY`].
    Host,
    /// Any other participant.
    Peer(PlayerIdentity),
}

impl ClientRole {
    /// No endpoint means "host the session"; an endpoint means "join it".
    pub fn for_endpoint(endpoint: Option<SocketAddr>, peer_name: &str) -> Self {
        match endpoint {
            None => ClientRole::Host,
            Some(_) => ClientRole::Peer(PlayerIdentity::new(peer_name)),
        }
    }

    pub fn identity(&self) -> PlayerIdentity {
        match self {
            ClientRole::Host => PlayerIdentity::new(HOST_IDENTITY),
            ClientRole::Peer(identity) => identity.clone(),
        }
    }
}

/// Notifications raised by the client for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    CommandReceived {
        source: ConnectionId,
        command: MultiplayerCommand,
        options: DeliveryOptions,
    },
    /// One frame of a command could not be handed to the transport.
    SendFailure {
        command: MultiplayerCommand,
        frame_index: usize,
        error: TransportError,
    },
    ReconnectScheduled { attempt: u32 },
    /// The retry bound was reached.  Raised once; the client stays disconnected.
    ReconnectExhausted { attempts: u32 },
}

/// Tunables of a [`TransportClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Endpoint used by the host role, and as the fallback for `connect(None)`.
    pub local_endpoint: SocketAddr,
    /// Identity announced by the peer role.
    pub peer_name: String,
    pub max_reconnect_attempts: u32,
    /// Upper bound on messages drained per tick.
    pub receive_batch_size: usize,
    pub codec: CodecConfig,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            local_endpoint: SocketAddr::from(([127, 0, 0, 1], 8081)),
            peer_name: DEFAULT_PEER_IDENTITY.to_string(),
            max_reconnect_attempts: mp_core::reconnect::DEFAULT_MAX_ATTEMPTS,
            receive_batch_size: 20,
            codec: CodecConfig::default(),
        }
    }
}

/// Handler for status events on connections this client does not own.
pub type ServerDelegate = Box<dyn ConnectionStatusHandler + Send>;

/// Connection state machine, handshake, reconnect, and per-tick traffic pump.
pub struct TransportClient {
    transport: Box<dyn Transport>,
    settings: ClientSettings,
    role: ClientRole,
    endpoint: SocketAddr,
    state: ConnectionState,
    connection: Option<ConnectionId>,
    policy: ReconnectPolicy,
    exhausted: bool,
    encoder: MessageCodec,
    processor: MessageProcessor,
    server_delegate: Option<ServerDelegate>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl TransportClient {
    /// Creates a disconnected client and the receiver for its events.
    pub fn new(
        transport: Box<dyn Transport>,
        settings: ClientSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self {
            transport,
            role: ClientRole::Peer(PlayerIdentity::new(settings.peer_name.as_str())),
            endpoint: settings.local_endpoint,
            state: ConnectionState::Disconnected,
            connection: None,
            policy: ReconnectPolicy::new(settings.max_reconnect_attempts),
            exhausted: false,
            encoder: MessageCodec::new(settings.codec),
            processor: MessageProcessor::new(settings.codec),
            server_delegate: None,
            events: tx,
            settings,
        };
        (client, rx)
    }

    /// Routes status events for foreign connections to `delegate`.
    ///
    /// Only needed when a host embeds the server and lets it share this
    /// client's transport: the server's inbound connections then surface in
    /// the client's `run_callbacks()`.  The `mp-client` binary talks to a
    /// separate `mp-server`, so it never installs a delegate, and foreign
    /// events are logged and ignored.
    pub fn set_server_delegate(&mut self, delegate: ServerDelegate) {
        self.server_delegate = Some(delegate);
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Starts a connection.
    ///
    /// `None` selects the host role and the configured local endpoint;
    /// `Some(addr)` selects the peer role and connects to `addr`.  Transport
    /// callbacks are pumped once before returning.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AlreadyConnected`] unless the client is `Disconnected`.
    /// - [`ClientError::Handshake`] if the identity cannot be announced.
    /// - [`ClientError::Transport`] if the transport refuses to allocate a
    ///   connection at all.
    pub fn connect(&mut self, endpoint: Option<SocketAddr>) -> Result<(), ClientError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ClientError::AlreadyConnected { state: self.state });
        }

        let role = ClientRole::for_endpoint(endpoint, &self.settings.peer_name);
        let identity = role.identity();
        handshake::validate_identity(identity.as_str())?;

        self.role = role;
        self.endpoint = endpoint.unwrap_or(self.settings.local_endpoint);
        self.policy.reset();
        self.exhausted = false;

        info!("connecting to {} as {identity}", self.endpoint);
        self.set_state(ConnectionState::Connecting);
        match self.transport.connect(self.endpoint) {
            Ok(id) => {
                info!("connection {id} assigned");
                self.connection = Some(id);
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        }

        self.pump_callbacks();
        Ok(())
    }

    /// Pumps transport events, then drains up to one batch of inbound
    /// messages if connected.  Never blocks.
    pub fn tick(&mut self) {
        self.pump_callbacks();

        if self.state != ConnectionState::Connected {
            return;
        }
        let Some(conn) = self.connection else {
            return;
        };
        self.drain_inbound(conn, self.settings.receive_batch_size);
    }

    /// Encodes `command` and hands every frame to the transport.
    ///
    /// A frame the transport rejects is logged and reported as
    /// [`ClientEvent::SendFailure`]; the connection state is not changed.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] if the state is not `Connected`.  No
    ///   traffic is produced.
    /// - [`ClientError::Encoding`] if the command cannot be encoded.
    pub fn send(
        &mut self,
        command: &MultiplayerCommand,
        options: DeliveryOptions,
    ) -> Result<(), ClientError> {
        let conn = match (self.state, self.connection) {
            (ConnectionState::Connected, Some(conn)) => conn,
            _ => return Err(ClientError::NotConnected { state: self.state }),
        };

        let frames = self.encoder.encode(command, options)?;
        let mode = options.reliability.send_mode();
        for (index, frame) in frames.iter().enumerate() {
            if let Err(e) = self.transport.send(conn, frame, mode) {
                error!(
                    "failed to send frame {}/{} of {:?} on {conn}: {e}",
                    index + 1,
                    frames.len(),
                    command.kind()
                );
                self.emit(ClientEvent::SendFailure {
                    command: command.clone(),
                    frame_index: index,
                    error: e,
                });
            }
        }
        Ok(())
    }

    /// Closes the active connection without reconnecting.
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            info!("closing connection {conn}");
            self.transport.close(conn);
            self.processor.release(conn);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn role(&self) -> &ClientRole {
        &self.role
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Reconnect attempts made since the last successful connection.
    pub fn reconnect_attempts(&self) -> u32 {
        self.policy.attempts()
    }

    /// `true` once the retry bound was reached; cleared by `connect()`.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Handles every status change queued since the previous pump.  Events
    /// raised while handling (for example by a reconnect) wait for the next one.
    fn pump_callbacks(&mut self) {
        for event in self.transport.run_callbacks() {
            self.on_status_changed(&event);
        }
    }

    fn emit(&self, event: ClientEvent) {
        // The receiver may be gone during shutdown; nothing to do then.
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("state {:?} -> {state:?}", self.state);
            self.state = state;
            self.emit(ClientEvent::StateChanged(state));
        }
    }

    fn on_connected(&mut self, conn: ConnectionId) {
        if self.state == ConnectionState::Connected {
            debug!("duplicate Connected event for {conn}");
            return;
        }

        let identity = self.role.identity();
        let sent = handshake::encode_identity(&identity)
            .map_err(ClientError::from)
            .and_then(|payload| {
                self.transport
                    .send(conn, &payload, SendMode::Reliable)
                    .map_err(ClientError::from)
            });
        if let Err(e) = sent {
            warn!("handshake on {conn} failed: {e}");
            self.on_dropped(conn, ConnectionStatus::ProblemDetectedLocally);
            return;
        }

        info!("sent identity {identity} on {conn}");
        self.policy.reset();
        self.set_state(ConnectionState::Connected);
    }

    /// Decodes up to `max` queued messages of `conn` into `CommandReceived`
    /// events.  Returns how many messages were taken from the transport.
    fn drain_inbound(&mut self, conn: ConnectionId, max: usize) -> usize {
        let frames = self.transport.receive(conn, max);
        let taken = frames.len();
        for frame in frames {
            if let Some(decoded) = self.processor.process(conn, &frame) {
                self.emit(ClientEvent::CommandReceived {
                    source: conn,
                    command: decoded.command,
                    options: decoded.options,
                });
            }
        }
        taken
    }

    fn on_dropped(&mut self, conn: ConnectionId, status: ConnectionStatus) {
        info!("connection {conn} ended: {status:?}");
        // Whatever the server sent before the close still counts; closing
        // the link discards its inbox.
        if self.state == ConnectionState::Connected && self.connection == Some(conn) {
            let drained = self.drain_inbound(conn, usize::MAX);
            if drained > 0 {
                debug!("drained {drained} messages from {conn} before closing");
            }
        }
        self.transport.close(conn);
        self.processor.release(conn);
        self.connection = None;
        self.set_state(ConnectionState::Disconnected);
        self.reconnect();
    }

    /// Issues reconnect attempts until one is accepted by the transport or
    /// the policy refuses.  A synchronous connect failure consumes its attempt.
    fn reconnect(&mut self) {
        loop {
            if !self.policy.can_retry() {
                if !self.exhausted {
                    self.exhausted = true;
                    warn!(
                        "giving up on {} after {} reconnect attempts",
                        self.endpoint,
                        self.policy.attempts()
                    );
                    self.emit(ClientEvent::ReconnectExhausted {
                        attempts: self.policy.attempts(),
                    });
                }
                return;
            }

            let attempt = self.policy.on_attempt();
            info!(
                "reconnect attempt {attempt}/{} to {}",
                self.policy.max_attempts(),
                self.endpoint
            );
            self.emit(ClientEvent::ReconnectScheduled { attempt });
            self.set_state(ConnectionState::Connecting);

            match self.transport.connect(self.endpoint) {
                Ok(id) => {
                    info!("connection {id} assigned");
                    self.connection = Some(id);
                    return;
                }
                Err(e) => {
                    warn!("reconnect attempt {attempt} failed immediately: {e}");
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }
    }
}

impl ConnectionStatusHandler for TransportClient {
    fn on_status_changed(&mut self, event: &StatusEvent) {
        if self.connection != Some(event.connection) {
            match self.server_delegate.as_mut() {
                Some(delegate) => delegate.on_status_changed(event),
                None => debug!(
                    "ignoring {:?} for foreign connection {}",
                    event.status, event.connection
                ),
            }
            return;
        }

        match event.status {
            ConnectionStatus::Connected => self.on_connected(event.connection),
            ConnectionStatus::ClosedByPeer | ConnectionStatus::ProblemDetectedLocally => {
                self.on_dropped(event.connection, event.status)
            }
            ConnectionStatus::Connecting | ConnectionStatus::None => {
                debug!("connection {} is {:?}", event.connection, event.status)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
