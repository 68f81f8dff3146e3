//! Multiplayer sync client entry point.
//!
//! Wires together the TCP transport, the transport client, command dispatch
//! and the host bridge, then drives the replication session from a Tokio
//! interval timer.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config() + CLI overrides
//!  └─ TransportClient::new(TcpTransport)
//!  └─ ReplicationSession::connect(endpoint | None)
//!  └─ tick loop (every tick_interval_ms)
//!       └─ session.update()
//!            ├─ StateChanged        -> log
//!            ├─ CommandReceived     -> already applied, log at debug
//!            ├─ SendFailure         -> log
//!            └─ ReconnectExhausted  -> exit with an error
//! ```
//!
//! # Roles
//!
//! `--host` starts the client in the authoritative role: it announces the
//! host identity and connects to the configured endpoint, where the
//! `mp-server` of the same machine is expected to listen.  Without `--host`
//! the client joins as a peer under the configured player name.  The server
//! runs on its own transport, so no server delegate is installed here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use mp_client::application::{
    replicate_actions::{ActionReplicator, ReplayGuard},
    session::ReplicationSession,
};
use mp_client::infrastructure::{
    host_bridge::LoggingNotifier,
    network::{ClientEvent, TransportClient},
    storage::config::load_config,
};
use mp_core::transport::tcp::TcpTransport;
use mp_core::{CommandDispatcher, DeliveryOptions, SharedStateHandle};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multiplayer sync client.
#[derive(Debug, Parser)]
#[command(
    name = "mp-client",
    about = "Replicates shared state and actions with a multiplayer sync server",
    version
)]
struct Cli {
    /// Path to the TOML config file.  Defaults to the platform config directory.
    #[arg(long, env = "MP_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Server endpoint, overriding `[network] endpoint`.
    #[arg(long, env = "MP_ENDPOINT")]
    endpoint: Option<SocketAddr>,

    /// Player name announced when joining, overriding `[player] name`.
    #[arg(long, env = "MP_PLAYER_NAME")]
    name: Option<String>,

    /// Take the authoritative host role instead of joining as a peer.
    #[arg(long)]
    host: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("failed to load client config")?;
    if let Some(endpoint) = cli.endpoint {
        config.network.endpoint = endpoint;
    }
    if let Some(name) = cli.name {
        config.player.name = name;
    }

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.session.log_level)),
        )
        .init();

    let run_id = Uuid::new_v4();
    info!("Multiplayer sync client starting (run {run_id})");

    // ── Session wiring ────────────────────────────────────────────────────────
    let transport = TcpTransport::new(config.connect_timeout());
    let (client, events) = TransportClient::new(Box::new(transport), config.client_settings());

    let notifier = Arc::new(LoggingNotifier::new());
    let dispatcher = CommandDispatcher::new(SharedStateHandle::default(), notifier.clone());
    let replicator = ActionReplicator::new(ReplayGuard::new(), DeliveryOptions::default());
    let mut session = ReplicationSession::new(client, events, dispatcher, replicator);

    let endpoint = if cli.host {
        None
    } else {
        Some(config.network.endpoint)
    };
    session
        .connect(endpoint)
        .context("failed to start the connection")?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    // ── Tick loop ─────────────────────────────────────────────────────────────
    let mut interval = tokio::time::interval(config.tick_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut gave_up = None;

    while running.load(Ordering::Relaxed) {
        interval.tick().await;

        for event in session.update() {
            match event {
                ClientEvent::StateChanged(state) => info!("connection state: {state:?}"),
                ClientEvent::CommandReceived { source, command, .. } => {
                    debug!("applied {:?} from {source}", command.kind())
                }
                ClientEvent::SendFailure {
                    command,
                    frame_index,
                    error,
                } => warn!(
                    "frame {frame_index} of {:?} was not sent: {error}",
                    command.kind()
                ),
                ClientEvent::ReconnectScheduled { attempt } => {
                    info!("reconnecting (attempt {attempt})")
                }
                ClientEvent::ReconnectExhausted { attempts } => {
                    error!("connection lost for good after {attempts} reconnect attempts");
                    gave_up = Some(attempts);
                }
            }
        }

        if gave_up.is_some() {
            break;
        }
    }

    session.client_mut().disconnect();
    info!(
        "Multiplayer sync client stopped ({} state refreshes, {} players known)",
        notifier.refreshes(),
        session.shared_state().read().players.len()
    );

    match gave_up {
        Some(attempts) => anyhow::bail!("gave up after {attempts} reconnect attempts"),
        None => Ok(()),
    }
}
