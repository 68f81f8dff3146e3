//! Multiplayer sync server entry point.
//!
//! ```text
//! main()
//!  └─ load_config() + CLI overrides
//!  └─ MultiplayerServer::new(TcpTransport).start()
//!  └─ tick loop (every tick_interval_ms) until Ctrl-C
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use mp_core::transport::tcp::TcpTransport;
use mp_core::{CommandDispatcher, NoopNotifier, SharedStateHandle};
use mp_server::infrastructure::network::{MultiplayerServer, ServerEvent};
use mp_server::infrastructure::storage::config::load_config;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multiplayer sync server.
#[derive(Debug, Parser)]
#[command(
    name = "mp-server",
    about = "Authoritative server that relays replicated commands between players",
    version
)]
struct Cli {
    /// Path to the TOML config file.  Defaults to the platform config directory.
    #[arg(long, env = "MP_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to listen on, overriding `[network] bind_address`.
    #[arg(long, env = "MP_BIND")]
    bind: Option<IpAddr>,

    /// Port to listen on, overriding `[network] port`.
    #[arg(long, env = "MP_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("failed to load server config")?;
    if let Some(bind) = cli.bind {
        config.network.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    info!("Multiplayer sync server starting (run {})", Uuid::new_v4());

    let dispatcher = CommandDispatcher::new(SharedStateHandle::default(), Arc::new(NoopNotifier));
    let (mut server, mut events) = MultiplayerServer::new(
        Box::new(TcpTransport::default()),
        config.server_settings(),
        dispatcher,
    );
    server
        .start()
        .with_context(|| format!("failed to listen on {}", config.bind_addr()))?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("Multiplayer sync server ready.  Press Ctrl-C to exit.");

    let mut interval = tokio::time::interval(config.tick_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    while running.load(Ordering::Relaxed) {
        interval.tick().await;
        server.tick();

        while let Ok(event) = events.try_recv() {
            match event {
                ServerEvent::PlayerJoined { identity, .. } => {
                    info!("{identity} joined ({} players)", server.players().len())
                }
                ServerEvent::PlayerLeft { identity, .. } => {
                    info!("{identity} left ({} players)", server.players().len())
                }
                ServerEvent::HandshakeRejected { connection, reason } => {
                    warn!("rejected handshake on {connection}: {reason}")
                }
                ServerEvent::SendFailure {
                    connection, kind, ..
                } => warn!("{kind:?} not delivered to {connection}"),
                other => debug!("{other:?}"),
            }
        }
    }

    info!(
        "Multiplayer sync server stopped ({} frames dropped)",
        server.dropped_frames()
    );
    Ok(())
}
