//! End-to-end replication: real clients from `mp-client` talking to the
//! server through the loopback network and through TCP on localhost.
//!
//! # Scenario
//!
//! ```text
//! host client ("server") ──┐
//!                          ├──► MultiplayerServer ──► relays to everyone else
//! peer client ("Bob")   ───┘
//! ```
//!
//! Bob permits `item1` for himself; after a few ticks the server and the host
//! must both see `Bob.item1 == true`.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use mp_client::application::{
    replicate_actions::{ActionReplicator, HostAction, ReplayGuard},
    session::{ReplicateOutcome, ReplicationSession},
};
use mp_client::infrastructure::network::{ClientSettings, ConnectionState, TransportClient};
use mp_core::transport::{loopback::LoopbackNetwork, tcp::TcpTransport};
use mp_core::{
    CommandDispatcher, DeliveryOptions, MultiplayerCommand, NoopNotifier, PlayerIdentity,
    SharedStateHandle, Transport,
};
use mp_server::infrastructure::network::{MultiplayerServer, ServerEvent, ServerSettings};
use tokio::sync::mpsc;

fn session(transport: Box<dyn Transport>, endpoint: SocketAddr, name: &str) -> ReplicationSession {
    let settings = ClientSettings {
        local_endpoint: endpoint,
        peer_name: name.to_string(),
        ..ClientSettings::default()
    };
    let (client, events) = TransportClient::new(transport, settings);
    let dispatcher = CommandDispatcher::new(SharedStateHandle::default(), Arc::new(NoopNotifier));
    let replicator = ActionReplicator::new(ReplayGuard::new(), DeliveryOptions::default());
    ReplicationSession::new(client, events, dispatcher, replicator)
}

fn start_server(
    transport: Box<dyn Transport>,
    bind_addr: SocketAddr,
) -> (MultiplayerServer, mpsc::UnboundedReceiver<ServerEvent>) {
    let settings = ServerSettings {
        bind_addr,
        ..ServerSettings::default()
    };
    let dispatcher = CommandDispatcher::new(SharedStateHandle::default(), Arc::new(NoopNotifier));
    let (mut server, events) = MultiplayerServer::new(transport, settings, dispatcher);
    server.start().unwrap();
    (server, events)
}

/// Alternates server and client ticks.
fn pump(server: &mut MultiplayerServer, sessions: &mut [&mut ReplicationSession], rounds: usize) {
    for _ in 0..rounds {
        server.tick();
        for session in sessions.iter_mut() {
            session.update();
        }
    }
}

fn permission(session: &ReplicationSession, player: &str, consumable: &str) -> Option<bool> {
    session
        .shared_state()
        .read()
        .player(player)
        .and_then(|p| p.permission(consumable))
}

fn bob_permits_item1() -> HostAction {
    HostAction::ConsumablePermitted {
        proper_name: "Bob".into(),
        consumable_id: "item1".into(),
        is_allowed: true,
    }
}

// ── Loopback ──────────────────────────────────────────────────────────────────

#[test]
fn test_loopback_permission_reaches_server_and_host() {
    // Arrange
    let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
    let net = LoopbackNetwork::new();
    let (mut server, _events) = start_server(Box::new(net.endpoint()), addr);
    let mut host = session(Box::new(net.endpoint()), addr, "unused");
    let mut bob = session(Box::new(net.endpoint()), addr, "Bob");

    host.connect(None).unwrap();
    bob.connect(Some(addr)).unwrap();
    pump(&mut server, &mut [&mut host, &mut bob], 5);
    assert_eq!(host.client().state(), ConnectionState::Connected);
    assert_eq!(bob.client().state(), ConnectionState::Connected);

    // Act
    let outcome = bob.replicate(bob_permits_item1()).unwrap();
    pump(&mut server, &mut [&mut host, &mut bob], 5);

    // Assert
    assert_eq!(outcome, ReplicateOutcome::Sent);
    assert_eq!(
        server
            .shared_state()
            .read()
            .player("Bob")
            .and_then(|p| p.permission("item1")),
        Some(true)
    );
    assert_eq!(permission(&host, "Bob", "item1"), Some(true));
}

#[test]
fn test_loopback_roster_converges_on_every_participant() {
    let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
    let net = LoopbackNetwork::new();
    let (mut server, _events) = start_server(Box::new(net.endpoint()), addr);
    let mut host = session(Box::new(net.endpoint()), addr, "unused");
    let mut bob = session(Box::new(net.endpoint()), addr, "Bob");

    host.connect(None).unwrap();
    bob.connect(Some(addr)).unwrap();
    pump(&mut server, &mut [&mut host, &mut bob], 5);

    let expected = vec![PlayerIdentity::new("Bob"), PlayerIdentity::new("server")];
    let mut players = server.players();
    players.sort();
    assert_eq!(players, expected);
    for participant in [&host, &bob] {
        let known: Vec<_> = participant
            .shared_state()
            .read()
            .players
            .keys()
            .cloned()
            .collect();
        assert_eq!(known, expected);
    }
}

#[test]
fn test_late_joiner_receives_existing_permissions() {
    // Arrange: Bob sets a permission before Meep arrives.
    let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
    let net = LoopbackNetwork::new();
    let (mut server, _events) = start_server(Box::new(net.endpoint()), addr);
    let mut bob = session(Box::new(net.endpoint()), addr, "Bob");
    bob.connect(Some(addr)).unwrap();
    pump(&mut server, &mut [&mut bob], 5);
    bob.replicate(bob_permits_item1()).unwrap();
    bob.replicate(HostAction::DefaultForbiddenChanged {
        tags: vec!["Meat".into()],
    })
    .unwrap();
    pump(&mut server, &mut [&mut bob], 5);

    // Act
    let mut meep = session(Box::new(net.endpoint()), addr, "Meep");
    meep.connect(Some(addr)).unwrap();
    pump(&mut server, &mut [&mut bob, &mut meep], 5);

    // Assert
    assert_eq!(permission(&meep, "Bob", "item1"), Some(true));
    assert_eq!(permission(&meep, "Meep", "Meat"), Some(false));
    assert!(meep.shared_state().read().default_forbidden.contains("Meat"));
}

#[test]
fn test_departure_is_replicated_to_remaining_players() {
    // Arrange
    let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
    let net = LoopbackNetwork::new();
    let (mut server, mut events) = start_server(Box::new(net.endpoint()), addr);
    let mut host = session(Box::new(net.endpoint()), addr, "unused");
    let mut bob = session(Box::new(net.endpoint()), addr, "Bob");
    host.connect(None).unwrap();
    bob.connect(Some(addr)).unwrap();
    pump(&mut server, &mut [&mut host, &mut bob], 5);

    // Act
    bob.client_mut().disconnect();
    pump(&mut server, &mut [&mut host], 5);

    // Assert
    assert!(host.shared_state().read().player("Bob").is_none());
    assert_eq!(server.players(), vec![PlayerIdentity::new("server")]);
    let mut left = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ServerEvent::PlayerLeft { identity, .. } = event {
            left.push(identity);
        }
    }
    assert_eq!(left, vec![PlayerIdentity::new("Bob")]);
}

#[test]
fn test_command_sent_right_before_disconnect_is_not_lost() {
    // Arrange
    let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
    let net = LoopbackNetwork::new();
    let (mut server, mut events) = start_server(Box::new(net.endpoint()), addr);
    let mut host = session(Box::new(net.endpoint()), addr, "unused");
    let mut bob = session(Box::new(net.endpoint()), addr, "Bob");
    host.connect(None).unwrap();
    bob.connect(Some(addr)).unwrap();
    pump(&mut server, &mut [&mut host, &mut bob], 5);
    while events.try_recv().is_ok() {}

    // Act – Bob permits something for the host player and leaves at once
    bob.replicate(HostAction::ConsumablePermitted {
        proper_name: "server".into(),
        consumable_id: "item1".into(),
        is_allowed: true,
    })
    .unwrap();
    bob.client_mut().disconnect();
    server.tick();

    // Assert
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(
        matches!(
            seen.as_slice(),
            [ServerEvent::CommandReceived { .. }, ServerEvent::PlayerLeft { .. }]
        ),
        "unexpected events: {seen:?}"
    );
    assert_eq!(
        server
            .shared_state()
            .read()
            .player("server")
            .and_then(|p| p.permission("item1")),
        Some(true)
    );
    pump(&mut server, &mut [&mut host], 3);
    assert_eq!(permission(&host, "server", "item1"), Some(true));
    assert!(host.shared_state().read().player("Bob").is_none());
}

#[test]
fn test_second_player_with_same_name_is_turned_away() {
    let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
    let net = LoopbackNetwork::new();
    let (mut server, _events) = start_server(Box::new(net.endpoint()), addr);
    let mut bob = session(Box::new(net.endpoint()), addr, "Bob");
    let mut impostor = session(Box::new(net.endpoint()), addr, "Bob");
    bob.connect(Some(addr)).unwrap();
    pump(&mut server, &mut [&mut bob], 5);

    impostor.connect(Some(addr)).unwrap();
    pump(&mut server, &mut [&mut bob, &mut impostor], 2);

    assert_eq!(server.players(), vec![PlayerIdentity::new("Bob")]);
    assert_eq!(bob.client().state(), ConnectionState::Connected);
    assert!(impostor.client().reconnect_attempts() > 0);
}

// ── TCP ───────────────────────────────────────────────────────────────────────

/// Finds a free localhost port by binding to port 0 and releasing it.
fn free_local_addr() -> SocketAddr {
    let reserved = TcpListener::bind("127.0.0.1:0").unwrap();
    reserved.local_addr().unwrap()
}

#[test]
fn test_tcp_permission_reaches_host() {
    // Arrange
    let addr = free_local_addr();
    let (mut server, _events) = start_server(Box::new(TcpTransport::default()), addr);
    let mut host = session(Box::new(TcpTransport::default()), addr, "unused");
    let mut bob = session(Box::new(TcpTransport::default()), addr, "Bob");
    host.connect(None).unwrap();
    bob.connect(Some(addr)).unwrap();

    for _ in 0..200 {
        pump(&mut server, &mut [&mut host, &mut bob], 1);
        if server.players().len() == 2 && bob.shared_state().read().player("Bob").is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(server.players().len(), 2);

    // Act
    bob.replicate(bob_permits_item1()).unwrap();
    for _ in 0..200 {
        pump(&mut server, &mut [&mut host, &mut bob], 1);
        if permission(&host, "Bob", "item1").is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    // Assert
    assert_eq!(permission(&host, "Bob", "item1"), Some(true));
    assert_eq!(
        server
            .broadcast(
                &MultiplayerCommand::set_default_forbidden(["Berry"]),
                DeliveryOptions::default()
            )
            .unwrap(),
        2
    );
}
