//! Replication sessions over real transports: the in-process loopback
//! network and TCP on localhost.  The far side is driven by hand so the
//! tests exercise only the client crate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mp_client::application::{
    replicate_actions::{ActionReplicator, ReplayGuard},
    session::ReplicationSession,
};
use mp_client::infrastructure::network::{ClientEvent, ClientSettings, ConnectionState, TransportClient};
use mp_core::protocol::handshake;
use mp_core::transport::{loopback::LoopbackNetwork, tcp::TcpTransport};
use mp_core::{
    CommandDispatcher, ConnectionId, ConnectionStatus, DeliveryOptions, MessageCodec,
    MultiplayerCommand, NoopNotifier, PlayerIdentity, SendMode, SharedStateHandle, Transport,
};

fn listen_addr() -> SocketAddr {
    "127.0.0.1:8081".parse().unwrap()
}

fn session_over(transport: Box<dyn Transport>, endpoint: SocketAddr) -> ReplicationSession {
    let settings = ClientSettings {
        local_endpoint: endpoint,
        peer_name: "Bob".to_string(),
        ..ClientSettings::default()
    };
    let (client, events) = TransportClient::new(transport, settings);
    let dispatcher = CommandDispatcher::new(SharedStateHandle::default(), Arc::new(NoopNotifier));
    let replicator = ActionReplicator::new(ReplayGuard::new(), DeliveryOptions::default());
    ReplicationSession::new(client, events, dispatcher, replicator)
}

/// Accepts the first pending connection on `server` and returns its handle.
fn accept_pending(server: &mut dyn Transport) -> ConnectionId {
    let pending = server
        .run_callbacks()
        .into_iter()
        .find(|e| e.status == ConnectionStatus::Connecting)
        .expect("a connection must be pending");
    server.accept(pending.connection).unwrap();
    pending.connection
}

fn send_command(server: &mut dyn Transport, conn: ConnectionId, cmd: &MultiplayerCommand) {
    let frames = MessageCodec::default()
        .encode(cmd, DeliveryOptions::default())
        .unwrap();
    for frame in frames {
        server.send(conn, &frame, SendMode::Reliable).unwrap();
    }
}

#[test]
fn test_loopback_session_announces_identity_and_applies_commands() {
    // Arrange
    let net = LoopbackNetwork::new();
    let mut server = net.endpoint();
    server.listen(listen_addr()).unwrap();
    let mut session = session_over(Box::new(net.endpoint()), listen_addr());

    // Act: connect, accept, let the client observe Connected.
    session.connect(Some(listen_addr())).unwrap();
    let server_conn = accept_pending(&mut server);
    session.update();
    server.run_callbacks();
    let hello = server.receive(server_conn, 10);

    // Assert: the handshake is the raw player name.
    assert_eq!(session.client().state(), ConnectionState::Connected);
    assert_eq!(hello.len(), 1);
    assert_eq!(
        handshake::decode_identity(&hello[0]).unwrap(),
        PlayerIdentity::new("Bob")
    );

    // Act: the server replicates a roster entry and a permission.
    send_command(
        &mut server,
        server_conn,
        &MultiplayerCommand::player_joined(PlayerIdentity::new("Bob")),
    );
    send_command(
        &mut server,
        server_conn,
        &MultiplayerCommand::permit_consumable("Bob", "item1", true),
    );
    let events = session.update();

    // Assert
    let received = events
        .iter()
        .filter(|e| matches!(e, ClientEvent::CommandReceived { .. }))
        .count();
    assert_eq!(received, 2);
    assert_eq!(
        session
            .shared_state()
            .read()
            .player("Bob")
            .and_then(|p| p.permission("item1")),
        Some(true)
    );
}

#[test]
fn test_loopback_severed_link_reconnects_to_the_same_endpoint() {
    // Arrange
    let net = LoopbackNetwork::new();
    let mut server = net.endpoint();
    server.listen(listen_addr()).unwrap();
    let mut session = session_over(Box::new(net.endpoint()), listen_addr());
    session.connect(Some(listen_addr())).unwrap();
    accept_pending(&mut server);
    session.update();
    let first = session.client().connection().unwrap();

    // Act
    net.sever(first);
    let events = session.update();

    // Assert: one retry is in flight and the server sees a new connection.
    assert!(events.contains(&ClientEvent::ReconnectScheduled { attempt: 1 }));
    assert_eq!(session.client().state(), ConnectionState::Connecting);
    assert_ne!(session.client().connection(), Some(first));

    // Act: the server accepts the retry.
    accept_pending(&mut server);
    session.update();

    // Assert
    assert_eq!(session.client().state(), ConnectionState::Connected);
    assert_eq!(session.client().reconnect_attempts(), 0);
}

#[test]
fn test_loopback_without_listener_exhausts_retries() {
    let net = LoopbackNetwork::new();
    let mut session = session_over(Box::new(net.endpoint()), listen_addr());
    session.connect(Some(listen_addr())).unwrap();

    let mut exhausted = Vec::new();
    for _ in 0..25 {
        exhausted.extend(
            session
                .update()
                .into_iter()
                .filter(|e| matches!(e, ClientEvent::ReconnectExhausted { .. })),
        );
    }

    assert_eq!(exhausted, vec![ClientEvent::ReconnectExhausted { attempts: 20 }]);
    assert_eq!(session.client().state(), ConnectionState::Disconnected);
}

#[test]
fn test_tcp_session_over_localhost() {
    // Arrange
    let mut server = TcpTransport::default();
    server.listen("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = server.local_addr().unwrap();
    let mut session = session_over(Box::new(TcpTransport::default()), addr);

    // Act: connect() returns while the TCP handshake is still running; the
    // identity goes out on the tick that observes Connected.
    session.connect(Some(addr)).unwrap();
    assert_ne!(session.client().state(), ConnectionState::Disconnected);

    let mut server_conn = None;
    let mut hello = Vec::new();
    for _ in 0..200 {
        session.update();
        for event in server.run_callbacks() {
            if event.status == ConnectionStatus::Connecting {
                server.accept(event.connection).unwrap();
                server_conn = Some(event.connection);
            }
        }
        if let Some(conn) = server_conn {
            hello.extend(server.receive(conn, 10));
            if !hello.is_empty() {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    let server_conn = server_conn.expect("server must see the connection");
    assert_eq!(hello, vec![b"Bob".to_vec()]);
    assert_eq!(session.client().state(), ConnectionState::Connected);

    send_command(
        &mut server,
        server_conn,
        &MultiplayerCommand::set_default_forbidden(["Meat"]),
    );

    let mut received = None;
    for _ in 0..200 {
        received = session.update().into_iter().find_map(|e| match e {
            ClientEvent::CommandReceived { command, .. } => Some(command),
            _ => None,
        });
        if received.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    // Assert
    assert_eq!(
        received,
        Some(MultiplayerCommand::set_default_forbidden(["Meat"]))
    );
    assert!(session
        .shared_state()
        .read()
        .default_forbidden
        .contains("Meat"));
}
