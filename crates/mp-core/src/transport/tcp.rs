//! Non-blocking TCP transport built on `std::net`.
//!
//! TCP is a *stream* protocol, so every message is framed with a 4-byte
//! big-endian length prefix:
//!
//! ```text
//! [len:4][message:len][len:4][message:len]...
//! ```
//!
//! All sockets are switched to non-blocking mode.  `run_callbacks()` accepts
//! pending inbound connections, flushes queued writes, reads whatever bytes
//! are available, splits them into messages, and reports connection changes.
//!
//! # Outbound connects (for beginners)
//!
//! `TcpStream::connect_timeout` blocks until the handshake completes or the
//! timeout expires.  `connect()` therefore hands it to a short-lived
//! `mp-tcp-connect` thread and returns the connection id immediately.  The
//! thread reports back over a channel; the next `run_callbacks()` turns the
//! result into `Connected` or `ProblemDetectedLocally`.  No transport call
//! ever waits on the network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    ConnectionId, ConnectionStatus, SendMode, StatusEvent, Transport, TransportError,
};

/// Largest message accepted in either direction.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

const LENGTH_PREFIX: usize = 4;
const READ_CHUNK: usize = 4096;

/// Outcome of one connector thread.
type ConnectOutcome = (ConnectionId, SocketAddr, std::io::Result<TcpStream>);

struct TcpLink {
    stream: TcpStream,
    status: ConnectionStatus,
    inbound: bool,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    inbox: VecDeque<Vec<u8>>,
}

impl TcpLink {
    fn new(stream: TcpStream, status: ConnectionStatus, inbound: bool) -> Self {
        Self {
            stream,
            status,
            inbound,
            read_buf: Vec::new(),
            write_buf: Vec::new(),
            inbox: VecDeque::new(),
        }
    }

    /// Writes as much of `write_buf` as the socket accepts right now.
    fn flush(&mut self) -> std::io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Reads all currently available bytes.  Returns the terminal status if
    /// the connection ended.
    fn fill(&mut self) -> Option<ConnectionStatus> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Some(ConnectionStatus::ClosedByPeer),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("tcp read error: {e}");
                    return Some(ConnectionStatus::ProblemDetectedLocally);
                }
            }
        }
    }

    /// Moves every complete length-prefixed message from `read_buf` into
    /// the inbox.  Returns `false` if a declared length is out of bounds.
    fn split_messages(&mut self) -> bool {
        loop {
            if self.read_buf.len() < LENGTH_PREFIX {
                return true;
            }
            let len = u32::from_be_bytes([
                self.read_buf[0],
                self.read_buf[1],
                self.read_buf[2],
                self.read_buf[3],
            ]) as usize;
            if len > MAX_MESSAGE_SIZE {
                return false;
            }
            if self.read_buf.len() < LENGTH_PREFIX + len {
                return true;
            }
            let message = self.read_buf[LENGTH_PREFIX..LENGTH_PREFIX + len].to_vec();
            self.read_buf.drain(..LENGTH_PREFIX + len);
            self.inbox.push_back(message);
        }
    }
}

/// TCP implementation of [`Transport`].
pub struct TcpTransport {
    listener: Option<TcpListener>,
    links: HashMap<ConnectionId, TcpLink>,
    events: VecDeque<StatusEvent>,
    next_connection: u32,
    connect_timeout: Duration,
    /// Outbound connects whose connector thread has not reported yet.
    pending: HashSet<ConnectionId>,
    connect_tx: mpsc::UnboundedSender<ConnectOutcome>,
    connect_rx: mpsc::UnboundedReceiver<ConnectOutcome>,
}

impl TcpTransport {
    /// Creates a transport whose outbound connects give up after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        let (connect_tx, connect_rx) = mpsc::unbounded_channel();
        Self {
            listener: None,
            links: HashMap::new(),
            events: VecDeque::new(),
            next_connection: 0,
            connect_timeout,
            pending: HashSet::new(),
            connect_tx,
            connect_rx,
        }
    }

    /// Address of the listening socket, if [`Transport::listen`] succeeded.
    ///
    /// Useful when listening on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    fn allocate_connection(&mut self) -> ConnectionId {
        self.next_connection = self.next_connection.wrapping_add(1).max(1);
        ConnectionId(self.next_connection)
    }

    /// Turns finished connector threads into links and status events.
    fn collect_connects(&mut self) {
        while let Ok((id, endpoint, result)) = self.connect_rx.try_recv() {
            if !self.pending.remove(&id) {
                debug!("discarding connect result for closed connection {id}");
                continue;
            }
            match result.and_then(|stream| configure(&stream).map(|()| stream)) {
                Ok(stream) => {
                    debug!("outbound tcp connection {id} to {endpoint}");
                    self.links
                        .insert(id, TcpLink::new(stream, ConnectionStatus::Connected, false));
                    self.events
                        .push_back(StatusEvent::new(id, ConnectionStatus::Connected));
                }
                Err(e) => {
                    debug!("tcp connect to {endpoint} failed: {e}");
                    self.events
                        .push_back(StatusEvent::new(id, ConnectionStatus::ProblemDetectedLocally));
                }
            }
        }
    }

    fn accept_pending(&mut self) {
        let mut accepted = Vec::new();
        if let Some(listener) = &self.listener {
            loop {
                match listener.accept() {
                    Ok((stream, peer)) => accepted.push((stream, peer)),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("tcp accept error: {e}");
                        break;
                    }
                }
            }
        }

        for (stream, peer) in accepted {
            if let Err(e) = configure(&stream) {
                warn!("dropping inbound connection from {peer}: {e}");
                continue;
            }
            let id = self.allocate_connection();
            debug!("inbound tcp connection {id} from {peer}");
            self.links
                .insert(id, TcpLink::new(stream, ConnectionStatus::Connecting, true));
            self.events
                .push_back(StatusEvent::new(id, ConnectionStatus::Connecting));
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

fn configure(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nonblocking(true)?;
    stream.set_nodelay(true)
}

impl Transport for TcpTransport {
    fn listen(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::ListenFailed {
            addr,
            reason: e.to_string(),
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        info!("tcp transport listening on {}", listener.local_addr().unwrap_or(addr));
        self.listener = Some(listener);
        Ok(())
    }

    fn connect(&mut self, endpoint: SocketAddr) -> Result<ConnectionId, TransportError> {
        let id = self.allocate_connection();
        let tx = self.connect_tx.clone();
        let timeout = self.connect_timeout;
        let spawned = std::thread::Builder::new()
            .name("mp-tcp-connect".to_string())
            .spawn(move || {
                let result = TcpStream::connect_timeout(&endpoint, timeout);
                // The transport may already be gone; nobody is waiting then.
                let _ = tx.send((id, endpoint, result));
            });

        match spawned {
            Ok(_) => {
                self.pending.insert(id);
            }
            Err(e) => {
                warn!("failed to spawn connector thread for {endpoint}: {e}");
                self.events
                    .push_back(StatusEvent::new(id, ConnectionStatus::ProblemDetectedLocally));
            }
        }
        Ok(id)
    }

    fn accept(&mut self, connection: ConnectionId) -> Result<(), TransportError> {
        let link = self
            .links
            .get_mut(&connection)
            .ok_or(TransportError::UnknownConnection(connection))?;
        if !link.inbound || link.status != ConnectionStatus::Connecting {
            return Err(TransportError::InvalidState {
                connection,
                status: link.status,
            });
        }
        link.status = ConnectionStatus::Connected;
        self.events
            .push_back(StatusEvent::new(connection, ConnectionStatus::Connected));
        Ok(())
    }

    fn close(&mut self, connection: ConnectionId) {
        if self.pending.remove(&connection) {
            debug!("abandoning pending connect {connection}");
            return;
        }
        if let Some(mut link) = self.links.remove(&connection) {
            // Best effort: deliver anything still queued before shutting down.
            let _ = link.flush();
            let _ = link.stream.shutdown(Shutdown::Both);
        }
    }

    fn send(
        &mut self,
        connection: ConnectionId,
        message: &[u8],
        _mode: SendMode,
    ) -> Result<(), TransportError> {
        if message.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::MessageTooLarge {
                size: message.len(),
                limit: MAX_MESSAGE_SIZE,
            });
        }
        if self.pending.contains(&connection) {
            return Err(TransportError::InvalidState {
                connection,
                status: ConnectionStatus::Connecting,
            });
        }
        let link = self
            .links
            .get_mut(&connection)
            .ok_or(TransportError::UnknownConnection(connection))?;
        if link.status != ConnectionStatus::Connected {
            return Err(TransportError::InvalidState {
                connection,
                status: link.status,
            });
        }

        link.write_buf
            .extend_from_slice(&(message.len() as u32).to_be_bytes());
        link.write_buf.extend_from_slice(message);
        if let Err(e) = link.flush() {
            link.status = ConnectionStatus::ProblemDetectedLocally;
            self.events.push_back(StatusEvent::new(
                connection,
                ConnectionStatus::ProblemDetectedLocally,
            ));
            return Err(TransportError::Io(e.to_string()));
        }
        Ok(())
    }

    fn receive(&mut self, connection: ConnectionId, max: usize) -> Vec<Vec<u8>> {
        match self.links.get_mut(&connection) {
            Some(link) => {
                let count = max.min(link.inbox.len());
                link.inbox.drain(..count).collect()
            }
            None => Vec::new(),
        }
    }

    fn run_callbacks(&mut self) -> Vec<StatusEvent> {
        self.collect_connects();
        self.accept_pending();

        for (id, link) in self.links.iter_mut() {
            if link.status.is_terminal() {
                continue;
            }
            let mut ended = match link.flush() {
                Ok(()) => None,
                Err(e) => {
                    warn!("tcp write error on {id}: {e}");
                    Some(ConnectionStatus::ProblemDetectedLocally)
                }
            };
            if ended.is_none() {
                ended = link.fill();
            }
            // Messages that arrived before the close are still delivered.
            if !link.split_messages() {
                warn!("tcp connection {id} declared a message above {MAX_MESSAGE_SIZE} bytes");
                ended = Some(ConnectionStatus::ProblemDetectedLocally);
            }
            if let Some(status) = ended {
                link.status = status;
                self.events.push_back(StatusEvent::new(*id, status));
            }
        }

        self.events.drain(..).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
