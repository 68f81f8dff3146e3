//! Inbound frame processing.
//!
//! The processor sits between the transport and command dispatch.  It feeds
//! each raw frame through the codec's per-connection reassembly and only
//! ever hands out complete commands.  Malformed frames are logged and
//! dropped; the connection keeps going.

use tracing::{trace, warn};

use crate::protocol::codec::{CodecConfig, DecodedCommand, MessageCodec};
use crate::transport::ConnectionId;

/// Connection-scoped frame processor.
#[derive(Debug, Default)]
pub struct MessageProcessor {
    codec: MessageCodec,
    dropped: u64,
}

impl MessageProcessor {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            codec: MessageCodec::new(config),
            dropped: 0,
        }
    }

    /// Processes one raw frame received on `connection`.
    ///
    /// Returns the command when this frame completes one, otherwise `None`
    /// (more fragments needed, or the frame was invalid and dropped).
    pub fn process(&mut self, connection: ConnectionId, frame: &[u8]) -> Option<DecodedCommand> {
        match self.codec.decode(connection, frame) {
            Ok(Some(decoded)) => Some(decoded),
            Ok(None) => {
                trace!("connection {connection}: fragment buffered ({} bytes)", frame.len());
                None
            }
            Err(e) => {
                self.dropped += 1;
                warn!("connection {connection}: dropping frame of {} bytes: {e}", frame.len());
                None
            }
        }
    }

    /// Releases the reassembly buffer of a closed connection.
    pub fn release(&mut self, connection: ConnectionId) {
        self.codec.release(connection);
    }

    /// Number of frames dropped as invalid since creation.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    pub fn has_partial(&self, connection: ConnectionId) -> bool {
        self.codec.has_partial(connection)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
