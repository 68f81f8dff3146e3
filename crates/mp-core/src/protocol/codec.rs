//! Message codec: commands to frames and back.
//!
//! Outbound, a [`MultiplayerCommand`] is serialized with `bincode` and cut
//! into one or more frames, each carrying the 20-byte header described in
//! [`crate::protocol::frame`].  Inbound, frames are fed one at a time per
//! connection; fragments are collected in a per-connection reassembly slot
//! until the command is complete.
//!
//! Reassembly is strictly in order.  The transport delivers reliable frames
//! in order per connection, so any gap or reordering is a protocol error.

use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;

use crate::command::{CommandKind, MultiplayerCommand};
use crate::protocol::frame::{
    FrameHeader, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE, MAX_COMMAND_SIZE,
};
use crate::protocol::options::{DeliveryOptions, Reliability, Routing};
use crate::transport::ConnectionId;

/// Errors produced while turning a command into frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// `bincode` could not serialize the command.
    #[error("failed to serialize command: {0}")]
    Serialize(String),

    /// The serialized command exceeds the codec limit.
    #[error("command of {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    /// The command would need more fragments than the header can number.
    #[error("command needs {count} fragments, at most {} are allowed", u16::MAX)]
    TooManyFragments { count: usize },

    /// The delivery options (or codec configuration) cannot carry this command.
    #[error("invalid delivery options: {0}")]
    InvalidOptions(String),
}

/// Errors produced while turning frames back into a command.
///
/// Every variant means "drop this frame"; the connection itself stays usable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodingError {
    /// The frame is shorter than the fixed header.
    #[error("truncated frame: need at least {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The version byte is not one this codec understands.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The kind byte does not name a known command.
    #[error("unknown command kind: 0x{0:02X}")]
    UnknownKind(u8),

    /// The routing byte is not a known routing option.
    #[error("invalid routing byte: 0x{0:02X}")]
    InvalidRouting(u8),

    /// `fragment_index` / `fragment_count` are impossible.
    #[error("invalid fragment numbering: index {index} of {count}")]
    InvalidFragmentNumbering { index: u16, count: u16 },

    /// A declared length does not match the bytes present.
    #[error("length mismatch: declared {declared}, available {available}")]
    LengthMismatch { declared: usize, available: usize },

    /// The frame does not continue the command being reassembled.
    #[error("unexpected fragment {index} of message {message_id} (expected fragment {expected})")]
    UnexpectedFragment {
        message_id: u32,
        index: u16,
        expected: u16,
    },

    /// The declared command size exceeds the codec limit.
    #[error("declared command size {declared} exceeds the limit of {limit} bytes")]
    Oversized { declared: usize, limit: usize },

    /// The reassembled payload is not a valid serialized command.
    #[error("malformed command payload: {0}")]
    Payload(String),

    /// The payload decoded to a different command than the header announced.
    #[error("header announced {header:?} but payload decoded to {decoded:?}")]
    KindMismatch {
        header: CommandKind,
        decoded: CommandKind,
    },
}

/// Size limits applied by a [`MessageCodec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Upper bound on a whole frame, header included.
    pub max_frame_size: usize,
    /// Upper bound on a serialized command.
    pub max_command_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_command_size: MAX_COMMAND_SIZE,
        }
    }
}

impl CodecConfig {
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            ..Self::default()
        }
    }
}

/// A fully reassembled inbound command.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCommand {
    pub command: MultiplayerCommand,
    pub options: DeliveryOptions,
    pub message_id: u32,
}

/// Partially assembled command for one connection.
#[derive(Debug)]
struct Reassembly {
    message_id: u32,
    kind: CommandKind,
    routing: Routing,
    reliable: bool,
    fragment_count: u16,
    next_index: u16,
    total_len: u32,
    buffer: Vec<u8>,
}

impl Reassembly {
    fn start(header: &FrameHeader, chunk: &[u8]) -> Self {
        let mut buffer = Vec::with_capacity(header.total_len as usize);
        buffer.extend_from_slice(chunk);
        Self {
            message_id: header.message_id,
            kind: header.kind,
            routing: header.routing,
            reliable: header.reliable,
            fragment_count: header.fragment_count,
            next_index: 1,
            total_len: header.total_len,
            buffer,
        }
    }

    fn continues_with(&self, header: &FrameHeader) -> bool {
        header.message_id == self.message_id
            && header.fragment_index == self.next_index
            && header.fragment_count == self.fragment_count
            && header.total_len == self.total_len
            && header.kind == self.kind
    }
}

/// Stateful encoder/decoder for command frames.
///
/// Encoding state is a wrapping message id counter.  Decoding state is one
/// reassembly slot per connection, released with [`MessageCodec::release`].
#[derive(Debug)]
pub struct MessageCodec {
    config: CodecConfig,
    next_message_id: u32,
    partial: HashMap<ConnectionId, Reassembly>,
}

impl MessageCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            config,
            next_message_id: 0,
            partial: HashMap::new(),
        }
    }

    pub fn config(&self) -> CodecConfig {
        self.config
    }

    // ── Encoding ──────────────────────────────────────────────────────────────

    /// Serializes `command` into one or more transport-ready frames.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError`] if the command cannot be serialized, is too
    /// large, or if unreliable delivery is requested for a command that does
    /// not fit in a single frame.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mp_core::command::MultiplayerCommand;
    /// use mp_core::protocol::{CodecConfig, DeliveryOptions, MessageCodec};
    /// use mp_core::transport::ConnectionId;
    ///
    /// let mut codec = MessageCodec::new(CodecConfig::default());
    /// let cmd = MultiplayerCommand::permit_consumable("Bob", "item1", true);
    /// let frames = codec.encode(&cmd, DeliveryOptions::default()).unwrap();
    ///
    /// let mut decoded = None;
    /// for frame in &frames {
    ///     decoded = codec.decode(ConnectionId(1), frame).unwrap();
    /// }
    /// assert_eq!(decoded.unwrap().command, cmd);
    /// ```
    pub fn encode(
        &mut self,
        command: &MultiplayerCommand,
        options: DeliveryOptions,
    ) -> Result<Vec<Vec<u8>>, EncodingError> {
        if self.config.max_frame_size <= FRAME_HEADER_SIZE {
            return Err(EncodingError::InvalidOptions(format!(
                "max frame size {} leaves no room after the {FRAME_HEADER_SIZE}-byte header",
                self.config.max_frame_size
            )));
        }

        let payload =
            bincode::serialize(command).map_err(|e| EncodingError::Serialize(e.to_string()))?;
        let limit = self.config.max_command_size.min(MAX_COMMAND_SIZE);
        if payload.len() > limit {
            return Err(EncodingError::TooLarge {
                size: payload.len(),
                limit,
            });
        }

        let chunk_size = self.config.max_frame_size - FRAME_HEADER_SIZE;
        let count = payload.len().div_ceil(chunk_size).max(1);
        if count > u16::MAX as usize {
            return Err(EncodingError::TooManyFragments { count });
        }
        if count > 1 && options.reliability == Reliability::Unreliable {
            return Err(EncodingError::InvalidOptions(format!(
                "unreliable delivery needs a single frame, command needs {count}"
            )));
        }

        let message_id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);

        let mut frames = Vec::with_capacity(count);
        for index in 0..count {
            let start = index * chunk_size;
            let end = (start + chunk_size).min(payload.len());
            let chunk = &payload[start..end];

            let header = FrameHeader {
                kind: command.kind(),
                routing: options.routing,
                reliable: options.reliability == Reliability::ReliableOrdered,
                message_id,
                fragment_index: index as u16,
                fragment_count: count as u16,
                total_len: payload.len() as u32,
                chunk_len: chunk.len() as u32,
            };
            let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + chunk.len());
            header.write_to(&mut frame);
            frame.extend_from_slice(chunk);
            frames.push(frame);
        }
        Ok(frames)
    }

    // ── Decoding ──────────────────────────────────────────────────────────────

    /// Consumes one inbound frame for `connection`.
    ///
    /// Returns `Ok(Some(..))` when the frame completes a command and
    /// `Ok(None)` when more fragments are needed.
    ///
    /// # Errors
    ///
    /// Returns [`DecodingError`] on malformed framing or payload.  The frame
    /// is dropped; if it broke an in-progress reassembly that partial command
    /// is dropped too.
    pub fn decode(
        &mut self,
        connection: ConnectionId,
        frame: &[u8],
    ) -> Result<Option<DecodedCommand>, DecodingError> {
        let (header, chunk) = FrameHeader::parse(frame)?;

        if header.fragment_count == 1 {
            self.discard_partial(connection, "single-frame command arrived");
            if chunk.len() != header.total_len as usize {
                return Err(DecodingError::LengthMismatch {
                    declared: header.total_len as usize,
                    available: chunk.len(),
                });
            }
            return finish(
                header.kind,
                header.routing,
                header.reliable,
                header.message_id,
                chunk,
            )
            .map(Some);
        }

        if header.fragment_index == 0 {
            self.discard_partial(connection, "new fragmented command started");
            if chunk.len() > header.total_len as usize {
                return Err(DecodingError::LengthMismatch {
                    declared: header.total_len as usize,
                    available: chunk.len(),
                });
            }
            self.partial
                .insert(connection, Reassembly::start(&header, chunk));
            return Ok(None);
        }

        let Some(mut slot) = self.partial.remove(&connection) else {
            return Err(DecodingError::UnexpectedFragment {
                message_id: header.message_id,
                index: header.fragment_index,
                expected: 0,
            });
        };
        if !slot.continues_with(&header) {
            warn!(
                "connection {connection}: dropping partial message {} after unexpected fragment",
                slot.message_id
            );
            return Err(DecodingError::UnexpectedFragment {
                message_id: header.message_id,
                index: header.fragment_index,
                expected: slot.next_index,
            });
        }

        slot.buffer.extend_from_slice(chunk);
        slot.next_index += 1;
        if slot.buffer.len() > slot.total_len as usize {
            return Err(DecodingError::LengthMismatch {
                declared: slot.total_len as usize,
                available: slot.buffer.len(),
            });
        }

        if slot.next_index < slot.fragment_count {
            self.partial.insert(connection, slot);
            return Ok(None);
        }

        if slot.buffer.len() != slot.total_len as usize {
            return Err(DecodingError::LengthMismatch {
                declared: slot.total_len as usize,
                available: slot.buffer.len(),
            });
        }
        finish(
            slot.kind,
            slot.routing,
            slot.reliable,
            slot.message_id,
            &slot.buffer,
        )
        .map(Some)
    }

    /// Drops any reassembly state held for `connection`.
    pub fn release(&mut self, connection: ConnectionId) {
        self.partial.remove(&connection);
    }

    /// Returns `true` if a partially assembled command is held for `connection`.
    pub fn has_partial(&self, connection: ConnectionId) -> bool {
        self.partial.contains_key(&connection)
    }

    fn discard_partial(&mut self, connection: ConnectionId, reason: &str) {
        if let Some(old) = self.partial.remove(&connection) {
            warn!(
                "connection {connection}: discarding partial message {} ({} of {} fragments): {reason}",
                old.message_id, old.next_index, old.fragment_count
            );
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

fn finish(
    kind: CommandKind,
    routing: Routing,
    reliable: bool,
    message_id: u32,
    payload: &[u8],
) -> Result<DecodedCommand, DecodingError> {
    let command: MultiplayerCommand =
        bincode::deserialize(payload).map_err(|e| DecodingError::Payload(e.to_string()))?;
    if command.kind() != kind {
        return Err(DecodingError::KindMismatch {
            header: kind,
            decoded: command.kind(),
        });
    }
    let reliability = if reliable {
        Reliability::ReliableOrdered
    } else {
        Reliability::Unreliable
    };
    Ok(DecodedCommand {
        command,
        options: DeliveryOptions {
            reliability,
            routing,
        },
        message_id,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::options::Routing;

    const CONN: ConnectionId = ConnectionId(1);

    fn permit() -> MultiplayerCommand {
        MultiplayerCommand::permit_consumable("Bob", "item1", true)
    }

    /// A command whose payload needs several frames at a small frame size.
    fn big_tags(count: usize) -> MultiplayerCommand {
        MultiplayerCommand::set_default_forbidden((0..count).map(|i| format!("tag-{i:04}")))
    }

    fn decode_all(
        codec: &mut MessageCodec,
        conn: ConnectionId,
        frames: &[Vec<u8>],
    ) -> Option<DecodedCommand> {
        let mut out = None;
        for frame in frames {
            out = codec.decode(conn, frame).unwrap();
        }
        out
    }

    #[test]
    fn test_small_command_encodes_to_single_frame() {
        let mut codec = MessageCodec::default();
        let frames = codec.encode(&permit(), DeliveryOptions::default()).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].len() <= DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_single_frame_round_trip_preserves_options() {
        // Arrange
        let mut codec = MessageCodec::default();
        let opts = DeliveryOptions::unreliable().with_routing(Routing::OnlyHost);

        // Act
        let frames = codec.encode(&permit(), opts).unwrap();
        let decoded = decode_all(&mut codec, CONN, &frames).unwrap();

        // Assert
        assert_eq!(decoded.command, permit());
        assert_eq!(decoded.options, opts);
    }

    #[test]
    fn test_large_command_is_fragmented_and_reassembled() {
        // Arrange
        let mut codec = MessageCodec::new(CodecConfig::with_max_frame_size(64));
        let cmd = big_tags(50);

        // Act
        let frames = codec.encode(&cmd, DeliveryOptions::default()).unwrap();

        // Assert
        assert!(frames.len() > 1);
        assert!(frames.iter().all(|f| f.len() <= 64));
        for frame in &frames[..frames.len() - 1] {
            assert_eq!(codec.decode(CONN, frame).unwrap(), None);
        }
        let last = codec.decode(CONN, frames.last().unwrap()).unwrap().unwrap();
        assert_eq!(last.command, cmd);
        assert!(!codec.has_partial(CONN));
    }

    #[test]
    fn test_message_ids_increment_per_command() {
        let mut codec = MessageCodec::default();
        let a = codec.encode(&permit(), DeliveryOptions::default()).unwrap();
        let b = codec.encode(&permit(), DeliveryOptions::default()).unwrap();
        let id_a = FrameHeader::parse(&a[0]).unwrap().0.message_id;
        let id_b = FrameHeader::parse(&b[0]).unwrap().0.message_id;
        assert_eq!(id_b, id_a.wrapping_add(1));
    }

    #[test]
    fn test_unreliable_fragmented_command_is_rejected() {
        let mut codec = MessageCodec::new(CodecConfig::with_max_frame_size(64));
        let result = codec.encode(&big_tags(50), DeliveryOptions::unreliable());
        assert!(matches!(result, Err(EncodingError::InvalidOptions(_))));
    }

    #[test]
    fn test_frame_size_not_larger_than_header_is_rejected() {
        let mut codec = MessageCodec::new(CodecConfig::with_max_frame_size(FRAME_HEADER_SIZE));
        let result = codec.encode(&permit(), DeliveryOptions::default());
        assert!(matches!(result, Err(EncodingError::InvalidOptions(_))));
    }

    #[test]
    fn test_command_above_limit_is_rejected() {
        let mut codec = MessageCodec::new(CodecConfig {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_command_size: 16,
        });
        let result = codec.encode(&big_tags(10), DeliveryOptions::default());
        assert!(matches!(result, Err(EncodingError::TooLarge { limit: 16, .. })));
    }

    #[test]
    fn test_continuation_without_start_is_unexpected() {
        // Arrange
        let mut encoder = MessageCodec::new(CodecConfig::with_max_frame_size(64));
        let frames = encoder.encode(&big_tags(50), DeliveryOptions::default()).unwrap();
        let mut decoder = MessageCodec::default();

        // Act
        let err = decoder.decode(CONN, &frames[1]).unwrap_err();

        // Assert
        assert!(matches!(
            err,
            DecodingError::UnexpectedFragment { index: 1, expected: 0, .. }
        ));
    }

    #[test]
    fn test_skipped_fragment_drops_partial_message() {
        let mut encoder = MessageCodec::new(CodecConfig::with_max_frame_size(64));
        let frames = encoder.encode(&big_tags(50), DeliveryOptions::default()).unwrap();
        let mut decoder = MessageCodec::default();

        decoder.decode(CONN, &frames[0]).unwrap();
        let err = decoder.decode(CONN, &frames[2]).unwrap_err();

        assert!(matches!(
            err,
            DecodingError::UnexpectedFragment { index: 2, expected: 1, .. }
        ));
        assert!(!decoder.has_partial(CONN));
    }

    #[test]
    fn test_new_first_fragment_replaces_partial_message() {
        // Arrange – start one message, then abandon it for another
        let mut encoder = MessageCodec::new(CodecConfig::with_max_frame_size(64));
        let first = encoder.encode(&big_tags(40), DeliveryOptions::default()).unwrap();
        let second_cmd = big_tags(45);
        let second = encoder.encode(&second_cmd, DeliveryOptions::default()).unwrap();
        let mut decoder = MessageCodec::default();
        decoder.decode(CONN, &first[0]).unwrap();

        // Act
        let decoded = decode_all(&mut decoder, CONN, &second).unwrap();

        // Assert
        assert_eq!(decoded.command, second_cmd);
    }

    #[test]
    fn test_release_drops_partial_state() {
        let mut encoder = MessageCodec::new(CodecConfig::with_max_frame_size(64));
        let frames = encoder.encode(&big_tags(50), DeliveryOptions::default()).unwrap();
        let mut decoder = MessageCodec::default();
        decoder.decode(CONN, &frames[0]).unwrap();

        decoder.release(CONN);

        assert!(!decoder.has_partial(CONN));
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        // Arrange – rewrite the kind byte to another valid kind
        let mut codec = MessageCodec::default();
        let mut frames = codec.encode(&permit(), DeliveryOptions::default()).unwrap();
        frames[0][1] = CommandKind::PlayerLeft as u8;

        // Act
        let err = codec.decode(CONN, &frames[0]).unwrap_err();

        // Assert
        assert!(matches!(err, DecodingError::KindMismatch { .. } | DecodingError::Payload(_)));
    }

    #[test]
    fn test_garbage_payload_is_rejected() {
        let header = FrameHeader {
            kind: CommandKind::PlayerJoined,
            routing: Routing::All,
            reliable: true,
            message_id: 0,
            fragment_index: 0,
            fragment_count: 1,
            total_len: 3,
            chunk_len: 3,
        };
        let mut frame = Vec::new();
        header.write_to(&mut frame);
        frame.extend_from_slice(&[0xFF, 0xFF, 0xFF]);

        let err = MessageCodec::default().decode(CONN, &frame).unwrap_err();

        assert!(matches!(err, DecodingError::Payload(_)));
    }
}
