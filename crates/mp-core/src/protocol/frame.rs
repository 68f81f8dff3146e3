//! Fixed-size frame header.
//!
//! Wire format (all multi-byte integers big-endian):
//! ```text
//! [version:1][kind:1][routing:1][flags:1][message_id:4]
//! [fragment_index:2][fragment_count:2][total_len:4][chunk_len:4][chunk:N]
//! ```
//! Total header size: 20 bytes.
//!
//! # Why a header on every fragment? (for beginners)
//!
//! A command too big for one frame is cut into fragments.  Each fragment
//! repeats the full header, so the receiver can validate any single frame on
//! its own: it knows which command it belongs to (`message_id`), where it
//! goes (`fragment_index` of `fragment_count`) and how big the finished
//! command will be (`total_len`) before the last piece has arrived.

use crate::command::CommandKind;
use crate::protocol::codec::DecodingError;
use crate::protocol::options::Routing;

/// Size of the frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 20;

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Default upper bound on a whole frame, header included.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1200;

/// Largest serialized command the codec accepts (16 MiB).
pub const MAX_COMMAND_SIZE: usize = 16 * 1024 * 1024;

/// Bit 0 of the flags byte: reliable delivery was requested.
pub const FLAG_RELIABLE: u8 = 0b0000_0001;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: CommandKind,
    pub routing: Routing,
    pub reliable: bool,
    pub message_id: u32,
    pub fragment_index: u16,
    pub fragment_count: u16,
    pub total_len: u32,
    pub chunk_len: u32,
}

impl FrameHeader {
    /// Appends the 20 header bytes to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(PROTOCOL_VERSION);
        buf.push(self.kind as u8);
        buf.push(self.routing as u8);
        buf.push(if self.reliable { FLAG_RELIABLE } else { 0 });
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.extend_from_slice(&self.fragment_index.to_be_bytes());
        buf.extend_from_slice(&self.fragment_count.to_be_bytes());
        buf.extend_from_slice(&self.total_len.to_be_bytes());
        buf.extend_from_slice(&self.chunk_len.to_be_bytes());
    }

    /// Parses and validates the header at the start of `frame`.
    ///
    /// Returns the header and the chunk bytes that follow it.
    ///
    /// # Errors
    ///
    /// Returns [`DecodingError`] if the frame is truncated, carries an
    /// unknown version, kind or routing byte, has impossible fragment
    /// numbering, declares an oversized command, or if `chunk_len` does not
    /// match the bytes actually present.
    pub fn parse(frame: &[u8]) -> Result<(FrameHeader, &[u8]), DecodingError> {
        if frame.len() < FRAME_HEADER_SIZE {
            return Err(DecodingError::Truncated {
                needed: FRAME_HEADER_SIZE,
                available: frame.len(),
            });
        }

        let version = frame[0];
        if version != PROTOCOL_VERSION {
            return Err(DecodingError::UnsupportedVersion(version));
        }
        let kind = CommandKind::from_u8(frame[1]).ok_or(DecodingError::UnknownKind(frame[1]))?;
        let routing = Routing::from_u8(frame[2]).ok_or(DecodingError::InvalidRouting(frame[2]))?;
        let reliable = frame[3] & FLAG_RELIABLE != 0;

        let message_id = read_u32(frame, 4);
        let fragment_index = read_u16(frame, 8);
        let fragment_count = read_u16(frame, 10);
        let total_len = read_u32(frame, 12);
        let chunk_len = read_u32(frame, 16);

        if fragment_count == 0 || fragment_index >= fragment_count {
            return Err(DecodingError::InvalidFragmentNumbering {
                index: fragment_index,
                count: fragment_count,
            });
        }
        if total_len as usize > MAX_COMMAND_SIZE {
            return Err(DecodingError::Oversized {
                declared: total_len as usize,
                limit: MAX_COMMAND_SIZE,
            });
        }

        let chunk = &frame[FRAME_HEADER_SIZE..];
        if chunk.len() != chunk_len as usize {
            return Err(DecodingError::LengthMismatch {
                declared: chunk_len as usize,
                available: chunk.len(),
            });
        }

        let header = FrameHeader {
            kind,
            routing,
            reliable,
            message_id,
            fragment_index,
            fragment_count,
            total_len,
            chunk_len,
        };
        Ok((header, chunk))
    }
}

// Callers have already checked that `buf` holds a full header.
fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
