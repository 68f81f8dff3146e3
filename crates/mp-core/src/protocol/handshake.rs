//! Identity handshake.
//!
//! The first message on every connection is the sender's identity: the raw
//! UTF-8 bytes of its name, without a frame header.  Nothing else may be
//! sent or accepted on the connection before it.

use thiserror::Error;

use crate::state::PlayerIdentity;

/// Identity used by the authoritative (host) role.
pub const HOST_IDENTITY: &str = "server";

/// Identity used by a peer when no name is configured.
pub const DEFAULT_PEER_IDENTITY: &str = "client";

/// Longest identity accepted, in bytes.
pub const MAX_IDENTITY_LEN: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("identity is empty")]
    Empty,

    #[error("identity of {len} bytes exceeds the limit of {MAX_IDENTITY_LEN}")]
    TooLong { len: usize },

    #[error("identity is not valid UTF-8")]
    InvalidUtf8,

    #[error("identity contains control characters")]
    ControlCharacter,
}

/// Checks that `name` may be used as a handshake identity.
///
/// # Errors
///
/// Returns [`HandshakeError`] for empty, oversized, or control-character names.
pub fn validate_identity(name: &str) -> Result<(), HandshakeError> {
    if name.is_empty() {
        return Err(HandshakeError::Empty);
    }
    if name.len() > MAX_IDENTITY_LEN {
        return Err(HandshakeError::TooLong { len: name.len() });
    }
    if name.chars().any(char::is_control) {
        return Err(HandshakeError::ControlCharacter);
    }
    Ok(())
}

/// Produces the handshake payload for `identity`.
///
/// # Errors
///
/// Returns [`HandshakeError`] if the identity is not a valid handshake name.
pub fn encode_identity(identity: &PlayerIdentity) -> Result<Vec<u8>, HandshakeError> {
    validate_identity(identity.as_str())?;
    Ok(identity.as_str().as_bytes().to_vec())
}

/// Parses a received handshake payload.
///
/// # Errors
///
/// Returns [`HandshakeError`] if the bytes are not a valid identity.
pub fn decode_identity(bytes: &[u8]) -> Result<PlayerIdentity, HandshakeError> {
    let name = std::str::from_utf8(bytes).map_err(|_| HandshakeError::InvalidUtf8)?;
    validate_identity(name)?;
    Ok(PlayerIdentity::new(name))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_bytes_are_raw_utf8() {
        let bytes = encode_identity(&PlayerIdentity::new(HOST_IDENTITY)).unwrap();
        assert_eq!(bytes, b"server".to_vec());
    }

    #[test]
    fn test_decode_accepts_valid_identity() {
        assert_eq!(decode_identity("Bob".as_bytes()), Ok(PlayerIdentity::new("Bob")));
    }

    #[test]
    fn test_decode_rejects_empty() {
        assert_eq!(decode_identity(&[]), Err(HandshakeError::Empty));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        assert_eq!(decode_identity(&[0xC3, 0x28]), Err(HandshakeError::InvalidUtf8));
    }

    #[test]
    fn test_decode_rejects_control_characters() {
        assert_eq!(decode_identity(b"Bo\nb"), Err(HandshakeError::ControlCharacter));
    }

    #[test]
    fn test_encode_rejects_long_identity() {
        let long = PlayerIdentity::new("x".repeat(MAX_IDENTITY_LEN + 1));
        assert_eq!(
            encode_identity(&long),
            Err(HandshakeError::TooLong {
                len: MAX_IDENTITY_LEN + 1
            })
        );
    }
}
