//! Wire protocol: frame header, command codec, inbound processor, and the
//! identity handshake.

pub mod codec;
pub mod frame;
pub mod handshake;
pub mod options;
pub mod processor;

pub use codec::{CodecConfig, DecodedCommand, DecodingError, EncodingError, MessageCodec};
pub use frame::{FrameHeader, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE, PROTOCOL_VERSION};
pub use handshake::{HandshakeError, HOST_IDENTITY};
pub use options::{DeliveryOptions, Reliability, Routing};
pub use processor::MessageProcessor;
