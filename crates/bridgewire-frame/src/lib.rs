//! Bridge protocol messages and their wire representation.
//!
//! Two layers live here:
//! - the [`Codec`], a pure conversion between [`ProtocolMessage`] and bytes
//!   in either JSON text or length-prefixed BSON,
//! - the [`Framer`], which recovers whole-message [`MessageBlock`]s from a
//!   transport's read half.
//!
//! Callers never see partial messages.

pub mod block;
pub mod codec;
pub mod encoding;
pub mod error;
pub mod framer;
pub mod message;

pub use block::{
    peek_document_length, split_document, DocumentCodec, ReadBoundaryCodec,
    DEFAULT_MAX_MESSAGE_SIZE, LENGTH_PREFIX_SIZE, MIN_DOCUMENT_SIZE,
};
pub use codec::{decode_binary, decode_text, encode_binary, encode_text, Codec};
pub use encoding::EncodingMode;
pub use error::{FrameError, Result};
pub use framer::{BlockKind, Framer, FramerConfig, MessageBlock};
pub use message::{
    ProtocolMessage, OP_ADVERTISE, OP_CALL_SERVICE, OP_PUBLISH, OP_SERVICE_RESPONSE, OP_STATUS,
    OP_SUBSCRIBE, OP_UNADVERTISE, OP_UNSUBSCRIBE, STATUS_LEVEL_ERROR,
};
