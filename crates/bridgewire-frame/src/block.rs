//! Recovering message boundaries from a raw byte stream.
//!
//! Binary documents are self-delimiting: the first 4 bytes are a
//! little-endian `i32` holding the total document length, prefix included.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ Length (4B)  │ Body (Length - 4 bytes)       │
//! │ i32 LE       │ elements ... 0x00             │
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! Text documents carry no delimiter at all, so on a byte stream every read
//! boundary is taken as a message boundary. That is best-effort only: a
//! sender that batches two documents into one segment, or a large document
//! split across reads, will produce blocks that fail to decode.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::{FrameError, Result};

/// Size of the length prefix on binary documents.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Smallest legal binary document: prefix plus the terminating NUL.
pub const MIN_DOCUMENT_SIZE: usize = 5;

/// Default maximum message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Read the declared document length without consuming anything.
///
/// Returns `None` while fewer than 4 bytes are buffered.
pub fn peek_document_length(src: &[u8]) -> Option<i32> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = src.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(i32::from_le_bytes(prefix))
}

/// Split one complete binary document off the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete document yet; in
/// that case nothing is consumed. On success exactly the declared number of
/// bytes is removed from the buffer.
pub fn split_document(src: &mut BytesMut, max_message_size: usize) -> Result<Option<Bytes>> {
    let Some(declared) = peek_document_length(src) else {
        return Ok(None);
    };

    if declared < MIN_DOCUMENT_SIZE as i32 || declared as i64 > max_message_size as i64 {
        return Err(FrameError::Framing {
            declared: declared as i64,
            max: max_message_size,
        });
    }

    let total = declared as usize;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    Ok(Some(src.split_to(total).freeze()))
}

/// Stream decoder yielding whole length-prefixed binary documents.
#[derive(Debug, Clone)]
pub struct DocumentCodec {
    max_message_size: usize,
}

impl DocumentCodec {
    /// Create a decoder rejecting documents larger than `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Configured maximum document size.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for DocumentCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Decoder for DocumentCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        split_document(src, self.max_message_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(document) => Ok(Some(document)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::Truncated {
                buffered: src.len(),
            }),
        }
    }
}

/// Stream decoder that treats every read as one text message.
#[derive(Debug, Clone, Default)]
pub struct ReadBoundaryCodec;

impl Decoder for ReadBoundaryCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(src.split().freeze()))
    }
}
