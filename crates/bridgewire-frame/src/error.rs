use bridgewire_transport::TransportError;

/// Errors that can occur while framing, encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The bytes do not form one well-formed document of the expected encoding.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// A length prefix on the byte stream is out of range; the stream is desynchronized.
    #[error("framing error: declared document length {declared} outside 5..={max}")]
    Framing { declared: i64, max: usize },

    /// The stream ended in the middle of a document.
    #[error("connection closed mid-message ({buffered} bytes buffered)")]
    Truncated { buffered: usize },

    /// An I/O error occurred while reading the stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl FrameError {
    /// True when the error ends the incoming message sequence.
    ///
    /// Decode failures are local to one message; everything else means the
    /// connection can no longer be read reliably.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FrameError::MalformedPayload(_) | FrameError::Encode(_))
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
