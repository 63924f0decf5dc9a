use std::time::Duration;

use bridgewire_frame::FrameError;
use bridgewire_schema::SchemaError;
use bridgewire_transport::TransportError;
use serde_json::Value;

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A message could not be encoded or decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The incoming byte stream lost message alignment.
    #[error("framing error: {0}")]
    Framing(String),

    /// No response arrived before the deadline.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// The session closed while the request was pending.
    #[error("request cancelled")]
    Cancelled,

    /// The remote service reported failure.
    #[error("service call {service} failed: {values}")]
    ServiceCallFailed { service: String, values: Value },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The operation was attempted after close.
    #[error("session is closed")]
    SessionClosed,

    /// Payload conversion or validation error.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The server answered the request with an error status.
    #[error("server reported {level}: {message}")]
    RemoteStatus { level: String, message: String },

    /// A request id is already pending.
    #[error("request id already pending: {0}")]
    DuplicateRequestId(String),

    /// The response did not have the shape the request expects.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid session configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::MalformedPayload(message) | FrameError::Encode(message) => {
                SessionError::MalformedPayload(message)
            }
            FrameError::Io(source) => SessionError::Transport(TransportError::Io(source)),
            FrameError::Transport(source) => SessionError::Transport(source),
            framing @ (FrameError::Framing { .. } | FrameError::Truncated { .. }) => {
                SessionError::Framing(framing.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
