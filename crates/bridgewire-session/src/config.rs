use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bridgewire_frame::{EncodingMode, FramerConfig, DEFAULT_MAX_MESSAGE_SIZE, MIN_DOCUMENT_SIZE};

use crate::error::{Result, SessionError};

/// Default bridge endpoint.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:9090";
/// Default deadline for subscribe and service call requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default capacity of the session event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Kind of connection to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportKind {
    /// Raw TCP byte stream; endpoint is `host:port`.
    Tcp,
    /// WebSocket; endpoint is a `ws://` or `wss://` URL.
    #[default]
    WebSocket,
}

impl TransportKind {
    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportKind::Tcp),
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            other => Err(format!(
                "unknown transport '{other}' (expected tcp|websocket)"
            )),
        }
    }
}

/// Everything a session needs to know at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Encoding of every message; fixed for the session lifetime.
    pub encoding: EncodingMode,
    /// Transport to connect with.
    pub transport: TransportKind,
    /// Where to connect.
    pub endpoint: String,
    /// Deadline for subscribe and service call responses. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Largest binary document accepted from a byte stream.
    pub max_message_size: usize,
    /// Buffered diagnostic events per subscriber.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            encoding: EncodingMode::Binary,
            transport: TransportKind::WebSocket,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// TCP session against `host:port`.
    pub fn tcp(endpoint: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Tcp,
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// WebSocket session against a `ws://` URL.
    pub fn websocket(url: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::WebSocket,
            endpoint: url.into(),
            ..Self::default()
        }
    }

    pub fn with_encoding(mut self, encoding: EncodingMode) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity;
        self
    }

    /// Framer settings derived from this configuration.
    pub fn framer_config(&self) -> FramerConfig {
        FramerConfig {
            max_message_size: self.max_message_size,
        }
    }

    /// Reject settings no session can run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_message_size < MIN_DOCUMENT_SIZE || self.max_message_size > i32::MAX as usize {
            return Err(SessionError::Config(format!(
                "max_message_size must be within {MIN_DOCUMENT_SIZE}..={}, got {}",
                i32::MAX,
                self.max_message_size
            )));
        }
        if self.event_capacity == 0 {
            return Err(SessionError::Config(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout == Some(Duration::ZERO) {
            return Err(SessionError::Config(
                "request_timeout must be non-zero (use None to wait forever)".to_string(),
            ));
        }
        Ok(())
    }
}
