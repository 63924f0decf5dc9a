//! Client adapter for the rosbridge-style bridge protocol.
//!
//! bridgewire advertises topics, publishes, subscribes and calls services on a
//! bridge server over TCP or WebSocket, with every message encoded as JSON
//! (text mode) or BSON (binary mode).
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream and framed-message channels (TCP, WebSocket, in-memory)
//! - [`frame`]: protocol messages, the JSON/BSON codec and stream framing
//! - [`schema`]: typed record conversion and optional JSON Schema validation
//! - [`session`]: topic registry, request correlation and the session façade
//!
//! ```no_run
//! use bridgewire::prelude::*;
//! use serde_json::json;
//!
//! # async fn demo() -> bridgewire::session::Result<()> {
//! let config = SessionConfig::tcp("127.0.0.1:9090").with_encoding(EncodingMode::Binary);
//! let session = connect(config).await?;
//! let sum = session
//!     .call_service_value("/add_two_ints", json!({"a": 20, "b": 22}))
//!     .await?;
//! println!("{sum}");
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use bridgewire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use bridgewire_frame::*;
}

/// Re-export schema types.
pub mod schema {
    pub use bridgewire_schema::*;
}

/// Re-export session types.
pub mod session {
    pub use bridgewire_session::*;
}

/// The types most programs need.
pub mod prelude {
    pub use bridgewire_frame::{EncodingMode, ProtocolMessage};
    pub use bridgewire_schema::{BridgeMessage, SchemaRegistry};
    pub use bridgewire_session::{
        connect, connect_with_schemas, Session, SessionConfig, SessionError, SessionEvent,
        TransportKind,
    };
}
