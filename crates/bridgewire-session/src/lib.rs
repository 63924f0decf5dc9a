//! Bridge protocol client sessions.
//!
//! A [`Session`] composes a transport, the codec for one encoding, a
//! [`TopicRegistry`] and a [`Correlator`]. It advertises topics, publishes,
//! subscribes for single deliveries and calls services; a background task
//! reads incoming messages and hands each response to the caller waiting
//! for it.
//!
//! ```no_run
//! use bridgewire_session::{connect, SessionConfig};
//! use serde_json::json;
//!
//! # async fn demo() -> bridgewire_session::Result<()> {
//! let session = connect(SessionConfig::tcp("127.0.0.1:9090")).await?;
//! session
//!     .publish_value("/chatter", "std_msgs/String", json!({"data": "hello"}))
//!     .await?;
//! let sum = session
//!     .call_service_value("/add_two_ints", json!({"a": 20, "b": 22}))
//!     .await?;
//! println!("{sum}");
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod correlator;
pub mod error;
pub mod event;
pub mod registry;
pub mod session;

pub use config::{
    SessionConfig, TransportKind, DEFAULT_ENDPOINT, DEFAULT_EVENT_CAPACITY,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use connector::{connect, connect_with_schemas};
pub use correlator::{fresh_id, Correlator, RequestKind, ResolveOutcome, ResponseHandle};
pub use error::{Result, SessionError};
pub use event::SessionEvent;
pub use registry::{Advertisement, AdvertisementRecord, TopicRegistry};
pub use session::{Session, SessionState};
