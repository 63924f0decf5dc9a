//! Transport abstraction for bridge protocol clients.
//!
//! Two shapes of channel are supported:
//! - Byte streams (TCP, in-memory duplex): an undifferentiated sequence of
//!   bytes that the frame layer must re-segment into messages.
//! - Framed channels (WebSocket, in-memory pair): every delivery is one
//!   whole message, tagged text or binary.
//!
//! This is the lowest layer of bridgewire. Everything else builds on the
//! [`Transport`] type provided here.

pub mod error;
pub mod memory;
pub mod tcp;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod ws;

pub use error::{Result, TransportError};
pub use memory::{framed_pair, stream_pair};
pub use tcp::connect_tcp;
pub use traits::{
    BoxedByteStream, ByteStream, FrameSink, FrameSource, FramedChannel, Transport,
    TransportReader, TransportWriter, WireFrame,
};

#[cfg(feature = "websocket")]
pub use ws::connect_websocket;
