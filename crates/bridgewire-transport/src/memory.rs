//! In-process transports, used for tests and for embedding a bridge peer
//! inside the same process.

use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};

use crate::error::TransportError;
use crate::traits::{FramedChannel, Transport, WireFrame};

/// Create a connected pair of byte-stream transports.
///
/// `max_buf_size` bounds the bytes in flight in each direction.
pub fn stream_pair(max_buf_size: usize) -> (Transport, Transport) {
    let (left, right) = tokio::io::duplex(max_buf_size);
    (Transport::stream(left), Transport::stream(right))
}

/// Create a connected pair of framed transports.
///
/// Frames sent on one side are delivered whole, in order, on the other.
pub fn framed_pair() -> (Transport, Transport) {
    let (left_tx, right_rx) = mpsc::unbounded::<WireFrame>();
    let (right_tx, left_rx) = mpsc::unbounded::<WireFrame>();

    let left = FramedChannel::new(
        left_tx.sink_map_err(|_| TransportError::Closed),
        left_rx.map(Ok),
    );
    let right = FramedChannel::new(
        right_tx.sink_map_err(|_| TransportError::Closed),
        right_rx.map(Ok),
    );

    (Transport::framed(left), Transport::framed(right))
}
