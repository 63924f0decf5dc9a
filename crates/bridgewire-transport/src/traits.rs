use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::error::{Result, TransportError};

/// Any bidirectional async byte stream (TCP socket, duplex pipe, ...).
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased byte stream.
pub type BoxedByteStream = Box<dyn ByteStream>;

/// One delivery on a framed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// A text frame (UTF-8).
    Text(String),
    /// A binary frame.
    Binary(Bytes),
}

impl WireFrame {
    /// True for binary frames.
    pub fn is_binary(&self) -> bool {
        matches!(self, WireFrame::Binary(_))
    }

    /// Frame payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            WireFrame::Text(text) => text.len(),
            WireFrame::Binary(data) => data.len(),
        }
    }

    /// True when the frame carries no payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the frame and return its raw bytes.
    pub fn into_bytes(self) -> Bytes {
        match self {
            WireFrame::Text(text) => Bytes::from(text),
            WireFrame::Binary(data) => data,
        }
    }
}

/// Outgoing half of a framed channel.
pub type FrameSink = Pin<Box<dyn Sink<WireFrame, Error = TransportError> + Send>>;

/// Incoming half of a framed channel. `None` means the peer closed.
pub type FrameSource = Pin<Box<dyn Stream<Item = Result<WireFrame>> + Send>>;

/// A message-oriented channel: one send is one delivery on the other side.
pub struct FramedChannel {
    sink: FrameSink,
    source: FrameSource,
}

impl FramedChannel {
    /// Build a framed channel from any frame sink and frame stream.
    pub fn new<Si, St>(sink: Si, source: St) -> Self
    where
        Si: Sink<WireFrame, Error = TransportError> + Send + 'static,
        St: Stream<Item = Result<WireFrame>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            source: Box::pin(source),
        }
    }

    /// Send one frame.
    pub async fn send(&mut self, frame: WireFrame) -> Result<()> {
        self.sink.send(frame).await
    }

    /// Receive the next frame, or `None` once the peer has closed.
    pub async fn recv(&mut self) -> Option<Result<WireFrame>> {
        self.source.next().await
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (FrameSink, FrameSource) {
        (self.sink, self.source)
    }
}

impl fmt::Debug for FramedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramedChannel").finish_non_exhaustive()
    }
}

/// A connected transport, either a raw byte stream or a framed channel.
pub enum Transport {
    /// Raw byte stream (TCP-like). Message boundaries are not preserved.
    Stream(BoxedByteStream),
    /// Framed channel (WebSocket-like). Each delivery is one message.
    Framed(FramedChannel),
}

impl Transport {
    /// Wrap any byte stream.
    pub fn stream<S: ByteStream>(stream: S) -> Self {
        Transport::Stream(Box::new(stream))
    }

    /// Wrap a framed channel.
    pub fn framed(channel: FramedChannel) -> Self {
        Transport::Framed(channel)
    }

    /// True for framed transports.
    pub fn is_framed(&self) -> bool {
        matches!(self, Transport::Framed(_))
    }

    /// Short name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Transport::Stream(_) => "stream",
            Transport::Framed(_) => "framed",
        }
    }

    /// Split into a reader half (for the receive loop) and a writer half.
    pub fn split(self) -> (TransportReader, TransportWriter) {
        match self {
            Transport::Stream(stream) => {
                let (read, write) = tokio::io::split(stream);
                (TransportReader::Stream(read), TransportWriter::Stream(write))
            }
            Transport::Framed(channel) => {
                let (sink, source) = channel.split();
                (TransportReader::Framed(source), TransportWriter::Framed(sink))
            }
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("kind", &self.kind_name())
            .finish()
    }
}

/// Read half of a [`Transport`].
pub enum TransportReader {
    /// Byte-stream read half.
    Stream(ReadHalf<BoxedByteStream>),
    /// Framed-channel frame source.
    Framed(FrameSource),
}

impl fmt::Debug for TransportReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportReader::Stream(_) => f.write_str("TransportReader::Stream"),
            TransportReader::Framed(_) => f.write_str("TransportReader::Framed"),
        }
    }
}

/// Write half of a [`Transport`].
pub enum TransportWriter {
    /// Byte-stream write half.
    Stream(WriteHalf<BoxedByteStream>),
    /// Framed-channel frame sink.
    Framed(FrameSink),
}

impl TransportWriter {
    /// Send a text message. On a byte stream the UTF-8 bytes are written as-is.
    pub async fn send_text(&mut self, text: String) -> Result<()> {
        match self {
            TransportWriter::Stream(write) => write_all_flush(write, text.as_bytes()).await,
            TransportWriter::Framed(sink) => sink.send(WireFrame::Text(text)).await,
        }
    }

    /// Send a binary message. On a byte stream the bytes are written as-is.
    pub async fn send_binary(&mut self, data: Bytes) -> Result<()> {
        match self {
            TransportWriter::Stream(write) => write_all_flush(write, &data).await,
            TransportWriter::Framed(sink) => sink.send(WireFrame::Binary(data)).await,
        }
    }

    /// Close the write direction. The peer observes end-of-stream / close.
    pub async fn close(&mut self) -> Result<()> {
        match self {
            TransportWriter::Stream(write) => write.shutdown().await.map_err(Into::into),
            TransportWriter::Framed(sink) => sink.close().await,
        }
    }

    /// True for framed transports.
    pub fn is_framed(&self) -> bool {
        matches!(self, TransportWriter::Framed(_))
    }
}

impl fmt::Debug for TransportWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportWriter::Stream(_) => f.write_str("TransportWriter::Stream"),
            TransportWriter::Framed(_) => f.write_str("TransportWriter::Framed"),
        }
    }
}

async fn write_all_flush(write: &mut WriteHalf<BoxedByteStream>, data: &[u8]) -> Result<()> {
    write.write_all(data).await?;
    write.flush().await?;
    Ok(())
}
