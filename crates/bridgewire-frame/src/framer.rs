use bridgewire_transport::{BoxedByteStream, FrameSource, TransportReader, WireFrame};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::ReadHalf;
use tokio_util::codec::FramedRead;

use crate::block::{DocumentCodec, ReadBoundaryCodec, DEFAULT_MAX_MESSAGE_SIZE};
use crate::encoding::EncodingMode;
use crate::error::{FrameError, Result};

const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Which decode path a block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Binary,
}

/// One complete message worth of bytes, ready for a single decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBlock {
    pub kind: BlockKind,
    pub bytes: Bytes,
}

impl MessageBlock {
    /// A block for the text decode path.
    pub fn text(bytes: Bytes) -> Self {
        Self {
            kind: BlockKind::Text,
            bytes,
        }
    }

    /// A block for the binary decode path.
    pub fn binary(bytes: Bytes) -> Self {
        Self {
            kind: BlockKind::Binary,
            bytes,
        }
    }

    fn from_frame(frame: WireFrame) -> Self {
        match frame {
            WireFrame::Text(text) => Self::text(Bytes::from(text)),
            WireFrame::Binary(data) => Self::binary(data),
        }
    }
}

/// Configuration for the framer.
#[derive(Debug, Clone)]
pub struct FramerConfig {
    /// Largest binary document accepted from a byte stream. Default: 16 MiB.
    pub max_message_size: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

enum Source {
    Documents(FramedRead<ReadHalf<BoxedByteStream>, DocumentCodec>),
    ReadBoundaries(FramedRead<ReadHalf<BoxedByteStream>, ReadBoundaryCodec>),
    Frames(FrameSource),
}

/// Turns a transport's read half into a sequence of message blocks.
///
/// - Framed transports: every frame is one block (pass-through).
/// - Byte stream, binary encoding: blocks are cut at the length prefixes.
/// - Byte stream, text encoding: every read is one block (best-effort).
///
/// The sequence ends at end-of-stream or at the first error; once ended it
/// yields nothing further.
pub struct Framer {
    source: Source,
    finished: bool,
}

impl Framer {
    /// Create a framer with default configuration.
    pub fn new(reader: TransportReader, mode: EncodingMode) -> Self {
        Self::with_config(reader, mode, FramerConfig::default())
    }

    /// Create a framer with explicit configuration.
    pub fn with_config(reader: TransportReader, mode: EncodingMode, config: FramerConfig) -> Self {
        let source = match (reader, mode) {
            (TransportReader::Framed(frames), _) => Source::Frames(frames),
            (TransportReader::Stream(read), EncodingMode::Binary) => {
                Source::Documents(FramedRead::with_capacity(
                    read,
                    DocumentCodec::new(config.max_message_size),
                    READ_BUFFER_CAPACITY,
                ))
            }
            (TransportReader::Stream(read), EncodingMode::Text) => {
                Source::ReadBoundaries(FramedRead::with_capacity(
                    read,
                    ReadBoundaryCodec,
                    READ_BUFFER_CAPACITY,
                ))
            }
        };

        Self {
            source,
            finished: false,
        }
    }

    /// Next complete block, `None` once the sequence has ended.
    pub async fn next_block(&mut self) -> Option<Result<MessageBlock>> {
        if self.finished {
            return None;
        }

        let next = match &mut self.source {
            Source::Documents(read) => read
                .next()
                .await
                .map(|res| res.map(MessageBlock::binary)),
            Source::ReadBoundaries(read) => read
                .next()
                .await
                .map(|res| res.map(MessageBlock::text)),
            Source::Frames(frames) => frames.next().await.map(|res| {
                res.map(MessageBlock::from_frame)
                    .map_err(FrameError::Transport)
            }),
        };

        match &next {
            Some(Ok(block)) => {
                tracing::trace!(kind = ?block.kind, len = block.bytes.len(), "block framed");
            }
            Some(Err(err)) => {
                tracing::debug!(error = %err, "framer stopped on error");
                self.finished = true;
            }
            None => {
                tracing::debug!("framer reached end of stream");
                self.finished = true;
            }
        }
        next
    }

    /// True once the sequence has ended.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Convert into a lazy stream of blocks.
    pub fn into_stream(self) -> impl Stream<Item = Result<MessageBlock>> + Send {
        futures::stream::unfold(self, |mut framer| async move {
            framer.next_block().await.map(|item| (item, framer))
        })
    }
}

#[cfg(test)]
mod tests {
    use bridgewire_transport::{framed_pair, stream_pair, Transport};
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::codec::{encode_binary, Codec};
    use crate::message::ProtocolMessage;

    fn reader_of(transport: Transport) -> TransportReader {
        transport.split().0
    }

    fn messages(n: usize) -> Vec<ProtocolMessage> {
        (0..n)
            .map(|i| {
                ProtocolMessage::publish(
                    format!("/topic_{i}"),
                    json!({"seq": i, "data": "x".repeat(i * 37)}),
                )
            })
            .collect()
    }

    async fn feed_in_chunks(transport: Transport, wire: Vec<u8>, chunk: usize) {
        let Transport::Stream(mut stream) = transport else {
            panic!("expected stream transport");
        };
        for piece in wire.chunks(chunk) {
            stream.write_all(piece).await.unwrap();
            stream.flush().await.unwrap();
            tokio::task::yield_now().await;
        }
        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn binary_stream_recovers_boundaries_for_any_chunking() {
        let msgs = messages(6);
        let encoded: Vec<Vec<u8>> = msgs.iter().map(|m| encode_binary(m).unwrap()).collect();
        let wire: Vec<u8> = encoded.iter().flatten().copied().collect();

        for chunk in [1usize, 2, 3, 5, 7, 64, wire.len()] {
            let (client, server) = stream_pair(256);
            let writer = tokio::spawn(feed_in_chunks(server, wire.clone(), chunk));

            let mut framer = Framer::new(reader_of(client), EncodingMode::Binary);
            let codec = Codec::new(EncodingMode::Binary);
            let mut decoded = Vec::new();
            while let Some(block) = framer.next_block().await {
                let block = block.unwrap();
                assert_eq!(block.kind, BlockKind::Binary);
                assert_eq!(block.bytes.as_ref(), encoded[decoded.len()].as_slice());
                decoded.push(codec.decode_block(&block).unwrap());
            }

            writer.await.unwrap();
            assert_eq!(decoded, msgs, "chunk size {chunk}");
            assert!(framer.is_finished());
        }
    }

    #[tokio::test]
    async fn oversized_prefix_ends_sequence_with_framing_error() {
        let (client, server) = stream_pair(256);
        let good = encode_binary(&messages(1)[0]).unwrap();
        let mut wire = good.clone();
        wire.extend_from_slice(&4096i32.to_le_bytes());
        wire.extend_from_slice(&good);
        tokio::spawn(feed_in_chunks(server, wire, 16));

        let config = FramerConfig {
            max_message_size: 1024,
        };
        let mut framer = Framer::with_config(reader_of(client), EncodingMode::Binary, config);

        assert!(framer.next_block().await.unwrap().is_ok());
        let err = framer.next_block().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::Framing { declared: 4096, max: 1024 }));
        assert!(framer.next_block().await.is_none());
        assert!(framer.is_finished());
    }

    #[tokio::test]
    async fn negative_prefix_ends_sequence_with_framing_error() {
        let (client, server) = stream_pair(64);
        tokio::spawn(feed_in_chunks(server, (-20i32).to_le_bytes().to_vec(), 4));

        let mut framer = Framer::new(reader_of(client), EncodingMode::Binary);
        let err = framer.next_block().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::Framing { declared: -20, .. }));
        assert!(framer.next_block().await.is_none());
    }

    #[tokio::test]
    async fn eof_mid_document_is_truncation() {
        let (client, server) = stream_pair(256);
        let good = encode_binary(&messages(1)[0]).unwrap();
        tokio::spawn(feed_in_chunks(server, good[..good.len() - 3].to_vec(), 8));

        let mut framer = Framer::new(reader_of(client), EncodingMode::Binary);
        let err = framer.next_block().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::Truncated { .. }));
        assert!(framer.next_block().await.is_none());
    }

    #[tokio::test]
    async fn text_stream_treats_a_read_as_one_block() {
        let (client, server) = stream_pair(1024);
        let Transport::Stream(mut stream) = server else {
            panic!("expected stream transport");
        };
        let text = br#"{"op":"publish","topic":"/t","msg":{"data":"hi"}}"#;
        stream.write_all(text).await.unwrap();
        stream.shutdown().await.unwrap();

        let mut framer = Framer::new(reader_of(client), EncodingMode::Text);
        let block = framer.next_block().await.unwrap().unwrap();
        assert_eq!(block.kind, BlockKind::Text);
        assert_eq!(block.bytes.as_ref(), text);
        assert!(framer.next_block().await.is_none());
    }

    #[tokio::test]
    async fn framed_transport_passes_frames_through_with_kind() {
        let (client, server) = framed_pair();
        let Transport::Framed(mut server) = server else {
            panic!("expected framed transport");
        };
        server
            .send(WireFrame::Text("{\"a\":1}".to_string()))
            .await
            .unwrap();
        server
            .send(WireFrame::Binary(Bytes::from_static(b"\x05\x00\x00\x00\x00")))
            .await
            .unwrap();
        drop(server);

        let blocks: Vec<MessageBlock> = Framer::new(reader_of(client), EncodingMode::Binary)
            .into_stream()
            .map(|block| block.unwrap())
            .collect()
            .await;

        assert_eq!(
            blocks,
            vec![
                MessageBlock::text(Bytes::from_static(b"{\"a\":1}")),
                MessageBlock::binary(Bytes::from_static(b"\x05\x00\x00\x00\x00")),
            ]
        );
    }
}
