//! WebSocket transport (feature `websocket`).

use bytes::Bytes;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Result, TransportError};
use crate::traits::{FramedChannel, Transport, WireFrame};

/// Connect to a WebSocket endpoint (`ws://host:port`).
///
/// Text and binary messages map one-to-one onto [`WireFrame`]s. Ping, pong
/// and close control frames are handled by the WebSocket layer and never
/// surface as deliveries.
pub async fn connect_websocket(url: &str) -> Result<Transport> {
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(TransportError::InvalidEndpoint {
            endpoint: url.to_string(),
            reason: "websocket endpoints must start with ws:// or wss://".to_string(),
        });
    }

    let (socket, _response) =
        tokio_tungstenite::connect_async(url)
            .await
            .map_err(|err| TransportError::Connect {
                endpoint: url.to_string(),
                source: std::io::Error::other(err),
            })?;

    let (sink, stream) = socket.split();

    let sink = sink
        .sink_map_err(|err| TransportError::WebSocket(err.to_string()))
        .with(|frame: WireFrame| future::ready(Ok::<_, TransportError>(into_message(frame))));

    let source = stream.filter_map(|item| {
        future::ready(match item {
            Ok(Message::Text(text)) => Some(Ok(WireFrame::Text(text))),
            Ok(Message::Binary(data)) => Some(Ok(WireFrame::Binary(Bytes::from(data)))),
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_)) => {
                None
            }
            Err(err) => Some(Err(TransportError::WebSocket(err.to_string()))),
        })
    });

    tracing::debug!(url, "websocket transport connected");
    Ok(Transport::framed(FramedChannel::new(sink, source)))
}

fn into_message(frame: WireFrame) -> Message {
    match frame {
        WireFrame::Text(text) => Message::Text(text),
        WireFrame::Binary(data) => Message::Binary(data.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_map_to_matching_message_kind() {
        assert!(matches!(
            into_message(WireFrame::Text("a".to_string())),
            Message::Text(text) if text == "a"
        ));
        assert!(matches!(
            into_message(WireFrame::Binary(Bytes::from_static(b"b"))),
            Message::Binary(data) if data == b"b"
        ));
    }

    #[tokio::test]
    async fn non_websocket_url_is_rejected() {
        let err = connect_websocket("127.0.0.1:9090").await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint { .. }));
    }
}
