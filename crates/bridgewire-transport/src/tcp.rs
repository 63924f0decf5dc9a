use tokio::net::TcpStream;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Connect a raw TCP byte stream to `endpoint` (`host:port`).
pub async fn connect_tcp(endpoint: &str) -> Result<Transport> {
    if endpoint.contains("://") {
        return Err(TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "tcp endpoints are host:port, not URLs".to_string(),
        });
    }

    let stream = TcpStream::connect(endpoint)
        .await
        .map_err(|source| TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;
    stream.set_nodelay(true)?;

    tracing::debug!(endpoint, "tcp transport connected");
    Ok(Transport::stream(stream))
}
