use std::sync::Arc;

use bridgewire_schema::SchemaRegistry;
use bridgewire_transport::{connect_tcp, Transport};

use crate::config::{SessionConfig, TransportKind};
#[cfg(not(feature = "websocket"))]
use crate::error::SessionError;
use crate::error::Result;
use crate::session::Session;

/// Connect to the bridge described by `config` and open a session.
pub async fn connect(config: SessionConfig) -> Result<Session> {
    connect_with_schemas(config, Arc::new(SchemaRegistry::new())).await
}

/// Connect and open a session that converts typed records through `schemas`.
pub async fn connect_with_schemas(
    config: SessionConfig,
    schemas: Arc<SchemaRegistry>,
) -> Result<Session> {
    config.validate()?;
    let transport = open_transport(&config).await?;
    tracing::info!(
        transport = %config.transport,
        endpoint = %config.endpoint,
        encoding = %config.encoding,
        "connected to bridge"
    );
    Session::open_with_schemas(transport, config, schemas)
}

async fn open_transport(config: &SessionConfig) -> Result<Transport> {
    match config.transport {
        TransportKind::Tcp => Ok(connect_tcp(&config.endpoint).await?),
        TransportKind::WebSocket => open_websocket(&config.endpoint).await,
    }
}

#[cfg(feature = "websocket")]
async fn open_websocket(url: &str) -> Result<Transport> {
    Ok(bridgewire_transport::connect_websocket(url).await?)
}

#[cfg(not(feature = "websocket"))]
async fn open_websocket(url: &str) -> Result<Transport> {
    Err(SessionError::Config(format!(
        "cannot connect to {url}: built without the `websocket` feature"
    )))
}
