use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bridgewire_frame::{
    encode_binary, encode_text, Codec, EncodingMode, FrameError, Framer, ProtocolMessage,
    OP_CALL_SERVICE, OP_SUBSCRIBE,
};
use bridgewire_schema::{BridgeMessage, SchemaRegistry};
use bridgewire_transport::{Transport, TransportWriter};
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::correlator::{fresh_id, Correlator, RequestKind, ResolveOutcome};
use crate::error::{Result, SessionError};
use crate::event::SessionEvent;
use crate::registry::{AdvertisementRecord, TopicRegistry};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Operations are accepted.
    Open,
    /// Shutting down, either by `close()` or because the connection failed.
    Closing,
    /// Fully closed.
    Closed,
}

struct Shared {
    config: SessionConfig,
    codec: Codec,
    writer: tokio::sync::Mutex<TransportWriter>,
    topics: Mutex<TopicRegistry>,
    correlator: Correlator,
    schemas: Arc<SchemaRegistry>,
    state: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
    receiver: Mutex<Option<JoinHandle<()>>>,
    /// Held for the whole teardown; `true` once it finished.
    close_done: tokio::sync::Mutex<bool>,
}

/// A bridge protocol client session over one transport.
///
/// Cloning is cheap; clones share the connection, so several tasks can
/// publish, subscribe and call services concurrently. Incoming messages are
/// read by a background task that routes responses to waiting callers.
///
/// Advertised topics are only unadvertised by an explicit [`Session::close`];
/// dropping a session does not send anything.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Start a session over an already connected transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(transport: Transport, config: SessionConfig) -> Result<Self> {
        Self::open_with_schemas(transport, config, Arc::new(SchemaRegistry::new()))
    }

    /// Start a session that converts typed records through `schemas`.
    pub fn open_with_schemas(
        transport: Transport,
        config: SessionConfig,
        schemas: Arc<SchemaRegistry>,
    ) -> Result<Self> {
        config.validate()?;

        let transport_kind = transport.kind_name();
        let (reader, writer) = transport.split();
        let framer = Framer::with_config(reader, config.encoding, config.framer_config());
        let codec = Codec::new(config.encoding);
        let (events, _) = broadcast::channel(config.event_capacity);
        let correlator = Correlator::new();
        let state = Arc::new(Mutex::new(SessionState::Open));
        let shutdown = CancellationToken::new();

        let receiver = tokio::spawn(receive_loop(
            framer,
            codec,
            correlator.clone(),
            events.clone(),
            state.clone(),
            shutdown.clone(),
        ));

        tracing::debug!(
            transport = transport_kind,
            encoding = %config.encoding,
            "session opened"
        );
        let _ = events.send(SessionEvent::Connected {
            transport: transport_kind,
        });

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                codec,
                writer: tokio::sync::Mutex::new(writer),
                topics: Mutex::new(TopicRegistry::new()),
                correlator,
                schemas,
                state,
                events,
                shutdown,
                receiver: Mutex::new(Some(receiver)),
                close_done: tokio::sync::Mutex::new(false),
            }),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *lock(&self.shared.state)
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Encoding used for every message of this session.
    pub fn encoding(&self) -> EncodingMode {
        self.shared.codec.mode()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.shared.schemas
    }

    /// Subscribe to diagnostic events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Snapshot of the live advertisements.
    pub fn advertisements(&self) -> Vec<AdvertisementRecord> {
        lock(&self.shared.topics).all_records()
    }

    pub fn is_advertised(&self, topic: &str) -> bool {
        lock(&self.shared.topics).is_advertised(topic)
    }

    /// Number of subscribe and service call requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    /// Advertise `topic` as `msg_type` and return the advertisement id.
    ///
    /// If the topic is already advertised nothing is sent and the returned id
    /// is not recorded.
    pub async fn advertise(&self, topic: &str, msg_type: &str) -> Result<String> {
        self.ensure_open()?;

        let advertisement = lock(&self.shared.topics).advertise(topic, msg_type);
        if let Some(message) = advertisement.message {
            if let Err(err) = self.send(&message).await {
                lock(&self.shared.topics).discard(&advertisement.id);
                return Err(err);
            }
            tracing::debug!(id = %advertisement.id, topic, msg_type, "advertised topic");
        }
        Ok(advertisement.id)
    }

    /// Withdraw the advertisement `id`. Unknown ids are ignored.
    ///
    /// Also works while the session is closing: the record is removed first
    /// and the unadvertise is still attempted, so a send failure is returned
    /// but the topic is no longer advertised.
    pub async fn unadvertise(&self, id: &str) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Err(SessionError::SessionClosed);
        }

        let message = lock(&self.shared.topics).unadvertise(id);
        match message {
            Some(message) => self.send(&message).await,
            None => Ok(()),
        }
    }

    /// Publish a generic payload, advertising the topic first if needed.
    pub async fn publish_value(&self, topic: &str, msg_type: &str, payload: Value) -> Result<()> {
        self.ensure_open()?;
        self.ensure_advertised(topic, msg_type).await?;
        self.send(&ProtocolMessage::publish(topic, payload)).await
    }

    /// Publish a typed record; its type name comes from the schema registry.
    pub async fn publish<T: BridgeMessage>(&self, topic: &str, record: &T) -> Result<()> {
        let schemas = &self.shared.schemas;
        let msg_type = schemas.type_name_of(record);
        let payload = schemas.to_generic_payload(record)?;
        self.publish_value(topic, msg_type, payload).await
    }

    /// Wait for the next message on `topic` and return its generic payload.
    ///
    /// Advertises the topic if needed, subscribes, waits for one delivery
    /// (bounded by the configured request timeout) and unsubscribes again.
    pub async fn subscribe_value(&self, topic: &str, msg_type: &str) -> Result<Value> {
        self.ensure_open()?;
        self.ensure_advertised(topic, msg_type).await?;

        let id = fresh_id(OP_SUBSCRIBE);
        let handle = self.shared.correlator.register(
            &id,
            RequestKind::Subscribe,
            topic,
            self.shared.config.request_timeout,
        )?;
        let request = ProtocolMessage::subscribe(id.as_str(), topic, Some(msg_type.to_string()));
        self.send(&request).await?;
        tracing::debug!(id = %id, topic, "subscribe sent");

        let outcome = handle.wait().await;

        if self.is_open() {
            if let Err(err) = self.send(&ProtocolMessage::unsubscribe(id.as_str(), topic)).await {
                tracing::warn!(id = %id, topic, error = %err, "unsubscribe failed");
            }
        }

        match outcome? {
            ProtocolMessage::Publish { msg, .. } => Ok(msg),
            other => Err(SessionError::UnexpectedResponse(format!(
                "expected publish for subscribe {id}, got {}",
                other.op()
            ))),
        }
    }

    /// Wait for the next message on `topic` and convert it to `T`.
    pub async fn subscribe<T: BridgeMessage>(&self, topic: &str) -> Result<T> {
        let payload = self.subscribe_value(topic, T::TYPE_NAME).await?;
        Ok(self.shared.schemas.from_generic_payload(T::TYPE_NAME, payload)?)
    }

    /// Call `service` with generic `args` and return the response values.
    ///
    /// A response with `result: false` fails with `ServiceCallFailed`.
    pub async fn call_service_value(&self, service: &str, args: Value) -> Result<Value> {
        self.ensure_open()?;

        let id = fresh_id(OP_CALL_SERVICE);
        let handle = self.shared.correlator.register(
            &id,
            RequestKind::ServiceCall,
            service,
            self.shared.config.request_timeout,
        )?;
        self.send(&ProtocolMessage::call_service(id.as_str(), service, args))
            .await?;
        tracing::debug!(id = %id, service, "service call sent");

        match handle.wait().await? {
            ProtocolMessage::ServiceResponse {
                result: Some(false),
                values,
                ..
            } => Err(SessionError::ServiceCallFailed {
                service: service.to_string(),
                values,
            }),
            ProtocolMessage::ServiceResponse { values, .. } => Ok(values),
            other => Err(SessionError::UnexpectedResponse(format!(
                "expected service_response for call {id}, got {}",
                other.op()
            ))),
        }
    }

    /// Call `service` with a typed request and convert the response.
    pub async fn call_service<Req, Resp>(&self, service: &str, request: &Req) -> Result<Resp>
    where
        Req: BridgeMessage,
        Resp: BridgeMessage,
    {
        let args = self.shared.schemas.to_generic_payload(request)?;
        let values = self.call_service_value(service, args).await?;
        Ok(self
            .shared
            .schemas
            .from_generic_payload(Resp::TYPE_NAME, values)?)
    }

    /// Close the session.
    ///
    /// In order: stop the receive loop, cancel pending requests, unadvertise
    /// every remaining topic, close the transport. Every step runs even if an
    /// earlier one failed; the first error is returned. Closing twice is a
    /// no-op; a concurrent second call returns once the first has finished.
    pub async fn close(&self) -> Result<()> {
        let mut done = self.shared.close_done.lock().await;
        if *done {
            return Ok(());
        }
        self.set_state(SessionState::Closing);

        let mut first_error: Option<SessionError> = None;

        self.shared.shutdown.cancel();
        let receiver = lock(&self.shared.receiver).take();
        if let Some(receiver) = receiver {
            if let Err(err) = receiver.await {
                tracing::warn!(error = %err, "receive loop ended abnormally");
            }
        }

        let cancelled = self.shared.correlator.close();
        if cancelled > 0 {
            tracing::debug!(count = cancelled, "cancelled pending requests");
        }

        let unadvertise = lock(&self.shared.topics).drain();
        for message in &unadvertise {
            if let Err(err) = self.send(message).await {
                tracing::warn!(
                    id = message.id().unwrap_or_default(),
                    error = %err,
                    "unadvertise failed during close"
                );
                first_error.get_or_insert(err);
            }
        }

        if let Err(err) = self.shared.writer.lock().await.close().await {
            tracing::debug!(error = %err, "transport close failed");
            first_error.get_or_insert(err.into());
        }

        self.set_state(SessionState::Closed);
        *done = true;
        tracing::debug!("session closed");

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SessionError::SessionClosed)
        }
    }

    fn set_state(&self, state: SessionState) {
        *lock(&self.shared.state) = state;
    }

    async fn ensure_advertised(&self, topic: &str, msg_type: &str) -> Result<()> {
        if !self.is_advertised(topic) {
            self.advertise(topic, msg_type).await?;
        }
        Ok(())
    }

    async fn send(&self, message: &ProtocolMessage) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        match self.shared.codec.mode() {
            EncodingMode::Text => writer.send_text(encode_text(message)?).await?,
            EncodingMode::Binary => {
                writer
                    .send_binary(Bytes::from(encode_binary(message)?))
                    .await?
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("encoding", &self.encoding())
            .field("pending", &self.pending_requests())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

async fn receive_loop(
    mut framer: Framer,
    codec: Codec,
    correlator: Correlator,
    events: broadcast::Sender<SessionEvent>,
    state: Arc<Mutex<SessionState>>,
    shutdown: CancellationToken,
) {
    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break "session closed".to_string(),
            next = framer.next_block() => next,
        };

        let block = match next {
            None => break "connection closed by peer".to_string(),
            Some(Ok(block)) => block,
            Some(Err(err)) => {
                if matches!(err, FrameError::Framing { .. } | FrameError::Truncated { .. }) {
                    tracing::error!(error = %err, "framing error, closing connection");
                    let _ = events.send(SessionEvent::FramingError {
                        error: err.to_string(),
                    });
                } else {
                    tracing::warn!(error = %err, "transport read failed");
                }
                break err.to_string();
            }
        };

        let message = match codec.decode_block(&block) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(
                    len = block.bytes.len(),
                    error = %err,
                    "dropping undecodable message"
                );
                let _ = events.send(SessionEvent::DecodeFailed {
                    error: err.to_string(),
                });
                continue;
            }
        };

        let op = message.op();
        let id = message.id().map(str::to_owned);
        let topic = message.topic().map(str::to_owned);
        match correlator.dispatch(message) {
            ResolveOutcome::Delivered(count) => {
                tracing::trace!(op, id = ?id, topic = ?topic, count, "delivered");
            }
            ResolveOutcome::Duplicate => {
                let id = id.unwrap_or_default();
                tracing::debug!(op, id = %id, "duplicate response dropped");
                let _ = events.send(SessionEvent::DuplicateResponse { id });
            }
            ResolveOutcome::Unsolicited => {
                tracing::debug!(op, id = ?id, topic = ?topic, "unsolicited message");
                let _ = events.send(SessionEvent::Unsolicited { op, id, topic });
            }
        }
    };

    if !shutdown.is_cancelled() {
        *lock(&state) = SessionState::Closing;
        let cancelled = correlator.close();
        tracing::debug!(reason = %reason, cancelled, "receive loop stopped");
    }
    let _ = events.send(SessionEvent::Disconnected { reason });
}
