use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bridgewire_frame::ProtocolMessage;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{Result, SessionError};

/// Number of recently completed ids remembered for duplicate detection.
const RECENT_CAPACITY: usize = 256;

/// Generate a process-unique request id, `"<op>:<uuid>"`.
pub fn fresh_id(op: &str) -> String {
    format!("{op}:{}", Uuid::new_v4())
}

/// Kind of a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Subscribe,
    ServiceCall,
}

/// What [`Correlator::dispatch`] did with an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Delivered to this many waiting requests.
    Delivered(usize),
    /// The id was already resolved; the message was dropped.
    Duplicate,
    /// Nothing was waiting for this message.
    Unsolicited,
}

type Slot = oneshot::Sender<Result<ProtocolMessage>>;

struct PendingRequest {
    kind: RequestKind,
    /// Topic for subscribes, service name for calls.
    target: String,
    created_at: Instant,
    slot: Slot,
}

#[derive(Default)]
struct Pending {
    requests: HashMap<String, PendingRequest>,
    subscribes_by_topic: HashMap<String, Vec<String>>,
    recent: VecDeque<String>,
    recent_set: HashSet<String>,
    closed: bool,
}

impl Pending {
    fn take(&mut self, id: &str) -> Option<PendingRequest> {
        let request = self.requests.remove(id)?;
        if request.kind == RequestKind::Subscribe {
            if let Some(ids) = self.subscribes_by_topic.get_mut(&request.target) {
                ids.retain(|pending| pending != id);
                if ids.is_empty() {
                    self.subscribes_by_topic.remove(&request.target);
                }
            }
        }
        Some(request)
    }

    fn remember(&mut self, id: &str) {
        if !self.recent_set.insert(id.to_string()) {
            return;
        }
        self.recent.push_back(id.to_string());
        while self.recent.len() > RECENT_CAPACITY {
            if let Some(oldest) = self.recent.pop_front() {
                self.recent_set.remove(&oldest);
            }
        }
    }

    fn complete(&mut self, id: &str, outcome: Result<ProtocolMessage>) -> bool {
        let Some(request) = self.take(id) else {
            return false;
        };
        self.remember(id);
        tracing::debug!(
            id,
            kind = ?request.kind,
            target = %request.target,
            elapsed_ms = request.created_at.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "request resolved"
        );
        // The waiter may have given up already; that is not an error here.
        let _ = request.slot.send(outcome);
        true
    }

    fn is_pending_as(&self, id: &str, kind: RequestKind) -> bool {
        self.requests
            .get(id)
            .is_some_and(|request| request.kind == kind)
    }

    fn miss(&self, id: &str) -> ResolveOutcome {
        if self.recent_set.contains(id) {
            ResolveOutcome::Duplicate
        } else {
            ResolveOutcome::Unsolicited
        }
    }
}

/// Matches incoming responses to pending subscribe and service call requests.
///
/// Cheap to clone; clones share the same pending table.
#[derive(Clone, Default)]
pub struct Correlator {
    inner: Arc<Mutex<Pending>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a pending request and get the handle its caller waits on.
    ///
    /// `target` is the subscribed topic or the called service. With a
    /// `timeout`, the handle fails with `RequestTimeout` once it elapses.
    pub fn register(
        &self,
        id: &str,
        kind: RequestKind,
        target: &str,
        timeout: Option<Duration>,
    ) -> Result<ResponseHandle> {
        let mut pending = self.lock();
        if pending.closed {
            return Err(SessionError::SessionClosed);
        }
        if pending.requests.contains_key(id) {
            return Err(SessionError::DuplicateRequestId(id.to_string()));
        }

        let (slot, rx) = oneshot::channel();
        pending.requests.insert(
            id.to_string(),
            PendingRequest {
                kind,
                target: target.to_string(),
                created_at: Instant::now(),
                slot,
            },
        );
        if kind == RequestKind::Subscribe {
            pending
                .subscribes_by_topic
                .entry(target.to_string())
                .or_default()
                .push(id.to_string());
        }
        drop(pending);

        Ok(ResponseHandle {
            id: id.to_string(),
            timeout,
            rx,
            correlator: self.clone(),
        })
    }

    /// Deliver `message` to the request registered under `id`.
    pub fn resolve(&self, id: &str, message: ProtocolMessage) -> ResolveOutcome {
        let mut pending = self.lock();
        if pending.complete(id, Ok(message)) {
            ResolveOutcome::Delivered(1)
        } else {
            pending.miss(id)
        }
    }

    /// Fail the request registered under `id` with `error`.
    pub fn fail(&self, id: &str, error: SessionError) -> ResolveOutcome {
        let mut pending = self.lock();
        if pending.complete(id, Err(error)) {
            ResolveOutcome::Delivered(1)
        } else {
            pending.miss(id)
        }
    }

    /// Route an incoming message to whatever is waiting for it.
    ///
    /// - `service_response`: by id, to a pending service call only.
    /// - `publish` (a subscription delivery): by id when it carries the id of
    ///   a pending subscribe, otherwise to every subscribe pending on its topic.
    /// - `status` at error level: fails the request with a matching id.
    ///
    /// Anything else is unsolicited.
    pub fn dispatch(&self, message: ProtocolMessage) -> ResolveOutcome {
        match message {
            ProtocolMessage::ServiceResponse { id: Some(ref id), .. } => {
                let id = id.clone();
                let mut pending = self.lock();
                if pending.is_pending_as(&id, RequestKind::ServiceCall) {
                    pending.complete(&id, Ok(message));
                    ResolveOutcome::Delivered(1)
                } else if pending.requests.contains_key(&id) {
                    ResolveOutcome::Unsolicited
                } else {
                    pending.miss(&id)
                }
            }
            ProtocolMessage::Publish { ref id, ref topic, .. } => {
                let mut pending = self.lock();
                if let Some(id) = id
                    .as_deref()
                    .filter(|id| pending.is_pending_as(id, RequestKind::Subscribe))
                {
                    let id = id.to_string();
                    pending.complete(&id, Ok(message));
                    return ResolveOutcome::Delivered(1);
                }

                let waiting = pending
                    .subscribes_by_topic
                    .get(topic)
                    .cloned()
                    .unwrap_or_default();
                if waiting.is_empty() {
                    return ResolveOutcome::Unsolicited;
                }
                for id in &waiting {
                    pending.complete(id, Ok(message.clone()));
                }
                ResolveOutcome::Delivered(waiting.len())
            }
            ProtocolMessage::Status {
                id: Some(ref id),
                ref level,
                ref msg,
            } if message.is_error_status() => {
                let error = SessionError::RemoteStatus {
                    level: level.clone(),
                    message: msg.clone(),
                };
                self.fail(id, error)
            }
            _ => ResolveOutcome::Unsolicited,
        }
    }

    /// Remove a pending request and fail its handle with `Cancelled`.
    pub fn cancel(&self, id: &str) -> bool {
        self.lock().complete(id, Err(SessionError::Cancelled))
    }

    /// Remove a pending request whose deadline passed. Its handle reports
    /// `RequestTimeout`.
    pub fn expire(&self, id: &str) -> bool {
        let expired = self.lock().take(id).is_some();
        if expired {
            tracing::debug!(id, "pending request expired");
        }
        expired
    }

    /// Cancel every pending request and refuse new registrations.
    ///
    /// Returns the number of requests cancelled.
    pub fn close(&self) -> usize {
        let mut pending = self.lock();
        pending.closed = true;
        let ids: Vec<String> = pending.requests.keys().cloned().collect();
        for id in &ids {
            pending.complete(id, Err(SessionError::Cancelled));
        }
        ids.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().requests.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().requests.len()
    }
}

impl fmt::Debug for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.lock();
        f.debug_struct("Correlator")
            .field("pending", &pending.requests.len())
            .field("closed", &pending.closed)
            .finish()
    }
}

/// Waitable handle for one pending request.
///
/// Dropping the handle without waiting withdraws the request.
pub struct ResponseHandle {
    id: String,
    timeout: Option<Duration>,
    rx: oneshot::Receiver<Result<ProtocolMessage>>,
    correlator: Correlator,
}

impl ResponseHandle {
    /// Id of the request this handle waits for.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the response.
    pub async fn wait(mut self) -> Result<ProtocolMessage> {
        let received = match self.timeout {
            None => (&mut self.rx).await,
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.correlator.expire(&self.id);
                    // A response may have landed between the deadline and expire.
                    return match self.rx.try_recv() {
                        Ok(outcome) => outcome,
                        Err(_) => Err(SessionError::RequestTimeout(limit)),
                    };
                }
            },
        };

        received.unwrap_or(Err(SessionError::Cancelled))
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        self.correlator.expire(&self.id);
    }
}

impl fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(id: &str, sum: i64) -> ProtocolMessage {
        ProtocolMessage::ServiceResponse {
            id: Some(id.to_string()),
            service: "/add_two_ints".to_string(),
            values: json!({ "sum": sum }),
            result: Some(true),
        }
    }

    fn sum_of(msg: &ProtocolMessage) -> i64 {
        match msg {
            ProtocolMessage::ServiceResponse { values, .. } => values["sum"].as_i64().unwrap(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fresh_ids_are_unique_and_tagged() {
        let a = fresh_id("call_service");
        let b = fresh_id("call_service");
        assert_ne!(a, b);
        assert!(a.starts_with("call_service:"));
    }

    #[tokio::test]
    async fn out_of_order_resolution_reaches_each_caller() {
        let correlator = Correlator::new();
        let first = correlator
            .register("c1", RequestKind::ServiceCall, "/add_two_ints", None)
            .unwrap();
        let second = correlator
            .register("c2", RequestKind::ServiceCall, "/add_two_ints", None)
            .unwrap();

        assert_eq!(
            correlator.dispatch(response("c2", 2)),
            ResolveOutcome::Delivered(1)
        );
        assert_eq!(
            correlator.dispatch(response("c1", 1)),
            ResolveOutcome::Delivered(1)
        );

        assert_eq!(sum_of(&first.wait().await.unwrap()), 1);
        assert_eq!(sum_of(&second.wait().await.unwrap()), 2);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn second_resolution_is_duplicate() {
        let correlator = Correlator::new();
        let handle = correlator
            .register("c1", RequestKind::ServiceCall, "/svc", None)
            .unwrap();

        assert_eq!(
            correlator.resolve("c1", response("c1", 1)),
            ResolveOutcome::Delivered(1)
        );
        assert_eq!(
            correlator.resolve("c1", response("c1", 99)),
            ResolveOutcome::Duplicate
        );
        assert_eq!(sum_of(&handle.wait().await.unwrap()), 1);
    }

    #[test]
    fn unknown_id_is_unsolicited() {
        let correlator = Correlator::new();
        assert_eq!(
            correlator.dispatch(response("nobody", 0)),
            ResolveOutcome::Unsolicited
        );
        let status = ProtocolMessage::Status {
            id: None,
            level: "info".to_string(),
            msg: "hello".to_string(),
        };
        assert_eq!(correlator.dispatch(status), ResolveOutcome::Unsolicited);
    }

    #[test]
    fn duplicate_pending_id_is_rejected() {
        let correlator = Correlator::new();
        let _handle = correlator
            .register("x", RequestKind::ServiceCall, "/svc", None)
            .unwrap();
        assert!(matches!(
            correlator.register("x", RequestKind::ServiceCall, "/svc", None),
            Err(SessionError::DuplicateRequestId(ref id)) if id == "x"
        ));
    }

    #[tokio::test]
    async fn delivery_routes_by_topic_to_all_waiting_subscribes() {
        let correlator = Correlator::new();
        let a = correlator
            .register("s1", RequestKind::Subscribe, "/chatter", None)
            .unwrap();
        let b = correlator
            .register("s2", RequestKind::Subscribe, "/chatter", None)
            .unwrap();
        let other = correlator
            .register("s3", RequestKind::Subscribe, "/other", None)
            .unwrap();

        let delivery = ProtocolMessage::publish("/chatter", json!({"data": "hi"}));
        assert_eq!(
            correlator.dispatch(delivery.clone()),
            ResolveOutcome::Delivered(2)
        );
        assert_eq!(a.wait().await.unwrap(), delivery);
        assert_eq!(b.wait().await.unwrap(), delivery);

        assert!(correlator.is_pending("s3"));
        assert_eq!(correlator.dispatch(delivery), ResolveOutcome::Unsolicited);
        drop(other);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn delivery_with_pending_id_goes_to_that_request_only() {
        let correlator = Correlator::new();
        let a = correlator
            .register("s1", RequestKind::Subscribe, "/chatter", None)
            .unwrap();
        let _b = correlator
            .register("s2", RequestKind::Subscribe, "/chatter", None)
            .unwrap();

        let delivery = ProtocolMessage::Publish {
            id: Some("s1".to_string()),
            topic: "/chatter".to_string(),
            msg: json!({"data": "direct"}),
        };
        assert_eq!(correlator.dispatch(delivery), ResolveOutcome::Delivered(1));
        assert!(a.wait().await.is_ok());
        assert!(correlator.is_pending("s2"));
    }

    #[tokio::test]
    async fn response_of_the_wrong_kind_leaves_request_pending() {
        let correlator = Correlator::new();
        let subscribe = correlator
            .register("s1", RequestKind::Subscribe, "/chatter", None)
            .unwrap();
        let call = correlator
            .register("c1", RequestKind::ServiceCall, "/svc", None)
            .unwrap();

        assert_eq!(
            correlator.dispatch(response("s1", 1)),
            ResolveOutcome::Unsolicited
        );
        let stray = ProtocolMessage::Publish {
            id: Some("c1".to_string()),
            topic: "/elsewhere".to_string(),
            msg: json!({}),
        };
        assert_eq!(correlator.dispatch(stray), ResolveOutcome::Unsolicited);
        assert!(correlator.is_pending("s1"));
        assert!(correlator.is_pending("c1"));

        let delivery = ProtocolMessage::publish("/chatter", json!({"data": "hi"}));
        assert_eq!(
            correlator.dispatch(delivery.clone()),
            ResolveOutcome::Delivered(1)
        );
        assert_eq!(
            correlator.dispatch(response("c1", 5)),
            ResolveOutcome::Delivered(1)
        );
        assert_eq!(subscribe.wait().await.unwrap(), delivery);
        assert_eq!(sum_of(&call.wait().await.unwrap()), 5);
    }

    #[tokio::test]
    async fn error_status_fails_matching_request() {
        let correlator = Correlator::new();
        let handle = correlator
            .register("s1", RequestKind::Subscribe, "/missing", None)
            .unwrap();

        let status = ProtocolMessage::Status {
            id: Some("s1".to_string()),
            level: "error".to_string(),
            msg: "unknown topic".to_string(),
        };
        assert_eq!(correlator.dispatch(status), ResolveOutcome::Delivered(1));
        assert!(matches!(
            handle.wait().await,
            Err(SessionError::RemoteStatus { ref message, .. }) if message == "unknown topic"
        ));
    }

    #[tokio::test]
    async fn timeout_removes_pending_request() {
        let correlator = Correlator::new();
        let handle = correlator
            .register(
                "s1",
                RequestKind::Subscribe,
                "/quiet",
                Some(Duration::from_millis(50)),
            )
            .unwrap();

        let started = Instant::now();
        let result = handle.wait().await;
        let elapsed = started.elapsed();

        assert!(matches!(
            result,
            Err(SessionError::RequestTimeout(limit)) if limit == Duration::from_millis(50)
        ));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(
            correlator.dispatch(ProtocolMessage::publish("/quiet", json!({}))),
            ResolveOutcome::Unsolicited
        );
    }

    #[tokio::test]
    async fn cancel_fails_handle_with_cancelled() {
        let correlator = Correlator::new();
        let handle = correlator
            .register("c1", RequestKind::ServiceCall, "/svc", None)
            .unwrap();

        assert!(correlator.cancel("c1"));
        assert!(!correlator.cancel("c1"));
        assert!(matches!(handle.wait().await, Err(SessionError::Cancelled)));
    }

    #[tokio::test]
    async fn close_cancels_everything_and_refuses_new_requests() {
        let correlator = Correlator::new();
        let a = correlator
            .register("c1", RequestKind::ServiceCall, "/svc", None)
            .unwrap();
        let b = correlator
            .register("s1", RequestKind::Subscribe, "/t", None)
            .unwrap();

        assert_eq!(correlator.close(), 2);
        assert!(correlator.is_closed());
        assert!(matches!(a.wait().await, Err(SessionError::Cancelled)));
        assert!(matches!(b.wait().await, Err(SessionError::Cancelled)));
        assert!(matches!(
            correlator.register("c2", RequestKind::ServiceCall, "/svc", None),
            Err(SessionError::SessionClosed)
        ));
    }

    #[test]
    fn dropped_handle_withdraws_request() {
        let correlator = Correlator::new();
        let handle = correlator
            .register("c1", RequestKind::ServiceCall, "/svc", None)
            .unwrap();
        assert_eq!(handle.id(), "c1");
        drop(handle);
        assert!(!correlator.is_pending("c1"));
        assert_eq!(
            correlator.dispatch(response("c1", 1)),
            ResolveOutcome::Unsolicited
        );
    }

    #[test]
    fn recent_ids_are_bounded() {
        let correlator = Correlator::new();
        for i in 0..(RECENT_CAPACITY + 10) {
            let id = format!("c{i}");
            let handle = correlator
                .register(&id, RequestKind::ServiceCall, "/svc", None)
                .unwrap();
            correlator.resolve(&id, response(&id, 0));
            drop(handle);
        }
        assert_eq!(
            correlator.resolve("c0", response("c0", 0)),
            ResolveOutcome::Unsolicited
        );
        let last = format!("c{}", RECENT_CAPACITY + 9);
        assert_eq!(
            correlator.resolve(&last, response(&last, 0)),
            ResolveOutcome::Duplicate
        );
    }
}
