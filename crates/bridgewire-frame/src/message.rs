use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire name of the advertise operation.
pub const OP_ADVERTISE: &str = "advertise";
/// Wire name of the unadvertise operation.
pub const OP_UNADVERTISE: &str = "unadvertise";
/// Wire name of publish (outgoing) and subscription delivery (incoming).
pub const OP_PUBLISH: &str = "publish";
/// Wire name of the subscribe operation.
pub const OP_SUBSCRIBE: &str = "subscribe";
/// Wire name of the unsubscribe operation.
pub const OP_UNSUBSCRIBE: &str = "unsubscribe";
/// Wire name of a service call request.
pub const OP_CALL_SERVICE: &str = "call_service";
/// Wire name of a service call response.
pub const OP_SERVICE_RESPONSE: &str = "service_response";
/// Wire name of a server status report.
pub const OP_STATUS: &str = "status";

/// Status level the server uses to report a failed operation.
pub const STATUS_LEVEL_ERROR: &str = "error";

/// One bridge protocol message.
///
/// The `op` key discriminates the variant on the wire. A `Publish` sent by
/// this client publishes on a topic; a `Publish` received from the server is
/// a subscription delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProtocolMessage {
    Advertise {
        id: String,
        topic: String,
        #[serde(rename = "type")]
        msg_type: String,
    },
    Unadvertise {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
    },
    Publish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        topic: String,
        #[serde(default)]
        msg: Value,
    },
    Subscribe {
        id: String,
        topic: String,
        #[serde(
            rename = "type",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        msg_type: Option<String>,
    },
    Unsubscribe {
        id: String,
        topic: String,
    },
    CallService {
        id: String,
        service: String,
        #[serde(default)]
        args: Value,
    },
    ServiceResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        service: String,
        #[serde(default)]
        values: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<bool>,
    },
    Status {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        level: String,
        #[serde(default)]
        msg: String,
    },
}

impl ProtocolMessage {
    /// Create an advertise message.
    pub fn advertise(
        id: impl Into<String>,
        topic: impl Into<String>,
        msg_type: impl Into<String>,
    ) -> Self {
        ProtocolMessage::Advertise {
            id: id.into(),
            topic: topic.into(),
            msg_type: msg_type.into(),
        }
    }

    /// Create an unadvertise message for an advertisement id.
    pub fn unadvertise(id: impl Into<String>, topic: Option<String>) -> Self {
        ProtocolMessage::Unadvertise {
            id: id.into(),
            topic,
        }
    }

    /// Create a publish message.
    pub fn publish(topic: impl Into<String>, msg: Value) -> Self {
        ProtocolMessage::Publish {
            id: None,
            topic: topic.into(),
            msg,
        }
    }

    /// Create a subscribe request.
    pub fn subscribe(
        id: impl Into<String>,
        topic: impl Into<String>,
        msg_type: Option<String>,
    ) -> Self {
        ProtocolMessage::Subscribe {
            id: id.into(),
            topic: topic.into(),
            msg_type,
        }
    }

    /// Create an unsubscribe request.
    pub fn unsubscribe(id: impl Into<String>, topic: impl Into<String>) -> Self {
        ProtocolMessage::Unsubscribe {
            id: id.into(),
            topic: topic.into(),
        }
    }

    /// Create a service call request.
    pub fn call_service(id: impl Into<String>, service: impl Into<String>, args: Value) -> Self {
        ProtocolMessage::CallService {
            id: id.into(),
            service: service.into(),
            args,
        }
    }

    /// The wire `op` of this message.
    pub fn op(&self) -> &'static str {
        match self {
            ProtocolMessage::Advertise { .. } => OP_ADVERTISE,
            ProtocolMessage::Unadvertise { .. } => OP_UNADVERTISE,
            ProtocolMessage::Publish { .. } => OP_PUBLISH,
            ProtocolMessage::Subscribe { .. } => OP_SUBSCRIBE,
            ProtocolMessage::Unsubscribe { .. } => OP_UNSUBSCRIBE,
            ProtocolMessage::CallService { .. } => OP_CALL_SERVICE,
            ProtocolMessage::ServiceResponse { .. } => OP_SERVICE_RESPONSE,
            ProtocolMessage::Status { .. } => OP_STATUS,
        }
    }

    /// The correlation id, if the message carries one.
    pub fn id(&self) -> Option<&str> {
        match self {
            ProtocolMessage::Advertise { id, .. }
            | ProtocolMessage::Unadvertise { id, .. }
            | ProtocolMessage::Subscribe { id, .. }
            | ProtocolMessage::Unsubscribe { id, .. }
            | ProtocolMessage::CallService { id, .. } => Some(id),
            ProtocolMessage::Publish { id, .. }
            | ProtocolMessage::ServiceResponse { id, .. }
            | ProtocolMessage::Status { id, .. } => id.as_deref(),
        }
    }

    /// The topic, if the message concerns one.
    pub fn topic(&self) -> Option<&str> {
        match self {
            ProtocolMessage::Advertise { topic, .. }
            | ProtocolMessage::Publish { topic, .. }
            | ProtocolMessage::Subscribe { topic, .. }
            | ProtocolMessage::Unsubscribe { topic, .. } => Some(topic),
            ProtocolMessage::Unadvertise { topic, .. } => topic.as_deref(),
            _ => None,
        }
    }

    /// True for a `status` message at error level.
    pub fn is_error_status(&self) -> bool {
        matches!(self, ProtocolMessage::Status { level, .. } if level == STATUS_LEVEL_ERROR)
    }
}
