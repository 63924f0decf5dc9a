use bson::{Bson, Document};
use bytes::Bytes;
use serde_json::{Map, Number, Value};

use crate::block::{peek_document_length, LENGTH_PREFIX_SIZE};
use crate::encoding::EncodingMode;
use crate::error::{FrameError, Result};
use crate::framer::{BlockKind, MessageBlock};
use crate::message::ProtocolMessage;

/// Converts [`ProtocolMessage`]s to and from bytes in one [`EncodingMode`].
///
/// Pure transformation: no buffering, no I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    mode: EncodingMode,
}

impl Codec {
    /// Create a codec for the given encoding.
    pub fn new(mode: EncodingMode) -> Self {
        Self { mode }
    }

    /// The encoding this codec produces.
    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    /// Encode a message in this codec's encoding.
    pub fn encode(&self, msg: &ProtocolMessage) -> Result<Bytes> {
        match self.mode {
            EncodingMode::Text => encode_text(msg).map(Bytes::from),
            EncodingMode::Binary => encode_binary(msg).map(Bytes::from),
        }
    }

    /// Decode bytes in this codec's encoding.
    pub fn decode(&self, bytes: &[u8]) -> Result<ProtocolMessage> {
        match self.mode {
            EncodingMode::Text => decode_text(bytes),
            EncodingMode::Binary => decode_binary(bytes),
        }
    }

    /// Decode a framed block, choosing the decode path from the block kind.
    ///
    /// On a framed transport the server may answer a text request with a
    /// binary frame or vice versa; the frame kind wins over the session mode.
    pub fn decode_block(&self, block: &MessageBlock) -> Result<ProtocolMessage> {
        match block.kind {
            BlockKind::Text => decode_text(&block.bytes),
            BlockKind::Binary => decode_binary(&block.bytes),
        }
    }
}

/// Encode a message as one JSON document.
pub fn encode_text(msg: &ProtocolMessage) -> Result<String> {
    serde_json::to_string(msg).map_err(|err| FrameError::Encode(err.to_string()))
}

/// Decode exactly one JSON document.
pub fn decode_text(bytes: &[u8]) -> Result<ProtocolMessage> {
    serde_json::from_slice(bytes).map_err(|err| FrameError::MalformedPayload(err.to_string()))
}

/// Encode a message as one BSON document (self length-prefixed).
///
/// Payloads are mapped value by value, so keys such as `$date` stay plain
/// document keys instead of being read as extended JSON.
pub fn encode_binary(msg: &ProtocolMessage) -> Result<Vec<u8>> {
    let value = serde_json::to_value(msg).map_err(|err| FrameError::Encode(err.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(FrameError::Encode("message is not a JSON object".to_string()));
    };
    let document = object_to_document(fields)?;
    let mut out = Vec::new();
    document
        .to_writer(&mut out)
        .map_err(|err| FrameError::Encode(err.to_string()))?;
    Ok(out)
}

/// Decode exactly one BSON document.
///
/// The declared length must equal the number of bytes supplied.
pub fn decode_binary(bytes: &[u8]) -> Result<ProtocolMessage> {
    let declared = peek_document_length(bytes).ok_or_else(|| {
        FrameError::MalformedPayload(format!(
            "document shorter than its {LENGTH_PREFIX_SIZE}-byte length prefix ({} bytes)",
            bytes.len()
        ))
    })?;

    if declared < 0 || declared as usize != bytes.len() {
        return Err(FrameError::MalformedPayload(format!(
            "declared document length {declared} does not match {} available bytes",
            bytes.len()
        )));
    }

    let mut reader = bytes;
    let document = Document::from_reader(&mut reader)
        .map_err(|err| FrameError::MalformedPayload(err.to_string()))?;
    serde_json::from_value(document_to_object(document))
        .map_err(|err| FrameError::MalformedPayload(err.to_string()))
}

fn object_to_document(fields: Map<String, Value>) -> Result<Document> {
    let mut document = Document::new();
    for (key, value) in fields {
        document.insert(key, value_to_bson(value)?);
    }
    Ok(document)
}

fn value_to_bson(value: Value) -> Result<Bson> {
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Bson::Int64(i)
            } else if let Some(f) = n.as_f64().filter(|_| n.is_f64()) {
                Bson::Double(f)
            } else {
                return Err(FrameError::Encode(format!(
                    "integer {n} does not fit a BSON int64"
                )));
            }
        }
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(
            items
                .into_iter()
                .map(value_to_bson)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(fields) => Bson::Document(object_to_document(fields)?),
    })
}

fn document_to_object(document: Document) -> Value {
    Value::Object(
        document
            .into_iter()
            .map(|(key, value)| (key, bson_to_value(value)))
            .collect(),
    )
}

/// BSON types without a JSON counterpart (dates, object ids, binary) come
/// out in relaxed extended JSON.
fn bson_to_value(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        Bson::String(s) => Value::String(s),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_value).collect()),
        Bson::Document(document) => document_to_object(document),
        other => other.into_relaxed_extjson(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn samples() -> Vec<ProtocolMessage> {
        vec![
            ProtocolMessage::advertise("advertise:1", "/bson_test", "std_msgs/String"),
            ProtocolMessage::unadvertise("advertise:1", Some("/bson_test".to_string())),
            ProtocolMessage::publish("/bson_test", json!({"data": "Hello"})),
            ProtocolMessage::subscribe(
                "subscribe:1",
                "/pose",
                Some("geometry_msgs/PoseStamped".to_string()),
            ),
            ProtocolMessage::unsubscribe("subscribe:1", "/pose"),
            ProtocolMessage::call_service("call:1", "/add_two_ints", json!({"a": 20, "b": 22})),
            ProtocolMessage::ServiceResponse {
                id: Some("call:1".to_string()),
                service: "/add_two_ints".to_string(),
                values: json!({"sum": 42}),
                result: Some(true),
            },
            ProtocolMessage::Publish {
                id: None,
                topic: "/nested".to_string(),
                msg: json!({
                    "header": {"seq": 7, "frame_id": "map"},
                    "ranges": [1.5, -2.25, 0.0],
                    "flags": [true, false],
                    "label": null,
                    "count": -12
                }),
            },
            ProtocolMessage::Status {
                id: Some("subscribe:2".to_string()),
                level: "error".to_string(),
                msg: "no such topic".to_string(),
            },
            ProtocolMessage::publish("/t", json!({"$numberLong": "5"})),
            ProtocolMessage::publish("/t", json!({"data": {"$date": {"$numberLong": "0"}}})),
            ProtocolMessage::call_service(
                "call:2",
                "/odd_keys",
                json!({"$oid": "not an id", "list": [{"$binary": "x"}, 1, 2.5, "s", null]}),
            ),
            ProtocolMessage::ServiceResponse {
                id: Some("call:2".to_string()),
                service: "/odd_keys".to_string(),
                values: json!([{"$regularExpression": {"pattern": "a", "options": ""}}]),
                result: Some(true),
            },
        ]
    }

    #[test]
    fn text_roundtrip() {
        let codec = Codec::new(EncodingMode::Text);
        for msg in samples() {
            let bytes = codec.encode(&msg).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), msg);
        }
    }

    #[test]
    fn binary_roundtrip() {
        let codec = Codec::new(EncodingMode::Binary);
        for msg in samples() {
            let bytes = codec.encode(&msg).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), msg);
        }
    }

    #[test]
    fn binary_prefix_is_total_length() {
        let bytes = encode_binary(&ProtocolMessage::publish("/t", json!({"data": "x"}))).unwrap();
        let declared = i32::from_le_bytes(bytes[..4].try_into().unwrap());
        assert_eq!(declared as usize, bytes.len());
        assert_eq!(*bytes.last().unwrap(), 0);
    }

    #[test]
    fn text_rejects_trailing_document() {
        let one = encode_text(&ProtocolMessage::publish("/t", json!(1))).unwrap();
        let two = format!("{one}{one}");
        assert!(matches!(
            decode_text(two.as_bytes()),
            Err(FrameError::MalformedPayload(_))
        ));
    }

    #[test]
    fn text_rejects_garbage() {
        assert!(matches!(
            decode_text(b"{\"op\": "),
            Err(FrameError::MalformedPayload(_))
        ));
    }

    #[test]
    fn binary_rejects_length_mismatch() {
        let mut bytes = encode_binary(&ProtocolMessage::publish("/t", json!(1))).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_binary(&bytes),
            Err(FrameError::MalformedPayload(_))
        ));

        bytes.truncate(bytes.len() - 2);
        assert!(matches!(
            decode_binary(&bytes),
            Err(FrameError::MalformedPayload(_))
        ));
    }

    #[test]
    fn binary_rejects_short_input() {
        assert!(matches!(
            decode_binary(&[5, 0]),
            Err(FrameError::MalformedPayload(_))
        ));
    }

    #[test]
    fn binary_rejects_corrupt_body() {
        // Correct length, but element type 0x20 does not exist.
        let bytes = [9u8, 0, 0, 0, 0x20, b'a', 0, 0, 0];
        assert!(matches!(
            decode_binary(&bytes),
            Err(FrameError::MalformedPayload(_))
        ));
    }

    #[test]
    fn binary_rejects_document_without_op() {
        let mut out = Vec::new();
        bson::doc! { "topic": "/t" }.to_writer(&mut out).unwrap();
        assert!(matches!(
            decode_binary(&out),
            Err(FrameError::MalformedPayload(_))
        ));
    }

    #[test]
    fn binary_payload_keeps_integer_and_float_kinds() {
        let msg = ProtocolMessage::publish("/t", json!({"i": 7, "f": 7.0, "big": i64::MAX}));
        let decoded = decode_binary(&encode_binary(&msg).unwrap()).unwrap();
        let ProtocolMessage::Publish { msg, .. } = decoded else {
            panic!("expected publish");
        };
        assert!(msg["i"].is_i64());
        assert!(msg["f"].is_f64());
        assert_eq!(msg["big"].as_i64(), Some(i64::MAX));
    }

    #[test]
    fn binary_rejects_integer_beyond_int64() {
        let msg = ProtocolMessage::publish("/t", json!({"n": u64::MAX}));
        assert!(matches!(encode_binary(&msg), Err(FrameError::Encode(_))));
    }

    #[test]
    fn binary_decodes_bson_only_types_as_extended_json() {
        let mut out = Vec::new();
        bson::doc! {
            "op": "publish",
            "topic": "/stamped",
            "msg": { "small": 3i32, "at": bson::DateTime::from_millis(0) },
        }
        .to_writer(&mut out)
        .unwrap();

        let ProtocolMessage::Publish { msg, .. } = decode_binary(&out).unwrap() else {
            panic!("expected publish");
        };
        assert_eq!(msg["small"], json!(3));
        assert_eq!(msg["at"], json!({"$date": "1970-01-01T00:00:00Z"}));
    }

    #[test]
    fn block_kind_selects_decode_path() {
        let codec = Codec::new(EncodingMode::Binary);
        let msg = ProtocolMessage::publish("/t", json!({"data": "x"}));

        let text_block = MessageBlock::text(Bytes::from(encode_text(&msg).unwrap()));
        let binary_block = MessageBlock::binary(Bytes::from(encode_binary(&msg).unwrap()));

        assert_eq!(codec.decode_block(&text_block).unwrap(), msg);
        assert_eq!(codec.decode_block(&binary_block).unwrap(), msg);
    }
}
