use std::collections::HashMap;

use bridgewire_frame::{ProtocolMessage, OP_ADVERTISE};

use crate::correlator::fresh_id;

/// One live advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementRecord {
    pub id: String,
    pub topic: String,
    pub msg_type: String,
}

/// Result of [`TopicRegistry::advertise`].
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    /// Freshly generated id for this call.
    pub id: String,
    /// The message to send, or `None` if the topic was already advertised.
    pub message: Option<ProtocolMessage>,
}

/// Tracks advertised topics.
///
/// Pure state: the registry decides which control messages are needed and
/// the session sends them.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    records: HashMap<String, AdvertisementRecord>,
    by_topic: HashMap<String, String>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise `topic` as `msg_type`.
    ///
    /// Every call returns a fresh id. Only the first advertisement of a topic
    /// is recorded and produces an Advertise message; later calls leave the
    /// existing record (and its id) in place.
    pub fn advertise(&mut self, topic: &str, msg_type: &str) -> Advertisement {
        let id = fresh_id(OP_ADVERTISE);

        if let Some(existing) = self.by_topic.get(topic) {
            tracing::debug!(topic, id = %existing, "topic already advertised");
            return Advertisement { id, message: None };
        }

        self.by_topic.insert(topic.to_string(), id.clone());
        self.records.insert(
            id.clone(),
            AdvertisementRecord {
                id: id.clone(),
                topic: topic.to_string(),
                msg_type: msg_type.to_string(),
            },
        );

        let message = ProtocolMessage::advertise(id.as_str(), topic, msg_type);
        Advertisement {
            id,
            message: Some(message),
        }
    }

    /// Remove the record for `id`, returning the Unadvertise message to send.
    ///
    /// Unknown ids are a no-op.
    pub fn unadvertise(&mut self, id: &str) -> Option<ProtocolMessage> {
        let Some(record) = self.records.remove(id) else {
            tracing::debug!(id, "unadvertise of unknown id ignored");
            return None;
        };
        self.by_topic.remove(&record.topic);
        Some(ProtocolMessage::unadvertise(record.id, Some(record.topic)))
    }

    /// Forget a record without producing a message (the advertise never went out).
    pub(crate) fn discard(&mut self, id: &str) {
        if let Some(record) = self.records.remove(id) {
            self.by_topic.remove(&record.topic);
        }
    }

    pub fn is_advertised(&self, topic: &str) -> bool {
        self.by_topic.contains_key(topic)
    }

    /// Id the topic is currently advertised under.
    pub fn id_for_topic(&self, topic: &str) -> Option<&str> {
        self.by_topic.get(topic).map(String::as_str)
    }

    /// Snapshot of all live advertisements, ordered by topic.
    pub fn all_records(&self) -> Vec<AdvertisementRecord> {
        let mut records: Vec<AdvertisementRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.topic.cmp(&b.topic));
        records
    }

    /// Remove every record, returning one Unadvertise message per record.
    pub fn drain(&mut self) -> Vec<ProtocolMessage> {
        self.by_topic.clear();
        self.records
            .drain()
            .map(|(_, record)| ProtocolMessage::unadvertise(record.id, Some(record.topic)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
