//! Messages carried by the broker.

/// A message published to a topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Unique identifier; for outbox traffic this is the event id.
    pub id: String,
    pub event_type: String,
    /// Serialized payload (JSON for `order.created`).
    pub payload: Vec<u8>,
    /// Headers such as correlation ids.
    pub metadata: Vec<(String, String)>,
}

impl Message {
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload,
            metadata: Vec::new(),
        }
    }

    /// Add a header to the message.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Look up a header by key.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// A message handed to a subscriber, awaiting ack, nack or dead-letter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned handle for this particular delivery.
    pub tag: u64,
    pub message: Message,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}
