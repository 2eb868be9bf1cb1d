//! Leased messages as handed to consumers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::errors::QueueError;
use super::ids::MessageId;

/// A message currently leased by the caller.
///
/// Holding a `Message` proves nothing by itself: the lease behind it expires
/// after the message's lease duration, after which another consumer may
/// receive the same payload.
///
/// Serializes with `created_at` as RFC 3339 and the payload as a byte array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
    /// Insertion time, from the store clock.
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as UTF-8, if it is.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Decode a JSON payload (see `Queue::send_json`).
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// What a scoped read hands to its block.
///
/// `Default` carries no id: it was not leased, and there is nothing to ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Leased(Message),
    Default(Vec<u8>),
}

impl Delivery {
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Leased(message) => message.payload(),
            Self::Default(payload) => payload,
        }
    }

    pub fn id(&self) -> Option<MessageId> {
        match self {
            Self::Leased(message) => Some(message.id),
            Self::Default(_) => None,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &[u8]) -> Message {
        Message {
            id: MessageId::from_raw(3),
            payload: payload.to_vec(),
            created_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Greeting {
        name: String,
    }

    #[test]
    fn decode_reads_json_payload() {
        let msg = message(br#"{"name":"ada"}"#);
        let greeting: Greeting = msg.decode().unwrap();
        assert_eq!(greeting.name, "ada");
    }

    #[test]
    fn decode_reports_codec_error() {
        let msg = message(b"not json");
        let err = msg.decode::<Greeting>().unwrap_err();
        assert!(matches!(err, QueueError::Codec(_)));
    }

    #[test]
    fn serializes_with_rfc3339_timestamp() {
        let msg = message(b"hi");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["id"], 3);
        assert_eq!(json["payload"], serde_json::json!([104, 105]));
        assert_eq!(json["created_at"], "1970-01-01T00:00:00Z");
        assert_eq!(serde_json::from_value::<Message>(json).unwrap(), msg);
    }

    #[test]
    fn default_delivery_has_no_id() {
        let leased = Delivery::Leased(message(b"a"));
        let fallback = Delivery::Default(b"b".to_vec());

        assert_eq!(leased.id(), Some(MessageId::from_raw(3)));
        assert_eq!(fallback.id(), None);
        assert!(fallback.is_default());
        assert_eq!(fallback.payload(), b"b");
    }
}
