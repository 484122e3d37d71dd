//! Application-facing message type.

/// A single message exchanged with a Kafka topic.
///
/// The payload is opaque bytes; serialization and compression are the
/// transport's concern. Ownership moves from the caller into the transport
/// on send, and from the buffer into the caller on receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Partitioning key, if any.
    pub key: Option<Vec<u8>>,
    /// Message payload.
    pub value: Vec<u8>,
}

impl Message {
    /// Creates an unkeyed message.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: None,
            value: value.into(),
        }
    }

    /// Creates a keyed message. Records with the same key land on the same
    /// partition, which is what preserves their relative order end to end.
    pub fn with_key(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
        }
    }
}
