//! Error types for the bridge library.

use thiserror::Error;

/// Errors produced by the consumer and producer bridges.
///
/// `Config` and `Connection` are synchronous construction failures.
/// Everything else is asynchronous and arrives on a bridge's error stream;
/// the bridge relays those without retrying or dropping them, and the
/// caller decides whether any of them warrants closing the bridge.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid options or transport settings. Never retried; fix the
    /// configuration and reconstruct the bridge.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The broker connection could not be established at construction.
    #[error("connection failed: {0}")]
    Connection(String),

    /// An error reported asynchronously by the underlying Kafka client.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// A record the transport failed to deliver after exhausting its own
    /// retries. One entry per failed record.
    #[error("delivery to partition {partition} failed: {source}")]
    Delivery {
        partition: i32,
        #[source]
        source: rdkafka::error::KafkaError,
    },

    /// The consumer group session terminated for a reason other than
    /// cancellation. The bridge stops after surfacing this.
    #[error("group session failed: {0}")]
    Session(String),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;
