//! Bridge options and transport settings.
//!
//! [`ConsumerOptions`] and [`ProducerOptions`] describe one bridge each and
//! are consumed once at construction. [`TransportConfig`] carries the
//! settings that are handed through to the underlying Kafka client; it is
//! validated synchronously before any network action is attempted, so a
//! bad configuration fails the constructor instead of surfacing later as a
//! puzzling transport error.

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;

use crate::error::{Error, Result};

/// Message buffer capacity used when `ConsumerOptions::buffer_size` is zero.
pub const DEFAULT_CONSUMER_BUFFER: usize = 100;

/// In-flight queue capacity used when `ProducerOptions::buffer_size` is zero.
pub const DEFAULT_PRODUCER_BUFFER: usize = 4096;

/// Keys the bridge derives from its options; rejected as raw properties.
const RESERVED_PROPERTIES: &[&str] = &[
    "bootstrap.servers",
    "group.id",
    "enable.auto.commit",
    "enable.auto.offset.store",
];

/// Options for a [`Consumer`](crate::Consumer) bridge.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Topic to consume from.
    pub topic: String,
    /// Broker addresses (`host:port`).
    pub brokers: Vec<String>,
    /// Capacity of the message buffer. Zero selects
    /// [`DEFAULT_CONSUMER_BUFFER`].
    pub buffer_size: usize,
    /// Consumer group to join.
    pub group_name: String,
}

impl ConsumerOptions {
    /// Buffer capacity with the zero fallback applied.
    pub fn capacity(&self) -> usize {
        if self.buffer_size == 0 {
            DEFAULT_CONSUMER_BUFFER
        } else {
            self.buffer_size
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.topic.is_empty() {
            return Err(Error::Config("topic must not be empty".to_string()));
        }
        if self.brokers.is_empty() {
            return Err(Error::Config("at least one broker is required".to_string()));
        }
        if self.group_name.is_empty() {
            return Err(Error::Config("group name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Options for an [`AsyncProducer`](crate::AsyncProducer) bridge.
#[derive(Debug, Clone)]
pub struct ProducerOptions {
    /// Topic to produce to.
    pub topic: String,
    /// Broker addresses (`host:port`).
    pub brokers: Vec<String>,
    /// Capacity of the in-flight delivery queue. Zero selects
    /// [`DEFAULT_PRODUCER_BUFFER`].
    pub buffer_size: usize,
}

impl ProducerOptions {
    /// Queue capacity with the zero fallback applied.
    pub fn capacity(&self) -> usize {
        if self.buffer_size == 0 {
            DEFAULT_PRODUCER_BUFFER
        } else {
            self.buffer_size
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.topic.is_empty() {
            return Err(Error::Config("topic must not be empty".to_string()));
        }
        if self.brokers.is_empty() {
            return Err(Error::Config("at least one broker is required".to_string()));
        }
        Ok(())
    }
}

/// Where a group with no committed offsets starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetReset {
    /// Start from the beginning of the partition. Preferred for pipelines
    /// where missing a record means missing an update.
    #[default]
    Earliest,
    /// Start from the end of the partition.
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

/// Broker acknowledgement level for produced records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acks {
    /// No acknowledgement.
    None,
    /// The partition leader has written the record.
    #[default]
    Leader,
    /// The full in-sync replica set has written the record.
    All,
}

impl Acks {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acks::None => "0",
            Acks::Leader => "1",
            Acks::All => "all",
        }
    }
}

/// Compression codec applied by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }
}

/// Transport settings handed through to the underlying Kafka client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Start position for a group without committed offsets.
    pub auto_offset_reset: OffsetReset,
    /// Consumer group session timeout.
    pub session_timeout: Duration,
    /// How often marked offsets are committed in the background. A crash
    /// loses at most one interval's worth of marks, which redelivers those
    /// records to the next session.
    pub auto_commit_interval: Duration,
    /// Acknowledgement level for produced records.
    pub required_acks: Acks,
    /// How long the transport keeps retrying a record before reporting it
    /// failed on the error stream.
    pub message_timeout: Duration,
    /// Compression codec for produced batches.
    pub compression: Compression,
    /// Broker reachability probe budget at construction.
    pub connect_timeout: Duration,
    /// Raw client properties applied after the derived ones. Keys the
    /// bridge derives from its options are rejected.
    pub properties: HashMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            auto_offset_reset: OffsetReset::Earliest,
            session_timeout: Duration::from_secs(6),
            auto_commit_interval: Duration::from_millis(100),
            required_acks: Acks::Leader,
            message_timeout: Duration::from_secs(5),
            compression: Compression::None,
            connect_timeout: Duration::from_secs(10),
            properties: HashMap::new(),
        }
    }
}

impl TransportConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.session_timeout < Duration::from_secs(1) {
            return Err(Error::Config(
                "session timeout must be at least one second".to_string(),
            ));
        }
        if self.auto_commit_interval.is_zero() {
            return Err(Error::Config(
                "auto commit interval must be greater than zero".to_string(),
            ));
        }
        if self.message_timeout.is_zero() {
            return Err(Error::Config(
                "message timeout must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::Config(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        for key in self.properties.keys() {
            if RESERVED_PROPERTIES.contains(&key.as_str()) {
                return Err(Error::Config(format!(
                    "property '{key}' is derived from the bridge options and cannot be overridden"
                )));
            }
        }
        Ok(())
    }

    /// Client configuration for a group consumer.
    ///
    /// Auto-commit runs in the background but only commits offsets the
    /// bridge has explicitly stored, which is what keeps commits behind
    /// buffer delivery.
    pub(crate) fn consumer_client_config(&self, brokers: &str, group: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                self.auto_commit_interval.as_millis().to_string(),
            )
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", self.auto_offset_reset.as_str())
            .set(
                "session.timeout.ms",
                self.session_timeout.as_millis().to_string(),
            )
            .set("partition.assignment.strategy", "cooperative-sticky")
            .set("enable.partition.eof", "false");
        for (key, value) in &self.properties {
            config.set(key, value);
        }
        config
    }

    /// Client configuration for an async producer.
    pub(crate) fn producer_client_config(&self, brokers: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", brokers)
            .set(
                "message.timeout.ms",
                self.message_timeout.as_millis().to_string(),
            )
            .set("acks", self.required_acks.as_str())
            .set("compression.type", self.compression.as_str());
        for (key, value) in &self.properties {
            config.set(key, value);
        }
        config
    }
}
