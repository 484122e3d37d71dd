//! Channel bridges over Kafka's group-coordinated consumption and
//! asynchronous production protocols.
//!
//! The underlying client (librdkafka through `rdkafka`) owns the wire
//! protocol, partition assignment, rebalancing, retries, and compression.
//! This library owns the concurrency in between:
//!
//! - [`Consumer`] turns the rebalance-driven, claim-based push protocol of
//!   a consumer group into one bounded, ordered-per-partition,
//!   backpressured stream of [`Message`]s that survives rebalances and
//!   commits offsets only behind buffer delivery (at-least-once).
//! - [`AsyncProducer`] turns single-message sends into the client's async
//!   pipeline and multiplexes per-message delivery failures onto one error
//!   stream, with no per-send acknowledgement.
//!
//! # Consuming
//!
//! ```rust,no_run
//! use kafka_bridge::{Consumer, ConsumerOptions, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut consumer = Consumer::connect(
//!         ConsumerOptions {
//!             topic: "events".to_string(),
//!             brokers: vec!["localhost:9092".to_string()],
//!             buffer_size: 0,
//!             group_name: "event-workers".to_string(),
//!         },
//!         TransportConfig::default(),
//!     )
//!     .await?;
//!
//!     while let Some(message) = consumer.recv().await {
//!         println!("received {} bytes", message.value.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Producing
//!
//! ```rust,no_run
//! use kafka_bridge::{AsyncProducer, Message, ProducerOptions, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut producer = AsyncProducer::connect(
//!         ProducerOptions {
//!             topic: "events".to_string(),
//!             brokers: vec!["localhost:9092".to_string()],
//!             buffer_size: 0,
//!         },
//!         TransportConfig::default(),
//!     )
//!     .await?;
//!
//!     let mut failures = producer.take_error_stream().expect("first take");
//!     tokio::spawn(async move {
//!         while let Some(e) = failures.recv().await {
//!             tracing::error!("delivery failed: {e}");
//!         }
//!     });
//!
//!     producer.send(Message::with_key("user-1", "hello")).await;
//!     producer.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod group;
pub mod message;
pub mod producer;
pub mod session;
pub mod testing;

pub use config::{
    Acks, Compression, ConsumerOptions, OffsetReset, ProducerOptions, TransportConfig,
    DEFAULT_CONSUMER_BUFFER, DEFAULT_PRODUCER_BUFFER,
};
pub use consumer::Consumer;
pub use error::{Error, Result};
pub use group::{Claim, ClaimHandler, GroupSession, OffsetTracker, Record};
pub use message::Message;
pub use producer::AsyncProducer;
pub use session::KafkaSession;
