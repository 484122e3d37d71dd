//! Producer bridge behavior.
//!
//! librdkafka connects lazily, so these tests run without a broker: records
//! are accepted into the transmit queue and fail delivery once the message
//! timeout expires.

use std::time::Duration;

use kafka_bridge::{AsyncProducer, Error, Message, ProducerOptions, TransportConfig};
use tokio::time::timeout;

fn unreachable_options() -> ProducerOptions {
    ProducerOptions {
        topic: "bench".to_string(),
        // A port nothing listens on, so every delivery times out.
        brokers: vec!["127.0.0.1:1".to_string()],
        buffer_size: 8,
    }
}

fn fast_failing_transport() -> TransportConfig {
    TransportConfig {
        message_timeout: Duration::from_millis(300),
        ..TransportConfig::default()
    }
}

#[tokio::test]
async fn delivery_failures_reach_the_error_stream_without_blocking_send() {
    let mut producer = AsyncProducer::connect(unreachable_options(), fast_failing_transport())
        .await
        .expect("construction must not require a live broker");
    let mut failures = producer.take_error_stream().expect("first take");

    // Sends are accepted immediately even though no broker exists.
    for i in 0..3 {
        timeout(Duration::from_secs(1), producer.send(Message::new(format!("m{i}"))))
            .await
            .expect("send must not wait for a delivery outcome");
    }

    // Every delivery fails once the transport gives up on it.
    for _ in 0..3 {
        let failure = timeout(Duration::from_secs(10), failures.recv())
            .await
            .expect("no failure within the deadline")
            .expect("error stream closed early");
        assert!(matches!(failure, Error::Delivery { .. }), "got: {failure}");
    }

    producer.close().await.expect("close failed");
}

#[tokio::test]
async fn close_completes_once_outstanding_deliveries_resolve() {
    let producer = AsyncProducer::connect(unreachable_options(), fast_failing_transport())
        .await
        .expect("construction failed");
    producer.send(Message::new("doomed")).await;

    timeout(Duration::from_secs(10), producer.close())
        .await
        .expect("close hung on a dead broker")
        .expect("close failed");
}

#[tokio::test]
async fn reserved_transport_properties_are_rejected() {
    let mut transport = TransportConfig::default();
    transport
        .properties
        .insert("bootstrap.servers".to_string(), "elsewhere:9092".to_string());

    let result = AsyncProducer::connect(unreachable_options(), transport).await;
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn empty_topic_is_rejected() {
    let options = ProducerOptions {
        topic: String::new(),
        ..unreachable_options()
    };
    let result = AsyncProducer::connect(options, TransportConfig::default()).await;
    assert!(matches!(result, Err(Error::Config(_))));
}
