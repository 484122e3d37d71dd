//! Consumer bridge behavior against scripted group sessions.

use std::sync::Arc;
use std::time::Duration;

use kafka_bridge::testing::{records, Generation, ScriptedClaim, ScriptedSession, SessionEnd};
use kafka_bridge::{Consumer, ConsumerOptions, Error};
use tokio::sync::mpsc;
use tokio::time::timeout;

const DEADLINE: Duration = Duration::from_secs(5);

fn options(buffer_size: usize) -> ConsumerOptions {
    ConsumerOptions {
        topic: "orders".to_string(),
        brokers: vec!["localhost:9092".to_string()],
        buffer_size,
        group_name: "order-workers".to_string(),
    }
}

fn bridge(buffer_size: usize, generations: Vec<Generation>) -> (Consumer, Arc<ScriptedSession>) {
    let session = Arc::new(ScriptedSession::new(generations));
    let (_unused_tx, session_errors) = mpsc::unbounded_channel();
    let consumer = Consumer::with_session(options(buffer_size), session.clone(), session_errors);
    (consumer, session)
}

fn claim(partition: i32, first_offset: i64, payloads: &[&str]) -> ScriptedClaim {
    ScriptedClaim {
        topic: "orders".to_string(),
        partition,
        records: records("orders", partition, first_offset, payloads),
    }
}

async fn recv_text(consumer: &mut Consumer) -> String {
    let message = timeout(DEADLINE, consumer.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("message stream ended early");
    String::from_utf8(message.value).expect("payload was not utf-8")
}

#[tokio::test]
async fn delivery_order_is_preserved_within_a_claim() {
    let (mut consumer, _session) = bridge(
        8,
        vec![Generation {
            claims: vec![claim(0, 0, &["a", "b", "c"])],
            end: SessionEnd::HoldUntilCancelled,
        }],
    );

    for expected in ["a", "b", "c"] {
        assert_eq!(recv_text(&mut consumer).await, expected);
    }
    consumer.close().await.expect("close failed");
}

#[tokio::test]
async fn zero_buffer_size_still_delivers() {
    let (mut consumer, _session) = bridge(
        0,
        vec![Generation {
            claims: vec![claim(0, 0, &["a", "b"])],
            end: SessionEnd::HoldUntilCancelled,
        }],
    );

    assert_eq!(recv_text(&mut consumer).await, "a");
    assert_eq!(recv_text(&mut consumer).await, "b");
    consumer.close().await.expect("close failed");
}

#[tokio::test]
async fn per_partition_order_survives_interleaving() {
    let (mut consumer, _session) = bridge(
        8,
        vec![Generation {
            claims: vec![claim(0, 0, &["a0", "a1"]), claim(1, 0, &["b0", "b1"])],
            end: SessionEnd::HoldUntilCancelled,
        }],
    );

    let mut received = Vec::new();
    for _ in 0..4 {
        received.push(recv_text(&mut consumer).await);
    }
    consumer.close().await.expect("close failed");

    let partition_a: Vec<&String> = received.iter().filter(|v| v.starts_with('a')).collect();
    let partition_b: Vec<&String> = received.iter().filter(|v| v.starts_with('b')).collect();
    assert_eq!(partition_a, ["a0", "a1"]);
    assert_eq!(partition_b, ["b0", "b1"]);
}

#[tokio::test]
async fn backpressure_blocks_the_drain_without_losing_records() {
    let payloads: Vec<String> = (0..20).map(|i| format!("r{i:02}")).collect();
    let payload_refs: Vec<&str> = payloads.iter().map(String::as_str).collect();
    let (mut consumer, session) = bridge(
        2,
        vec![Generation {
            claims: vec![claim(0, 0, &payload_refs)],
            end: SessionEnd::HoldUntilCancelled,
        }],
    );

    // Nothing is reading yet: the drain must stall against the full buffer
    // instead of marking ahead.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stalled_marks = session.marks().lock().unwrap().len();
    assert!(
        stalled_marks < payloads.len(),
        "drain committed {stalled_marks} records against a full buffer"
    );

    let mut received = Vec::new();
    for _ in 0..payloads.len() {
        received.push(recv_text(&mut consumer).await);
    }
    assert_eq!(received, payloads);
    consumer.close().await.expect("close failed");
}

#[tokio::test]
async fn unmarked_records_are_redelivered_to_a_fresh_session() {
    let all = ["a", "b", "c"];
    let (consumer, session) = bridge(
        1,
        vec![Generation {
            claims: vec![claim(0, 0, &all)],
            end: SessionEnd::HoldUntilCancelled,
        }],
    );

    // Let the drain stall against the full buffer, then shut down without
    // reading anything.
    tokio::time::sleep(Duration::from_millis(200)).await;
    consumer.close().await.expect("close failed");

    let resume_from = {
        let marks = session.marks();
        let marks = marks.lock().unwrap();
        // Marks are contiguous from the first offset: nothing was skipped
        // and nothing was committed ahead of its buffer push.
        for (i, (_, _, offset)) in marks.iter().enumerate() {
            assert_eq!(*offset, i as i64);
        }
        assert!(
            marks.len() < all.len(),
            "everything was committed despite no reader"
        );
        marks.len()
    };

    // A fresh session starts from the committed position and redelivers the
    // rest; none of the unread records are lost.
    let redelivered = &all[resume_from..];
    let (mut consumer, _session) = bridge(
        8,
        vec![Generation {
            claims: vec![claim(0, resume_from as i64, redelivered)],
            end: SessionEnd::HoldUntilCancelled,
        }],
    );
    for expected in redelivered {
        assert_eq!(recv_text(&mut consumer).await, *expected);
    }
    consumer.close().await.expect("close failed");
}

#[tokio::test]
async fn rebalance_revokes_claims_and_rejoins() {
    let (mut consumer, _session) = bridge(
        8,
        vec![
            Generation {
                claims: vec![claim(0, 0, &["before"])],
                end: SessionEnd::Rebalance,
            },
            Generation {
                claims: vec![claim(1, 0, &["after"])],
                end: SessionEnd::HoldUntilCancelled,
            },
        ],
    );

    assert_eq!(recv_text(&mut consumer).await, "before");
    assert_eq!(recv_text(&mut consumer).await, "after");
    consumer.close().await.expect("close failed");
}

#[tokio::test]
async fn session_failure_surfaces_and_ends_the_stream() {
    let (mut consumer, _session) = bridge(
        8,
        vec![Generation {
            claims: vec![claim(0, 0, &["last"])],
            end: SessionEnd::Fail("coordinator lost".to_string()),
        }],
    );
    let mut errors = consumer.take_error_stream().expect("first take");

    assert_eq!(recv_text(&mut consumer).await, "last");
    let end = timeout(DEADLINE, consumer.recv())
        .await
        .expect("stream did not end after the session failure");
    assert!(end.is_none(), "stream must end after a session failure");

    let surfaced = timeout(DEADLINE, errors.recv())
        .await
        .expect("no error surfaced")
        .expect("error stream closed without the failure");
    assert!(matches!(surfaced, Error::Session(_)), "got: {surfaced}");

    consumer.close().await.expect("close failed");
}

#[tokio::test]
async fn error_stream_can_only_be_taken_once() {
    let (mut consumer, _session) = bridge(8, vec![]);
    assert!(consumer.take_error_stream().is_some());
    assert!(consumer.take_error_stream().is_none());
    consumer.close().await.expect("close failed");
}

#[tokio::test]
async fn unreachable_brokers_fail_construction() {
    // Needs no broker: the metadata probe times out against a closed port.
    let result = Consumer::connect(
        ConsumerOptions {
            topic: "orders".to_string(),
            brokers: vec!["127.0.0.1:1".to_string()],
            buffer_size: 0,
            group_name: "order-workers".to_string(),
        },
        kafka_bridge::TransportConfig {
            connect_timeout: Duration::from_secs(2),
            ..kafka_bridge::TransportConfig::default()
        },
    )
    .await;
    assert!(matches!(result, Err(Error::Connection(_))));
}

#[tokio::test]
async fn close_unblocks_a_held_session() {
    let (consumer, session) = bridge(
        8,
        vec![Generation {
            claims: vec![],
            end: SessionEnd::HoldUntilCancelled,
        }],
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    timeout(DEADLINE, consumer.close())
        .await
        .expect("close did not unblock the session")
        .expect("close failed");
    assert!(session.was_closed(), "session close was not propagated");
}
