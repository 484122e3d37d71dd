//! Throughput benchmark for the bridge library.
//!
//! Produces small payloads to a topic as fast as the producer bridge
//! accepts them while a consumer bridge in the `benchmark` group drains the
//! same topic, printing per-second counts for both sides.
//!
//! ```bash
//! cargo run -p kafka-bridge-bench -- --brokers localhost:9092 --topic-name benchmark
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use kafka_bridge::{
    AsyncProducer, Consumer, ConsumerOptions, Message, ProducerOptions, TransportConfig,
};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "bench", about = "Tool to benchmark this library")]
struct Args {
    /// Comma separated list of brokers
    #[arg(short, long, default_value = "localhost:9092", env = "KAFKA_BROKERS")]
    brokers: String,

    /// Name of topic to use for benchmarking
    #[arg(short, long = "topic-name", default_value = "benchmark")]
    topic_name: String,
}

/// Which side of the bridge a per-second count came from.
#[derive(Clone, Copy)]
enum Side {
    Produced,
    Consumed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let brokers: Vec<String> = args.brokers.split(',').map(str::to_string).collect();

    // Each loop owns its counter and ships per-second deltas here; the
    // reporter is the only task that touches the totals.
    let (counts_tx, counts_rx) = mpsc::channel(16);
    tokio::spawn(report(counts_rx));

    tokio::select! {
        produced = produce(brokers.clone(), args.topic_name.clone(), counts_tx.clone()) => produced,
        consumed = consume(brokers, args.topic_name, counts_tx) => consumed,
    }
}

async fn produce(
    brokers: Vec<String>,
    topic: String,
    counts: mpsc::Sender<(Side, u64)>,
) -> anyhow::Result<()> {
    let mut producer = AsyncProducer::connect(
        ProducerOptions {
            topic,
            brokers,
            buffer_size: 0,
        },
        TransportConfig::default(),
    )
    .await
    .context("producer setup failed")?;

    let mut failures = producer
        .take_error_stream()
        .context("producer error stream already taken")?;
    tokio::spawn(async move {
        if let Some(e) = failures.recv().await {
            tracing::error!("producer transport error: {e}");
            std::process::exit(1);
        }
    });

    let mut sent: u64 = 0;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                counts.send((Side::Produced, sent)).await.ok();
                sent = 0;
            }
            _ = producer.send(Message::new("test")) => {
                sent += 1;
            }
        }
    }
}

async fn consume(
    brokers: Vec<String>,
    topic: String,
    counts: mpsc::Sender<(Side, u64)>,
) -> anyhow::Result<()> {
    let mut consumer = Consumer::connect(
        ConsumerOptions {
            topic,
            brokers,
            buffer_size: 0,
            group_name: "benchmark".to_string(),
        },
        TransportConfig::default(),
    )
    .await
    .context("consumer setup failed")?;

    let mut failures = consumer
        .take_error_stream()
        .context("consumer error stream already taken")?;
    tokio::spawn(async move {
        if let Some(e) = failures.recv().await {
            tracing::error!("consumer transport error: {e}");
            std::process::exit(1);
        }
    });

    let mut received: u64 = 0;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                counts.send((Side::Consumed, received)).await.ok();
                received = 0;
            }
            message = consumer.recv() => match message {
                Some(_) => received += 1,
                None => anyhow::bail!("message stream ended unexpectedly"),
            }
        }
    }
}

async fn report(mut counts: mpsc::Receiver<(Side, u64)>) {
    while let Some((side, count)) = counts.recv().await {
        match side {
            Side::Produced => println!("Produced: {count}"),
            Side::Consumed => println!("Consumed: {count}"),
        }
    }
}
