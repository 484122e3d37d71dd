//! rdkafka-backed consumer group session.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::consumer::{Consumer as RdkafkaConsumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message as RdkafkaMessage};
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ConsumerOptions, TransportConfig};
use crate::error::{Error, Result};
use crate::group::{Claim, ClaimHandler, GroupSession, OffsetTracker, Record};

/// Capacity of each claim's record feed. Kept small: a slow drain fills the
/// feed and stalls the session's receive loop, which hands backpressure to
/// the client's own fetch flow control.
const CLAIM_FEED_CAPACITY: usize = 16;

/// Group session over an rdkafka `StreamConsumer`.
///
/// The client library rebalances internally, so one `consume` call spans
/// the whole subscription lifetime: a generation ends only on cancellation
/// or a terminal error, and transient client errors are relayed on the
/// error stream returned by [`connect`](KafkaSession::connect). Claims are
/// materialized per partition as records first arrive for it, and every
/// claim feed closes when the generation ends.
pub struct KafkaSession {
    consumer: Arc<StreamConsumer>,
    errors: mpsc::UnboundedSender<Error>,
}

impl KafkaSession {
    /// Creates the underlying stream consumer and probes the brokers with a
    /// bounded metadata fetch, so an unreachable cluster fails here instead
    /// of behind the supervising loop.
    pub async fn connect(
        options: &ConsumerOptions,
        transport: &TransportConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Error>)> {
        let config = transport
            .consumer_client_config(&options.brokers.join(","), &options.group_name);
        let consumer: StreamConsumer = config
            .create()
            .map_err(|e| Error::Config(format!("failed to create consumer: {e}")))?;
        let consumer = Arc::new(consumer);

        probe_brokers(&consumer, &options.topic, transport).await?;

        let (errors, error_stream) = mpsc::unbounded_channel();
        Ok((Self { consumer, errors }, error_stream))
    }
}

#[async_trait]
impl GroupSession for KafkaSession {
    async fn consume(
        &self,
        topics: &[String],
        handler: Arc<dyn ClaimHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let subscription: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&subscription)?;

        handler.setup().await?;

        let tracker: Arc<dyn OffsetTracker> = Arc::new(StoredOffsets {
            consumer: Arc::clone(&self.consumer),
        });
        let mut feeds: HashMap<(String, i32), mpsc::Sender<Record>> = HashMap::new();
        let mut drains: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.consumer.recv() => match received {
                    Ok(borrowed) => {
                        let record = to_record(&borrowed);
                        drop(borrowed);
                        self.route(record, &handler, &tracker, &mut feeds, &mut drains, &cancel)
                            .await;
                    }
                    Err(e) => {
                        // Transient by contract; the caller decides whether
                        // any of these warrants closing the bridge.
                        let _ = self.errors.send(Error::Kafka(e));
                    }
                }
            }
        }

        // Close every claim feed, then wait for the drains to finish.
        feeds.clear();
        for drain in drains {
            let _ = drain.await;
        }
        handler.cleanup().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.consumer.unsubscribe();
        Ok(())
    }
}

impl KafkaSession {
    /// Hands `record` to its partition's claim drain, starting one on the
    /// partition's first record.
    async fn route(
        &self,
        record: Record,
        handler: &Arc<dyn ClaimHandler>,
        tracker: &Arc<dyn OffsetTracker>,
        feeds: &mut HashMap<(String, i32), mpsc::Sender<Record>>,
        drains: &mut Vec<JoinHandle<()>>,
        cancel: &CancellationToken,
    ) {
        let feed = match feeds.entry((record.topic.clone(), record.partition)) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let (feed_tx, feed_rx) = mpsc::channel(CLAIM_FEED_CAPACITY);
                let claim = Claim {
                    topic: entry.key().0.clone(),
                    partition: entry.key().1,
                    records: feed_rx,
                };
                tracing::debug!(
                    topic = %claim.topic,
                    partition = claim.partition,
                    "starting claim drain"
                );
                let handler = Arc::clone(handler);
                let tracker = Arc::clone(tracker);
                drains.push(tokio::spawn(async move {
                    if let Err(e) = handler.consume_claim(tracker, claim).await {
                        tracing::warn!("claim drain failed: {e}");
                    }
                }));
                entry.insert(feed_tx).clone()
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {}
            sent = feed.send(record) => {
                if let Err(mpsc::error::SendError(record)) = sent {
                    // The drain exited early; drop the dead feed so a later
                    // record restarts it. The record stays unmarked and will
                    // be redelivered.
                    feeds.remove(&(record.topic, record.partition));
                }
            }
        }
    }
}

/// Marks offsets through the consumer's local offset store; the client's
/// auto-commit cycle flushes the store to the broker.
struct StoredOffsets {
    consumer: Arc<StreamConsumer>,
}

impl OffsetTracker for StoredOffsets {
    fn mark(&self, topic: &str, partition: i32, offset: i64) {
        let mut stored = TopicPartitionList::new();
        // The stored offset is the next one to read, hence +1.
        let added = stored.add_partition_offset(topic, partition, Offset::Offset(offset + 1));
        if added.is_ok() {
            if let Err(e) = self.consumer.store_offsets(&stored) {
                tracing::warn!(topic, partition, offset, "failed to store offset: {e}");
            }
        }
    }
}

fn to_record(message: &BorrowedMessage<'_>) -> Record {
    Record {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(|k| k.to_vec()),
        value: message.payload().map(|p| p.to_vec()).unwrap_or_default(),
        timestamp: message.timestamp().to_millis(),
    }
}

async fn probe_brokers(
    consumer: &Arc<StreamConsumer>,
    topic: &str,
    transport: &TransportConfig,
) -> Result<()> {
    let consumer = Arc::clone(consumer);
    let topic = topic.to_string();
    let timeout = transport.connect_timeout;
    tokio::task::spawn_blocking(move || {
        consumer
            .fetch_metadata(Some(&topic), timeout)
            .map(|_| ())
            .map_err(|e| Error::Connection(format!("brokers unreachable: {e}")))
    })
    .await
    .map_err(|e| Error::Connection(format!("metadata probe failed: {e}")))?
}
