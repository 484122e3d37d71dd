//! Fire-and-forget producer bridge.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message as RdkafkaMessage;
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ProducerOptions, TransportConfig};
use crate::error::{Error, Result};
use crate::message::Message;

/// How long `send` waits before re-enqueueing when the client's transmit
/// queue is full.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// Flush budget for `close`.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

type DeliveryOutcome = BoxFuture<'static, Result<()>>;

/// Bridges single-message sends into the client's asynchronous production
/// pipeline.
///
/// [`send`](AsyncProducer::send) never performs network I/O and never waits
/// for a delivery outcome; it blocks only while the transmit queue or the
/// bridge's in-flight window is full. Failed deliveries surface on the
/// error stream once the transport has exhausted its own retries. There is
/// no success signal: the absence of an error is the only acknowledgement
/// this bridge offers.
pub struct AsyncProducer {
    producer: FutureProducer,
    topic: String,
    inflight: mpsc::Sender<DeliveryOutcome>,
    errors: Option<mpsc::UnboundedReceiver<Error>>,
    forwarder: JoinHandle<()>,
}

impl AsyncProducer {
    /// Opens the client's async transport against `options.brokers`.
    ///
    /// Fails with [`Error::Config`] on invalid options or transport
    /// settings and with [`Error::Connection`] when the client itself
    /// cannot be constructed. The transport connects lazily, so an
    /// unreachable broker is reported per message on the error stream
    /// rather than here.
    pub async fn connect(options: ProducerOptions, transport: TransportConfig) -> Result<Self> {
        options.validate()?;
        transport.validate()?;

        let producer: FutureProducer = transport
            .producer_client_config(&options.brokers.join(","))
            .create()
            .map_err(|e| Error::Connection(format!("failed to create producer: {e}")))?;

        let (inflight, pending) = mpsc::channel(options.capacity());
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_deliveries(pending, error_tx));

        tracing::debug!(topic = %options.topic, "producer bridge started");

        Ok(Self {
            producer,
            topic: options.topic,
            inflight,
            errors: Some(error_rx),
            forwarder,
        })
    }

    /// Enqueues `message` for delivery to the bridge's topic.
    ///
    /// Returns as soon as the transport has accepted the record; the
    /// delivery outcome arrives later, failures only, on the error stream.
    pub async fn send(&self, message: Message) {
        match self.enqueue(&message).await {
            Ok(delivery) => {
                let outcome = async move {
                    match delivery.await {
                        Ok(Ok(_)) => Ok(()),
                        Ok(Err((e, failed))) => Err(Error::Delivery {
                            partition: failed.partition(),
                            source: e,
                        }),
                        // The delivery future was canceled (client dropped
                        // before the outcome resolved); not a reported
                        // delivery failure.
                        Err(_canceled) => Ok(()),
                    }
                }
                .boxed();
                if self.inflight.send(outcome).await.is_err() {
                    tracing::warn!("in-flight queue is closed; delivery outcome dropped");
                }
            }
            Err(e) => {
                tracing::warn!("failed to enqueue record: {e}");
            }
        }
    }

    /// Takes the bridge's error stream: one entry per record the transport
    /// gave up on. Can be taken once; later calls return `None`.
    pub fn take_error_stream(&mut self) -> Option<mpsc::UnboundedReceiver<Error>> {
        self.errors.take()
    }

    /// Flushes outstanding deliveries and shuts the bridge down. Sending
    /// after close is statically impossible.
    pub async fn close(self) -> Result<()> {
        let AsyncProducer {
            producer,
            topic,
            inflight,
            errors,
            forwarder,
        } = self;
        // Closing the in-flight queue lets the forwarder exit once every
        // queued outcome has resolved.
        drop(inflight);
        drop(errors);

        let flusher = {
            let producer = producer.clone();
            tokio::task::spawn_blocking(move || producer.flush(CLOSE_TIMEOUT))
        };
        match flusher.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Error::Kafka(e)),
            Err(e) => tracing::warn!("flush task failed: {e}"),
        }

        if forwarder.await.is_err() {
            tracing::warn!("delivery forwarder did not stop cleanly");
        }
        tracing::debug!(topic = %topic, "producer bridge closed");
        Ok(())
    }

    /// Hands the record to the transport, waiting out a full transmit
    /// queue. This is the only place `send` can block besides the
    /// in-flight window.
    async fn enqueue(&self, message: &Message) -> std::result::Result<DeliveryFuture, KafkaError> {
        loop {
            let mut record =
                FutureRecord::<Vec<u8>, Vec<u8>>::to(&self.topic).payload(&message.value);
            if let Some(key) = &message.key {
                record = record.key(key);
            }
            match self.producer.send_result(record) {
                Ok(delivery) => return Ok(delivery),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {
                    tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
                }
                Err((e, _)) => return Err(e),
            }
        }
    }
}

/// Awaits queued delivery outcomes in order and relays the failures.
///
/// The sole writer to the error stream. Exits once the in-flight queue has
/// closed and drained, which is what lets `close` finish deterministically.
async fn forward_deliveries(
    mut pending: mpsc::Receiver<DeliveryOutcome>,
    errors: mpsc::UnboundedSender<Error>,
) {
    while let Some(outcome) = pending.recv().await {
        if let Err(e) = outcome.await {
            tracing::warn!("delivery failed: {e}");
            // A dropped error stream is not a reason to stop draining.
            let _ = errors.send(e);
        }
    }
}
