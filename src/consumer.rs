//! Group-coordinated consumer bridge.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ConsumerOptions, TransportConfig};
use crate::error::{Error, Result};
use crate::group::{Claim, ClaimHandler, GroupSession, OffsetTracker};
use crate::message::Message;
use crate::session::KafkaSession;

/// Bridges a consumer group session to one bounded message buffer.
///
/// However many partitions the group assigns, and however often it
/// rebalances, the application sees a single backpressured stream:
/// [`recv`](Consumer::recv) until it yields `None`. Order is preserved per
/// partition; no order is defined across partitions.
///
/// # Delivery contract
///
/// A record's offset is marked only after the record has been accepted into
/// the buffer. A crash can therefore redeliver buffered-but-uncommitted
/// records to the next session, but can never silently lose them
/// (at-least-once). Consumers that cannot tolerate duplicates must
/// deduplicate on their side.
///
/// # Shutdown
///
/// [`close`](Consumer::close) consumes the bridge, which statically
/// serializes it against `recv`; buffered but unread messages are discarded.
pub struct Consumer {
    messages: mpsc::Receiver<Message>,
    errors: Option<mpsc::UnboundedReceiver<Error>>,
    session: Arc<dyn GroupSession>,
    cancel: CancellationToken,
    supervisor: JoinHandle<()>,
}

impl Consumer {
    /// Connects to `options.brokers` and joins `options.group_name`.
    ///
    /// Fails with [`Error::Config`] on invalid options or transport
    /// settings and with [`Error::Connection`] when the brokers cannot be
    /// reached within the configured probe budget.
    pub async fn connect(options: ConsumerOptions, transport: TransportConfig) -> Result<Self> {
        options.validate()?;
        transport.validate()?;
        let (session, session_errors) = KafkaSession::connect(&options, &transport).await?;
        Ok(Self::with_session(options, Arc::new(session), session_errors))
    }

    /// Wires the bridge over an existing session.
    ///
    /// `session_errors` is relayed onto the bridge's error stream, followed
    /// by a terminal [`Error::Session`] if the supervising loop stops on a
    /// failure. This is the entry point for scripted sessions in tests and
    /// for custom transports.
    pub fn with_session(
        options: ConsumerOptions,
        session: Arc<dyn GroupSession>,
        session_errors: mpsc::UnboundedReceiver<Error>,
    ) -> Self {
        let (buffer_tx, buffer_rx) = mpsc::channel(options.capacity());
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(forward_errors(session_errors, error_tx.clone()));

        let handler = Arc::new(BufferingHandler {
            buffer: buffer_tx,
            cancel: cancel.clone(),
        });
        let supervisor = tokio::spawn(supervise(
            Arc::clone(&session),
            vec![options.topic.clone()],
            handler,
            cancel.clone(),
            error_tx,
        ));

        tracing::debug!(
            topic = %options.topic,
            group = %options.group_name,
            "consumer bridge started"
        );

        Self {
            messages: buffer_rx,
            errors: Some(error_rx),
            session,
            cancel,
            supervisor,
        }
    }

    /// Receives the next buffered message.
    ///
    /// Returns `None` once the stream has ended: after [`close`] or after
    /// the supervising loop stopped on a session failure and the remaining
    /// buffer was drained.
    ///
    /// [`close`]: Consumer::close
    pub async fn recv(&mut self) -> Option<Message> {
        self.messages.recv().await
    }

    /// Takes the bridge's error stream.
    ///
    /// Asynchronous transport errors and a terminal session failure arrive
    /// here; the bridge does not interpret them. The stream can be taken
    /// once, typically to drain it from its own task; later calls return
    /// `None`.
    pub fn take_error_stream(&mut self) -> Option<mpsc::UnboundedReceiver<Error>> {
        self.errors.take()
    }

    /// Closes the bridge: stops the supervising loop, unblocks every claim
    /// drain, tears down the session, and ends the message stream.
    pub async fn close(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Err(e) = (&mut self.supervisor).await {
            tracing::warn!("supervising loop did not stop cleanly: {e}");
        }
        self.session.close().await
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        // A dropped bridge must not leave the supervising loop joined to
        // the group forever.
        self.cancel.cancel();
    }
}

/// Claim handler that drains claimed partitions into the shared buffer.
struct BufferingHandler {
    buffer: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

#[async_trait]
impl ClaimHandler for BufferingHandler {
    async fn consume_claim(&self, tracker: Arc<dyn OffsetTracker>, mut claim: Claim) -> Result<()> {
        tracing::debug!(topic = %claim.topic, partition = claim.partition, "claim drain started");
        while let Some(record) = claim.records.recv().await {
            let topic = record.topic;
            let partition = record.partition;
            let offset = record.offset;
            let message = Message {
                key: record.key,
                value: record.value,
            };
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                pushed = self.buffer.send(message) => {
                    if pushed.is_err() {
                        // The receiving side is gone; nothing left to drain into.
                        break;
                    }
                    // The push must land before the mark: a crash in between
                    // redelivers the record instead of losing it.
                    tracker.mark(&topic, partition, offset);
                }
            }
        }
        tracing::debug!(topic = %claim.topic, partition = claim.partition, "claim drain ended");
        Ok(())
    }
}

/// Supervising loop: rejoins the group after every normal session end and
/// stops on cancellation or a session failure.
async fn supervise(
    session: Arc<dyn GroupSession>,
    topics: Vec<String>,
    handler: Arc<BufferingHandler>,
    cancel: CancellationToken,
    errors: mpsc::UnboundedSender<Error>,
) {
    loop {
        match session
            .consume(&topics, handler.clone(), cancel.clone())
            .await
        {
            Ok(()) => {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::debug!("group session ended, rejoining");
            }
            Err(e) => {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::error!("group session failed: {e}");
                let fatal = match e {
                    Error::Session(_) => e,
                    other => Error::Session(other.to_string()),
                };
                let _ = errors.send(fatal);
                break;
            }
        }
    }
    tracing::debug!("supervising loop stopped");
    // Dropping the handler here closes the message buffer, ending the
    // stream for the application exactly once.
}

/// Relays the session's error stream onto the bridge's. Exits when either
/// side closes.
async fn forward_errors(
    mut source: mpsc::UnboundedReceiver<Error>,
    sink: mpsc::UnboundedSender<Error>,
) {
    while let Some(error) = source.recv().await {
        tracing::warn!("transport error: {error}");
        if sink.send(error).is_err() {
            break;
        }
    }
}
