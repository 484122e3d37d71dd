//! In-memory test support.
//!
//! [`ScriptedSession`] replays a scripted sequence of group session
//! generations against a [`ClaimHandler`], with the same blocking and
//! teardown behavior as the live session: claim feeds are bounded, claims
//! interleave, and a generation tears its claims down before it ends. Every
//! offset mark lands in a shared ledger so tests can assert on commit
//! ordering relative to delivery.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::group::{Claim, ClaimHandler, GroupSession, OffsetTracker, Record};

/// Capacity of scripted claim feeds. One, so backpressure is observable
/// with the smallest possible script.
const FEED_CAPACITY: usize = 1;

/// How one scripted generation ends, after its claims have drained.
pub enum SessionEnd {
    /// The broker rebalanced: `consume` returns `Ok(())` and the
    /// supervising loop is expected to rejoin.
    Rebalance,
    /// The session fails with [`Error::Session`].
    Fail(String),
    /// The session holds until cancelled, like a healthy idle session.
    HoldUntilCancelled,
}

/// One scripted generation: the claims granted and how the session ends.
pub struct Generation {
    pub claims: Vec<ScriptedClaim>,
    pub end: SessionEnd,
}

/// Records delivered for one claimed partition, in delivery order.
pub struct ScriptedClaim {
    pub topic: String,
    pub partition: i32,
    pub records: Vec<Record>,
}

/// Marked offsets as `(topic, partition, offset)`, in mark order.
pub type MarkLedger = Arc<Mutex<Vec<(String, i32, i64)>>>;

/// A [`GroupSession`] that replays scripted generations.
///
/// Each `consume` call pops the next generation; once the script is
/// exhausted the session holds open until cancelled, so a bridge under test
/// stays alive for as long as the test needs it.
pub struct ScriptedSession {
    generations: Mutex<VecDeque<Generation>>,
    marks: MarkLedger,
    closed: AtomicBool,
}

impl ScriptedSession {
    pub fn new(generations: Vec<Generation>) -> Self {
        Self {
            generations: Mutex::new(generations.into()),
            marks: Arc::new(Mutex::new(Vec::new())),
            closed: AtomicBool::new(false),
        }
    }

    /// Shared handle to the mark ledger.
    pub fn marks(&self) -> MarkLedger {
        Arc::clone(&self.marks)
    }

    /// Whether `close` has been called on the session.
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GroupSession for ScriptedSession {
    async fn consume(
        &self,
        _topics: &[String],
        handler: Arc<dyn ClaimHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let generation = self.generations.lock().unwrap().pop_front();
        let Some(generation) = generation else {
            cancel.cancelled().await;
            return Ok(());
        };

        handler.setup().await?;

        let tracker: Arc<dyn OffsetTracker> = Arc::new(LedgerTracker {
            marks: Arc::clone(&self.marks),
        });
        let mut drains: Vec<JoinHandle<()>> = Vec::new();
        let mut feeders: Vec<JoinHandle<()>> = Vec::new();

        for scripted in generation.claims {
            let (feed_tx, feed_rx) = mpsc::channel(FEED_CAPACITY);
            let claim = Claim {
                topic: scripted.topic,
                partition: scripted.partition,
                records: feed_rx,
            };
            let handler = Arc::clone(&handler);
            let tracker = Arc::clone(&tracker);
            drains.push(tokio::spawn(async move {
                let _ = handler.consume_claim(tracker, claim).await;
            }));

            // Feed each claim from its own task so claims interleave, as
            // they do on a live session.
            let cancel = cancel.clone();
            feeders.push(tokio::spawn(async move {
                for record in scripted.records {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = feed_tx.send(record) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }));
        }

        // Feeders drop their senders when done, closing the claim feeds;
        // the drains then run out and the generation can end.
        for feeder in feeders {
            let _ = feeder.await;
        }
        for drain in drains {
            let _ = drain.await;
        }
        handler.cleanup().await?;

        match generation.end {
            SessionEnd::Rebalance => Ok(()),
            SessionEnd::Fail(reason) => Err(Error::Session(reason)),
            SessionEnd::HoldUntilCancelled => {
                cancel.cancelled().await;
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct LedgerTracker {
    marks: MarkLedger,
}

impl OffsetTracker for LedgerTracker {
    fn mark(&self, topic: &str, partition: i32, offset: i64) {
        self.marks
            .lock()
            .unwrap()
            .push((topic.to_string(), partition, offset));
    }
}

/// Builds an in-order record sequence for one partition, offsets starting
/// at `first_offset`.
pub fn records(topic: &str, partition: i32, first_offset: i64, payloads: &[&str]) -> Vec<Record> {
    payloads
        .iter()
        .enumerate()
        .map(|(i, payload)| Record {
            topic: topic.to_string(),
            partition,
            offset: first_offset + i as i64,
            key: None,
            value: payload.as_bytes().to_vec(),
            timestamp: None,
        })
        .collect()
}
