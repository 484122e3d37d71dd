//! Consumer group session contract.
//!
//! Group-coordinated consumption is a push protocol: the broker grants a
//! session a set of partition claims, delivers records for each claim until
//! it revokes them in a rebalance, and expects processed offsets to be
//! marked back. This module captures that protocol as traits so the bridge
//! can be driven by the live client
//! ([`KafkaSession`](crate::session::KafkaSession)) or by a scripted
//! in-memory session ([`testing::ScriptedSession`](crate::testing)) with
//! identical blocking and teardown behavior.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A record delivered for a claimed partition.
#[derive(Debug, Clone)]
pub struct Record {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition the claim covers.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Record key (if any).
    pub key: Option<Vec<u8>>,
    /// Record payload.
    pub value: Vec<u8>,
    /// Broker timestamp in milliseconds since epoch (if available).
    pub timestamp: Option<i64>,
}

/// One granted partition claim: an exclusive, ordered feed of records that
/// lasts until the claim is revoked or the session ends.
///
/// The feed is bounded, so a handler that stops pulling stalls the session's
/// delivery for this partition; that stall is the backpressure path into the
/// client's own flow control.
#[derive(Debug)]
pub struct Claim {
    /// Claimed topic.
    pub topic: String,
    /// Claimed partition.
    pub partition: i32,
    /// Record feed. Closes when the claim ends.
    pub records: mpsc::Receiver<Record>,
}

/// Offset-marking primitive scoped to one session.
///
/// Marking declares a record processed. The session's auto-commit cycle
/// flushes marks to the broker in the background; a crash between a mark
/// and the next flush redelivers the record to a later session.
pub trait OffsetTracker: Send + Sync {
    /// Marks the record at `offset` as processed.
    fn mark(&self, topic: &str, partition: i32, offset: i64);
}

/// Per-claim callbacks invoked by a [`GroupSession`].
#[async_trait]
pub trait ClaimHandler: Send + Sync {
    /// Runs once after the session joins, before any claim is served.
    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// Runs once after every claim of the session has been released.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    /// Drains one claim. Runs concurrently with the drains of other claims
    /// and must return promptly once `claim.records` closes.
    async fn consume_claim(&self, tracker: Arc<dyn OffsetTracker>, claim: Claim) -> Result<()>;
}

/// One group-coordinated consumption session.
#[async_trait]
pub trait GroupSession: Send + Sync {
    /// Joins the group and blocks for one session generation, invoking
    /// `handler` for each granted claim.
    ///
    /// Returning `Ok(())` means the generation ended normally, through a
    /// rebalance or through `cancel`, and the caller may rejoin. An error
    /// is terminal for the session.
    async fn consume(
        &self,
        topics: &[String],
        handler: Arc<dyn ClaimHandler>,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Tears down the underlying client.
    async fn close(&self) -> Result<()>;
}
