//! Target-chain confirmation tracking.
//!
//! Polls the target chain every 30 seconds until a transaction accumulates
//! the required confirmations (default 12), the observation window elapses,
//! or shutdown flips.

use crosslink_api::target::TargetChain;
use crosslink_types::error::TargetError;
use crosslink_types::Hash32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Default poll cadence.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Default observation window.
pub const OBSERVATION_WINDOW: Duration = Duration::from_secs(600);

/// How a confirmation wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The transaction reached the required confirmations.
    Finalized(u64),
    /// The observation window elapsed first.
    TimedOut,
    /// Shutdown flipped mid-wait.
    Cancelled,
}

/// Tracks confirmations for anchoring transactions.
pub struct ConfirmationTracker {
    target: Arc<dyn TargetChain>,
    required: u64,
    poll_interval: Duration,
    window: Duration,
}

impl ConfirmationTracker {
    pub fn new(target: Arc<dyn TargetChain>, required: u64) -> Self {
        ConfirmationTracker {
            target,
            required,
            poll_interval: POLL_INTERVAL,
            window: OBSERVATION_WINDOW,
        }
    }

    /// Overrides the poll cadence and window (tests, fast chains).
    pub fn with_timing(mut self, poll_interval: Duration, window: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.window = window;
        self
    }

    /// Waits until `tx_hash` is final, the window elapses, or shutdown.
    pub async fn wait_final(
        &self,
        tx_hash: &Hash32,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<ConfirmOutcome, TargetError> {
        let deadline = Instant::now() + self.window;
        loop {
            let confirmations = self.target.confirmations(tx_hash).await?;
            debug!(
                target: "confirm",
                tx = %tx_hash,
                confirmations,
                required = self.required,
                "confirmation poll"
            );
            if confirmations >= self.required {
                info!(target: "confirm", tx = %tx_hash, confirmations, "finalized");
                return Ok(ConfirmOutcome::Finalized(confirmations));
            }
            if Instant::now() >= deadline {
                return Ok(ConfirmOutcome::TimedOut);
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(ConfirmOutcome::Cancelled);
                    }
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crosslink_api::target::{AnchorStatus, ComprehensiveProof};
    use crosslink_types::batch::Anchor;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingTarget {
        per_poll: AtomicU64,
    }

    #[async_trait]
    impl TargetChain for CountingTarget {
        async fn create_anchor(&self, _: &Anchor) -> Result<Hash32, TargetError> {
            Ok(Hash32::ZERO)
        }
        async fn execute_comprehensive_proof(
            &self,
            _: &Hash32,
            _: &ComprehensiveProof,
        ) -> Result<Hash32, TargetError> {
            Ok(Hash32::ZERO)
        }
        async fn execute_with_governance(
            &self,
            _: &Hash32,
            _: &[u8; 20],
            _: u128,
            _: &[u8],
        ) -> Result<Hash32, TargetError> {
            Ok(Hash32::ZERO)
        }
        async fn anchor_status(&self, _: &Hash32) -> Result<AnchorStatus, TargetError> {
            Ok(AnchorStatus::default())
        }
        async fn confirmations(&self, _: &Hash32) -> Result<u64, TargetError> {
            Ok(self.per_poll.fetch_add(4, Ordering::SeqCst))
        }
        fn chain_label(&self) -> &str {
            "eip155:31337"
        }
    }

    #[tokio::test]
    async fn finalizes_when_confirmations_accumulate() {
        let tracker = ConfirmationTracker::new(
            Arc::new(CountingTarget {
                per_poll: AtomicU64::new(0),
            }),
            12,
        )
        .with_timing(Duration::from_millis(5), Duration::from_secs(5));
        let (_tx, mut shutdown) = watch::channel(false);
        let outcome = tracker
            .wait_final(&Hash32([1u8; 32]), &mut shutdown)
            .await
            .unwrap();
        assert_eq!(outcome, ConfirmOutcome::Finalized(12));
    }

    #[tokio::test]
    async fn window_elapse_times_out() {
        let tracker = ConfirmationTracker::new(
            Arc::new(CountingTarget {
                per_poll: AtomicU64::new(0),
            }),
            u64::MAX,
        )
        .with_timing(Duration::from_millis(5), Duration::from_millis(20));
        let (_tx, mut shutdown) = watch::channel(false);
        let outcome = tracker
            .wait_final(&Hash32([1u8; 32]), &mut shutdown)
            .await
            .unwrap();
        assert_eq!(outcome, ConfirmOutcome::TimedOut);
    }

    #[tokio::test]
    async fn shutdown_cancels_the_wait() {
        let tracker = ConfirmationTracker::new(
            Arc::new(CountingTarget {
                per_poll: AtomicU64::new(0),
            }),
            u64::MAX,
        )
        .with_timing(Duration::from_secs(30), Duration::from_secs(600));
        let (tx, mut shutdown) = watch::channel(false);
        let wait = tracker.wait_final(&Hash32([1u8; 32]), &mut shutdown);
        tokio::pin!(wait);

        tokio::select! {
            _ = &mut wait => panic!("should not finish before cancel"),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }
        tx.send(true).unwrap();
        assert_eq!(wait.await.unwrap(), ConfirmOutcome::Cancelled);
    }
}
