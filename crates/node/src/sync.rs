//! The sequential worker that keeps the node core in step with the chain source.
use std::{sync::Arc, time::Duration};

use swapline_chain::{ChainSource, ChainTip};
use tokio::{select, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{errors::SyncError, filter::ChainFilter, listener::ChainSyncListener};

/// What a single sync pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Number of blocks disconnected while unwinding a fork.
    pub disconnected: u32,

    /// Number of blocks connected.
    pub connected: u32,
}

impl SyncOutcome {
    /// Whether the pass changed the local tip.
    pub const fn changed(&self) -> bool {
        self.disconnected > 0 || self.connected > 0
    }
}

/// Feeds blocks from a [`ChainSource`] to the [`ChainFilter`] and the [`ChainSyncListener`].
///
/// There must be exactly one worker per listener: it is the only writer of block notifications.
#[derive(Debug)]
pub struct ChainSyncWorker {
    source: Arc<dyn ChainSource>,
    listener: Arc<ChainSyncListener>,
    filter: Arc<ChainFilter>,
}

impl ChainSyncWorker {
    /// Creates a worker. No chain access happens until [`Self::sync_once`] or [`Self::run`].
    pub fn new(
        source: Arc<dyn ChainSource>,
        listener: Arc<ChainSyncListener>,
        filter: Arc<ChainFilter>,
    ) -> Self {
        Self {
            source,
            listener,
            filter,
        }
    }

    /// Brings the local tip to the remote tip.
    ///
    /// Local blocks that are no longer on the remote chain are disconnected first, newest first.
    /// At most as many blocks as the listener's reorg window are unwound; a deeper fork is an
    /// error. A local tip whose hash is unknown is assumed to be on the remote chain.
    pub async fn sync_once(&self) -> Result<SyncOutcome, SyncError> {
        let remote = self.source.chaintip().await?;
        let mut local = self.listener.tip();
        let mut outcome = SyncOutcome::default();

        if local == remote {
            trace!(%local, "already at remote tip");
            return Ok(outcome);
        }

        let window = self.listener.reorg_window();
        while self.diverged(&local, &remote).await? {
            if outcome.disconnected as usize >= window || local.height == 0 {
                error!(%local, %remote, %window, "fork is deeper than the reorg window");
                return Err(SyncError::ReorgTooDeep { window });
            }

            let header = self.filter.indexed_header(&local.hash);
            self.listener.disconnect_block(header.as_ref(), local.height);
            self.filter.block_disconnected(&local.hash, local.height);
            outcome.disconnected += 1;
            local = self.listener.tip();
        }

        for height in local.height + 1..=remote.height {
            let hash = self.source.block_hash(height).await?;
            let block = self.source.block(&hash).await?;

            let tip = self.listener.tip();
            if tip.is_hash_known() && block.header.prev_blockhash != tip.hash {
                // The remote chain moved under us. The next pass unwinds it.
                debug!(%height, %tip, "remote chain changed during sync");
                break;
            }

            self.filter.block_connected(&block, height);
            self.listener.connect_block(&block, height);
            outcome.connected += 1;
        }

        if outcome.changed() {
            info!(
                tip = %self.listener.tip(),
                connected = outcome.connected,
                disconnected = outcome.disconnected,
                "synced to chain source"
            );
        }
        Ok(outcome)
    }

    async fn diverged(&self, local: &ChainTip, remote: &ChainTip) -> Result<bool, SyncError> {
        if local.height > remote.height {
            return Ok(true);
        }
        if !local.is_hash_known() {
            return Ok(false);
        }
        if local.height == remote.height {
            return Ok(local.hash != remote.hash);
        }
        Ok(self.source.block_hash(local.height).await? != local.hash)
    }

    /// Calls [`Self::sync_once`] every `poll_interval` until `cancel` fires.
    ///
    /// Chain source errors are logged and retried on the next tick. A fork deeper than the reorg
    /// window ends the loop with an error.
    pub async fn run(
        &self,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Result<(), SyncError> {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(?poll_interval, "starting chain sync worker");

        loop {
            select! {
                _ = cancel.cancelled() => {
                    info!("chain sync worker cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.sync_once().await {
                        Ok(_) => {}
                        Err(SyncError::Chain(err)) => warn!(%err, "chain sync failed, retrying on next tick"),
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use swapline_test_utils::MockChain;

    use super::*;
    use crate::{
        core::testing::{recording_core, Notification},
        filter::DEFAULT_MAINTAINED_RANGE,
        listener::DEFAULT_REORG_WINDOW,
    };

    struct Harness {
        chain: Arc<MockChain>,
        listener: Arc<ChainSyncListener>,
        filter: Arc<ChainFilter>,
        worker: ChainSyncWorker,
        log: Arc<parking_lot::Mutex<Vec<Notification>>>,
    }

    fn harness(window: usize) -> Harness {
        let chain = Arc::new(MockChain::new());
        let (core, log) = recording_core();
        let listener = Arc::new(ChainSyncListener::new(ChainTip::unknown_hash(0), window, core));
        let filter = Arc::new(ChainFilter::new(chain.clone(), DEFAULT_MAINTAINED_RANGE));
        let worker = ChainSyncWorker::new(chain.clone(), listener.clone(), filter.clone());
        Harness {
            chain,
            listener,
            filter,
            worker,
            log,
        }
    }

    #[tokio::test]
    async fn catches_up_to_remote_tip() {
        let h = harness(DEFAULT_REORG_WINDOW);
        h.chain.mine(5);

        let outcome = h.worker.sync_once().await.unwrap();
        assert_eq!(outcome, SyncOutcome { disconnected: 0, connected: 5 });
        assert_eq!(h.listener.tip(), h.chain.tip());
        assert_eq!(h.filter.indexed_tip().map(|(height, _)| height), Some(5));

        assert!(!h.worker.sync_once().await.unwrap().changed());
    }

    #[tokio::test]
    async fn unwinds_a_reorg_before_connecting() {
        let h = harness(DEFAULT_REORG_WINDOW);
        h.chain.mine(5);
        h.worker.sync_once().await.unwrap();
        h.log.lock().clear();

        h.chain.reorg(2);
        h.chain.mine(3);
        let outcome = h.worker.sync_once().await.unwrap();

        assert_eq!(outcome, SyncOutcome { disconnected: 2, connected: 3 });
        assert_eq!(h.listener.tip(), h.chain.tip());

        let heights: Vec<(bool, u32)> = h
            .log
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Connected { name: "manager", height, .. } => Some((true, *height)),
                Notification::Disconnected { name: "manager", height } => Some((false, *height)),
                _ => None,
            })
            .collect();
        assert_eq!(
            heights,
            vec![(false, 5), (false, 4), (true, 4), (true, 5), (true, 6)]
        );
    }

    #[tokio::test]
    async fn fork_deeper_than_window_is_an_error() {
        let h = harness(2);
        h.chain.mine(5);
        h.worker.sync_once().await.unwrap();

        h.chain.reorg(3);
        h.chain.mine(4);
        assert!(matches!(
            h.worker.sync_once().await,
            Err(SyncError::ReorgTooDeep { window: 2 })
        ));
    }

    #[tokio::test]
    async fn run_survives_outages_and_stops_on_cancel() {
        let h = harness(DEFAULT_REORG_WINDOW);
        h.chain.set_offline(true);
        let cancel = CancellationToken::new();

        let worker = h.worker;
        let chain = h.chain.clone();
        let listener = h.listener.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            worker.run(Duration::from_millis(10), token).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        chain.mine(2);
        chain.set_offline(false);
        for _ in 0..100 {
            if listener.tip().height == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(listener.tip(), chain.tip());

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
