//! The explicit application context that wires the node integration layer together.
use std::sync::Arc;

use swapline_chain::{ChainSource, ChainTip};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    broadcaster::TransactionBroadcaster,
    config::NodeConfig,
    core::NodeCoreHandles,
    errors::SyncError,
    filter::ChainFilter,
    listener::ChainSyncListener,
    logger::EventLogger,
    persist::{ArtifactStore, StatePersister},
    sync::ChainSyncWorker,
    tracker::{EventHandler, EventTracker},
};

/// Every long-lived component of the node integration layer.
///
/// Built once at startup and passed to whoever needs a component. Nothing here is global.
#[derive(Debug)]
pub struct NodeContext {
    config: NodeConfig,

    /// The chain source.
    pub chain: Arc<dyn ChainSource>,

    /// Block notifications to the node core.
    pub listener: Arc<ChainSyncListener>,

    /// The node core's watch set.
    pub filter: Arc<ChainFilter>,

    /// Transaction submission.
    pub broadcaster: Arc<TransactionBroadcaster>,

    /// Node core log sink.
    pub logger: Arc<EventLogger>,

    /// Node core state persistence.
    pub persister: Arc<StatePersister>,

    /// Node event delivery.
    pub tracker: Arc<EventTracker>,
}

impl NodeContext {
    /// Builds every component. Must be called within a tokio runtime, since the broadcaster and the
    /// tracker spawn their workers right away.
    ///
    /// `synced_to` is the tip the node core's persisted state was last synced to.
    pub fn new(
        config: NodeConfig,
        chain: Arc<dyn ChainSource>,
        store: Arc<dyn ArtifactStore>,
        synced_to: ChainTip,
        core: NodeCoreHandles,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let listener = Arc::new(ChainSyncListener::new(
            synced_to,
            config.reorg_window,
            core,
        ));
        let filter = Arc::new(ChainFilter::new(chain.clone(), config.maintained_range));
        let broadcaster = Arc::new(TransactionBroadcaster::new(
            chain.clone(),
            config.broadcast.clone(),
        ));
        let logger = Arc::new(EventLogger::new(config.logger.clone()));
        let tracker = Arc::new(EventTracker::new(handler, config.event_queue_capacity));
        let persister = Arc::new(StatePersister::new(
            store,
            config.persist.clone(),
            Arc::downgrade(&tracker),
        ));
        info!(%synced_to, "node context initialized");

        Self {
            config,
            chain,
            listener,
            filter,
            broadcaster,
            logger,
            persister,
            tracker,
        }
    }

    /// The config the context was built from.
    pub const fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// A sync worker over this context's components.
    pub fn sync_worker(&self) -> ChainSyncWorker {
        ChainSyncWorker::new(
            self.chain.clone(),
            self.listener.clone(),
            self.filter.clone(),
        )
    }

    /// Spawns the sync worker, polling at the configured interval until `cancel` fires.
    ///
    /// Only one sync worker may run per context.
    pub fn spawn_sync(&self, cancel: CancellationToken) -> JoinHandle<Result<(), SyncError>> {
        let worker = self.sync_worker();
        let poll_interval = self.config.poll_interval;
        tokio::spawn(async move { worker.run(poll_interval, cancel).await })
    }
}
