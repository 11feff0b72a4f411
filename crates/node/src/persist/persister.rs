//! The [`StatePersister`].
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};
#[cfg(test)]
use std::sync::atomic::AtomicUsize;

use parking_lot::Mutex;
use swapline_common::retry::retry_with_backoff;
use tracing::{debug, error, info, warn};

use super::{
    config::PersistConfig,
    store::{ArtifactStore, PersistedArtifact},
};
use crate::{errors::PersistenceError, events::NodeEvent, tracker::EventTracker};

/// Persists node core state and relays node events to the tracker.
///
/// Writes never overlap: each one holds the write lock until the store has finished.
#[derive(Debug)]
pub struct StatePersister {
    store: Arc<dyn ArtifactStore>,
    config: PersistConfig,
    write_lock: tokio::sync::Mutex<()>,
    degraded: AtomicBool,
    pending: Mutex<HashMap<PersistedArtifact, Vec<u8>>>,
    tracker: Weak<EventTracker>,
}

impl StatePersister {
    /// Creates a persister over `store` that forwards events to `tracker` while it is alive.
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        config: PersistConfig,
        tracker: Weak<EventTracker>,
    ) -> Self {
        Self {
            store,
            config,
            write_lock: tokio::sync::Mutex::new(()),
            degraded: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            tracker,
        }
    }

    /// Durably replaces the channel manager.
    ///
    /// Failed writes are retried with the backoff of [`PersistConfig::retry`]. If every attempt
    /// fails the persister is marked degraded until a later manager write succeeds.
    pub async fn persist_manager(&self, bytes: &[u8]) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;

        let result = retry_with_backoff("persist_manager", &self.config.retry(), || {
            self.store.write(PersistedArtifact::Manager, bytes.to_vec())
        })
        .await;

        match result {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::SeqCst) {
                    info!("manager persisted again, leaving degraded mode");
                }
                debug!(len = bytes.len(), "persisted manager");
                Ok(())
            }
            Err(err) => {
                error!(
                    %err,
                    attempts = self.config.retry().max_attempts(),
                    "manager write failed permanently, channel updates must stop"
                );
                self.degraded.store(true, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Persists the network graph. Best effort: a failure keeps the snapshot pending.
    pub async fn persist_network_graph(&self, bytes: &[u8]) {
        let _guard = self.write_lock.lock().await;
        self.write_snapshot(PersistedArtifact::NetworkGraph, bytes.to_vec())
            .await;
    }

    /// Persists the scorer. Best effort: a failure keeps the snapshot pending.
    pub async fn persist_scorer(&self, bytes: &[u8]) {
        let _guard = self.write_lock.lock().await;
        self.write_snapshot(PersistedArtifact::Scorer, bytes.to_vec())
            .await;
    }

    /// Must be called with the write lock held.
    async fn write_snapshot(&self, artifact: PersistedArtifact, bytes: Vec<u8>) {
        match self.store.write(artifact, bytes.clone()).await {
            Ok(()) => {
                self.pending.lock().remove(&artifact);
                debug!(%artifact, "persisted snapshot");
            }
            Err(err) => {
                warn!(%artifact, %err, "snapshot write failed, keeping it for a later flush");
                self.pending.lock().insert(artifact, bytes);
            }
        }
    }

    /// Retries the pending best-effort snapshots. Returns how many are still pending.
    ///
    /// The pending set is taken under the write lock, so a snapshot persisted after it was
    /// queued is never overwritten by the older pending one.
    pub async fn flush_pending(&self) -> usize {
        let _guard = self.write_lock.lock().await;
        let pending: Vec<(PersistedArtifact, Vec<u8>)> = self.pending.lock().drain().collect();
        for (artifact, bytes) in pending {
            self.write_snapshot(artifact, bytes).await;
        }
        self.pending_count()
    }

    /// Number of best-effort snapshots waiting to be written.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether the last manager write failed permanently.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Fails while the persister is degraded. Callers must check this before extending channel
    /// state.
    pub fn ensure_operational(&self) -> Result<(), PersistenceError> {
        if self.is_degraded() {
            Err(PersistenceError::Degraded)
        } else {
            Ok(())
        }
    }

    /// Reads back a persisted artifact.
    pub async fn load(&self, artifact: PersistedArtifact) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.store.read(artifact).await
    }

    /// Hands `event` to the tracker, waiting while its queue is full. Does nothing once the
    /// tracker is gone.
    pub async fn on_node_event(&self, event: NodeEvent) {
        let Some(tracker) = self.tracker.upgrade() else {
            debug!(kind = event.kind(), "event tracker is gone, dropping event");
            return;
        };
        if let Err(e) = tracker.enqueue(event).await {
            warn!(kind = e.0.kind(), "event queue closed, event not delivered");
        }
    }

    /// Like [`Self::on_node_event`], for node core callbacks that run on a plain thread. Must not
    /// be called from within an async context.
    pub fn on_node_event_blocking(&self, event: NodeEvent) {
        let Some(tracker) = self.tracker.upgrade() else {
            debug!(kind = event.kind(), "event tracker is gone, dropping event");
            return;
        };
        if let Err(e) = tracker.enqueue_blocking(event) {
            warn!(kind = e.0.kind(), "event queue closed, event not delivered");
        }
    }
}
