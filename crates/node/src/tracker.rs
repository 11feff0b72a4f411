//! Ordered delivery of node events to the application.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, trace};

use crate::{
    errors::EventQueueClosed,
    events::{NodeEvent, PendingEventRecord},
};

/// Default capacity of the event queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;

/// Application logic that reacts to node events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes one event. Called once per event, in emission order.
    async fn handle_event(&self, record: &PendingEventRecord);
}

/// Owns the bounded event queue and the task that drains it into an [`EventHandler`].
///
/// Producers wait when the queue is full. Nothing is ever dropped, so a slow handler slows the
/// node core down instead of losing events.
#[derive(Debug)]
pub struct EventTracker {
    sender: mpsc::Sender<NodeEvent>,
    delivered: Arc<AtomicU64>,
    consumer: JoinHandle<()>,
}

impl EventTracker {
    /// Spawns the consumer task on the current runtime.
    pub fn new(handler: Arc<dyn EventHandler>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<NodeEvent>(capacity.max(1));
        let delivered = Arc::new(AtomicU64::new(0));

        let counter = delivered.clone();
        let consumer = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let mut record = PendingEventRecord::new(event);
                trace!(kind = record.event.kind(), "delivering event");
                handler.handle_event(&record).await;
                record.delivered = true;
                let total = counter.fetch_add(1, Ordering::SeqCst) + 1;
                trace!(kind = record.event.kind(), delivered = record.delivered, %total, "event delivered");
            }
            debug!("event queue closed, consumer exiting");
        });

        Self {
            sender,
            delivered,
            consumer,
        }
    }

    /// Queues `event`, waiting for room if the queue is full.
    pub async fn enqueue(&self, event: NodeEvent) -> Result<(), EventQueueClosed> {
        self.sender
            .send(event)
            .await
            .map_err(|e| EventQueueClosed(e.0))
    }

    /// Like [`Self::enqueue`], for synchronous callers.
    ///
    /// Blocks the calling thread while the queue is full. Must not be called from within an async
    /// context.
    pub fn enqueue_blocking(&self, event: NodeEvent) -> Result<(), EventQueueClosed> {
        self.sender
            .blocking_send(event)
            .map_err(|e| EventQueueClosed(e.0))
    }

    /// Number of events the handler has finished processing.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Number of events queued but not yet picked up by the consumer.
    pub fn backlog(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Closes the queue and waits until every queued event has been delivered.
    pub async fn shutdown(self) {
        let Self {
            sender, consumer, ..
        } = self;
        drop(sender);
        if let Err(e) = consumer.await {
            debug!(%e, "event consumer ended abnormally");
        }
    }
}
