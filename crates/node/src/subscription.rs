//! Fan-out of notifications to any number of [`Subscription`]s.
use std::{
    pin::Pin,
    task::{Context, Poll},
};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A stream of notifications, consumed through its [`futures::Stream`] implementation.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Number of notifications waiting to be consumed.
    pub fn backlog(&self) -> usize {
        self.receiver.len()
    }
}

impl<T> futures::Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

/// Hands out subscriptions and delivers every published value to each live one.
///
/// Subscriptions that have been dropped are pruned on the next publish.
#[derive(Debug)]
pub(crate) struct Publisher<T> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> Publisher<T> {
    pub(crate) const fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> Subscription<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders.lock().push(sender);
        Subscription { receiver }
    }

    /// Returns the number of subscriptions the value was delivered to.
    pub(crate) fn publish(&self, value: T) -> usize {
        let mut senders = self.senders.lock();
        senders.retain(|s| s.send(value.clone()).is_ok());
        senders.len()
    }
}
