//! Fire-and-forget submission of the transactions produced by the node core.
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bitcoin::{Transaction, Txid};
use serde::{Deserialize, Serialize};
use swapline_chain::{ChainIOError, ChainSource};
use swapline_common::retry::{retry_with_backoff_when, RetryConfig};
use tokio::{
    select,
    sync::mpsc::{unbounded_channel, UnboundedSender},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, error, info};

use crate::subscription::{Publisher, Subscription};

/// `RPC_VERIFY_ALREADY_IN_CHAIN`: the transaction is already confirmed.
const RPC_VERIFY_ALREADY_IN_CHAIN: i64 = -27;

/// Retry policy of the broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Submissions attempted per transaction before giving up, the first one included.
    pub max_attempts: usize,

    /// Delay after the first failed attempt. Doubles after each further failure.
    pub base_delay: Duration,

    /// Upper bound of a single delay.
    pub max_delay: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BroadcastConfig {
    /// Sets the number of attempts.
    pub fn with_max_attempts(self, max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    /// Sets the base and maximum delays.
    pub fn with_delays(self, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            ..self
        }
    }

    fn retry(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(self.max_attempts.saturating_sub(1))
            .with_delays(self.base_delay, self.max_delay)
    }
}

/// Published when a transaction could not be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastFailure {
    /// The transaction that was not submitted.
    pub txid: Txid,

    /// Number of submissions attempted.
    pub attempts: usize,

    /// The error of the last attempt.
    pub error: ChainIOError,
}

#[derive(Debug)]
struct Shared {
    failures: Publisher<BroadcastFailure>,
    stuck: AtomicUsize,
    broadcast: AtomicUsize,
}

/// Submits transactions in the background, retrying transient failures with exponential backoff.
///
/// Transactions that cannot be submitted are counted as stuck and reported to every
/// [`Self::subscribe_failures`] subscription.
#[derive(Debug)]
pub struct TransactionBroadcaster {
    jobs: UnboundedSender<Transaction>,
    shared: Arc<Shared>,
    driver: JoinHandle<()>,
}

impl TransactionBroadcaster {
    /// Spawns the submission worker on the current runtime.
    pub fn new(source: Arc<dyn ChainSource>, config: BroadcastConfig) -> Self {
        let (jobs, mut new_jobs) = unbounded_channel::<Transaction>();
        let shared = Arc::new(Shared {
            failures: Publisher::new(),
            stuck: AtomicUsize::new(0),
            broadcast: AtomicUsize::new(0),
        });
        let retry = config.retry();

        let worker_shared = shared.clone();
        let driver = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            loop {
                select! {
                    job = new_jobs.recv() => match job {
                        Some(tx) => {
                            in_flight.spawn(submit(source.clone(), tx, retry.clone(), worker_shared.clone()));
                        }
                        None => break,
                    },
                    Some(res) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = res {
                            error!(%e, "broadcast task failed");
                        }
                    }
                }
            }

            while in_flight.join_next().await.is_some() {}
            debug!("broadcaster worker exiting");
        });

        Self {
            jobs,
            shared,
            driver,
        }
    }

    /// Queues `tx` for submission and returns immediately.
    pub fn broadcast(&self, tx: Transaction) {
        let txid = tx.compute_txid();
        if self.jobs.send(tx).is_err() {
            error!(%txid, "broadcaster worker has stopped, transaction dropped");
        }
    }

    /// A stream of transactions that could not be submitted.
    pub fn subscribe_failures(&self) -> Subscription<BroadcastFailure> {
        self.shared.failures.subscribe()
    }

    /// Number of transactions given up on.
    pub fn num_stuck(&self) -> usize {
        self.shared.stuck.load(Ordering::Relaxed)
    }

    /// Number of transactions submitted successfully.
    pub fn num_broadcast(&self) -> usize {
        self.shared.broadcast.load(Ordering::Relaxed)
    }
}

impl Drop for TransactionBroadcaster {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

async fn submit(
    source: Arc<dyn ChainSource>,
    tx: Transaction,
    retry: RetryConfig,
    shared: Arc<Shared>,
) {
    let txid = tx.compute_txid();
    let mut attempts = 0;
    let result = retry_with_backoff_when("broadcast", &retry, ChainIOError::is_transient, || {
        attempts += 1;
        source.submit_transaction(&tx)
    })
    .await;

    match result {
        Ok(_) | Err(ChainIOError::Rpc { code: RPC_VERIFY_ALREADY_IN_CHAIN, .. }) => {
            info!(%txid, %attempts, "broadcasted transaction");
            shared.broadcast.fetch_add(1, Ordering::Relaxed);
        }
        Err(error) => {
            error!(%txid, %attempts, %error, "giving up on transaction");
            shared.stuck.fetch_add(1, Ordering::Relaxed);
            shared.failures.publish(BroadcastFailure {
                txid,
                attempts,
                error,
            });
        }
    }
}
