//! Wallet and invoice doubles backed by a [`MockChain`].
use std::{
    collections::HashMap,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bitcoin::{
    address::NetworkUnchecked,
    hashes::{sha256, Hash},
    Address, Amount, Network, OutPoint, Txid,
};
use parking_lot::Mutex;
use swapline_test_utils::MockChain;
use tokio::sync::Notify;

use crate::{
    capabilities::{OffChainInvoices, OnChainPayments},
    config::SwapConfig,
    coordinator::SwapContext,
    errors::{InvoiceError, StoreError, WalletError},
    store::{InMemorySwapStore, SwapStore},
    types::{SwapRecord, SwapStatus},
};

pub(crate) struct MockWallet {
    chain: Arc<MockChain>,
    balance: Mutex<Amount>,
    sends: AtomicUsize,
}

impl MockWallet {
    pub(crate) fn new(chain: Arc<MockChain>, balance: Amount) -> Self {
        Self {
            chain,
            balance: Mutex::new(balance),
            sends: AtomicUsize::new(0),
        }
    }

    pub(crate) fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OnChainPayments for MockWallet {
    async fn send(&self, amount: Amount, address: &str) -> Result<Txid, WalletError> {
        let address = Address::<NetworkUnchecked>::from_str(address)
            .map_err(|e| WalletError(e.to_string()))?
            .require_network(self.chain.network())
            .map_err(|e| WalletError(e.to_string()))?;

        let mut balance = self.balance.lock();
        *balance = balance
            .checked_sub(amount)
            .ok_or_else(|| WalletError("insufficient funds".to_string()))?;
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(self.chain.send(amount, &address))
    }

    async fn spendable_balance(&self) -> Result<Amount, WalletError> {
        Ok(*self.balance.lock())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invoice {
    Open,
    Settled { preimage: [u8; 32], height: u32 },
    Canceled,
}

/// One invoice book shared by both sides of a swap.
pub(crate) struct MockInvoices {
    chain: Arc<MockChain>,
    book: Mutex<HashMap<sha256::Hash, Invoice>>,
    refuse: AtomicBool,
    changed: Notify,
}

impl MockInvoices {
    pub(crate) fn new(chain: Arc<MockChain>) -> Self {
        Self {
            chain,
            book: Mutex::new(HashMap::new()),
            refuse: AtomicBool::new(false),
            changed: Notify::new(),
        }
    }

    pub(crate) fn refuse_invoices(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_settled(&self, hash: &sha256::Hash) -> bool {
        self.settled_height(hash).is_some()
    }

    /// Chain height at the moment the invoice was settled.
    pub(crate) fn settled_height(&self, hash: &sha256::Hash) -> Option<u32> {
        match self.book.lock().get(hash).copied() {
            Some(Invoice::Settled { height, .. }) => Some(height),
            _ => None,
        }
    }

    pub(crate) fn is_canceled(&self, hash: &sha256::Hash) -> bool {
        self.book.lock().get(hash) == Some(&Invoice::Canceled)
    }

    /// Settles an invoice as a misbehaving counterparty would, with an unrelated preimage.
    pub(crate) fn settle_with(&self, hash: sha256::Hash, preimage: [u8; 32]) {
        let height = self.chain.tip().height;
        self.book
            .lock()
            .insert(hash, Invoice::Settled { preimage, height });
        self.changed.notify_waiters();
    }
}

#[async_trait]
impl OffChainInvoices for MockInvoices {
    async fn create_invoice(
        &self,
        hash: sha256::Hash,
        amount: Amount,
    ) -> Result<Option<String>, InvoiceError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.book.lock().entry(hash).or_insert(Invoice::Open);
        Ok(Some(format!("lnbcrt{}n1{hash}", amount.to_sat())))
    }

    async fn settle_invoice(&self, preimage: [u8; 32]) -> Result<(), InvoiceError> {
        let hash = sha256::Hash::hash(&preimage);
        let invoice = self.book.lock().get(&hash).copied();
        if invoice != Some(Invoice::Open) {
            return Err(InvoiceError(format!("no open invoice for {hash}")));
        }
        self.settle_with(hash, preimage);
        Ok(())
    }

    async fn cancel_invoice(&self, hash: sha256::Hash) -> Result<(), InvoiceError> {
        self.book.lock().insert(hash, Invoice::Canceled);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn wait_preimage(&self, hash: sha256::Hash) -> Result<[u8; 32], InvoiceError> {
        loop {
            let changed = self.changed.notified();
            let invoice = self.book.lock().get(&hash).copied();
            match invoice {
                Some(Invoice::Settled { preimage, .. }) => return Ok(preimage),
                Some(Invoice::Canceled) => {
                    return Err(InvoiceError(format!("invoice for {hash} canceled")))
                }
                _ => {}
            }
            changed.await;
        }
    }
}

/// Wraps an [`InMemorySwapStore`] and can be told to reject saves of records with a funding txid,
/// as a crash right after the wallet paid would.
pub(crate) struct FlakyStore {
    inner: InMemorySwapStore,
    reject_funded: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn new(inner: InMemorySwapStore) -> Self {
        Self {
            inner,
            reject_funded: AtomicBool::new(false),
        }
    }

    pub(crate) fn reject_funded_saves(&self) {
        self.reject_funded.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SwapStore for FlakyStore {
    async fn save(&self, record: &SwapRecord) -> Result<(), StoreError> {
        if record.funding_txid.is_some() && self.reject_funded.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("disk full".to_string()));
        }
        self.inner.save(record).await
    }

    async fn load(&self, hash: &sha256::Hash) -> Result<Option<SwapRecord>, StoreError> {
        self.inner.load(hash).await
    }

    async fn load_by_status(&self, status: SwapStatus) -> Result<Vec<SwapRecord>, StoreError> {
        self.inner.load_by_status(status).await
    }

    async fn load_all(&self) -> Result<Vec<SwapRecord>, StoreError> {
        self.inner.load_all().await
    }

    async fn claim_payment(
        &self,
        hash: &sha256::Hash,
        outpoint: OutPoint,
    ) -> Result<bool, StoreError> {
        self.inner.claim_payment(hash, outpoint).await
    }
}

pub(crate) struct Harness {
    pub(crate) chain: Arc<MockChain>,
    pub(crate) wallet: Arc<MockWallet>,
    pub(crate) invoices: Arc<MockInvoices>,
    pub(crate) store: InMemorySwapStore,
    pub(crate) ctx: Arc<SwapContext>,
}

impl Harness {
    /// A context for the counterparty: same chain, wallet and invoices, its own store.
    pub(crate) fn peer(&self) -> (Arc<SwapContext>, InMemorySwapStore) {
        let store = InMemorySwapStore::new();
        let ctx = SwapContext::new(
            self.chain.clone(),
            self.wallet.clone(),
            self.invoices.clone(),
            Arc::new(store.clone()),
            self.ctx.config.clone(),
        )
        .expect("valid config");
        (Arc::new(ctx), store)
    }

    /// A fresh context on the same store, as after a restart.
    pub(crate) fn restarted(&self) -> Arc<SwapContext> {
        self.with_store(Arc::new(self.store.clone()))
    }

    /// The same context on another store.
    pub(crate) fn with_store(&self, store: Arc<dyn SwapStore>) -> Arc<SwapContext> {
        let ctx = SwapContext::new(
            self.chain.clone(),
            self.wallet.clone(),
            self.invoices.clone(),
            store,
            self.ctx.config.clone(),
        )
        .expect("valid config");
        Arc::new(ctx)
    }
}

pub(crate) fn harness(balance: Amount) -> Harness {
    harness_with_timeout(balance, Duration::from_secs(2))
}

pub(crate) fn harness_with_timeout(balance: Amount, timeout: Duration) -> Harness {
    let chain = Arc::new(MockChain::new());
    let wallet = Arc::new(MockWallet::new(chain.clone(), balance));
    let invoices = Arc::new(MockInvoices::new(chain.clone()));
    let store = InMemorySwapStore::new();
    let config = SwapConfig::new(Network::Regtest)
        .with_min_confirmations(3)
        .with_confirmation_timeout(timeout)
        .with_poll_interval(Duration::from_millis(5));
    let ctx = SwapContext::new(
        chain.clone(),
        wallet.clone(),
        invoices.clone(),
        Arc::new(store.clone()),
        config,
    )
    .expect("valid config");

    Harness {
        chain,
        wallet,
        invoices,
        store,
        ctx: Arc::new(ctx),
    }
}
