//! The per-swap state machine.
use std::{fmt, str::FromStr, sync::Arc};

use bitcoin::{
    address::NetworkUnchecked,
    hashes::{sha256, Hash},
    Address, Amount, OutPoint, Txid,
};
use swapline_chain::{types::addr_descriptor, ChainResult, ChainSource};
use tokio::{
    select,
    time::{sleep, sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    capabilities::{OffChainInvoices, OnChainPayments},
    config::SwapConfig,
    errors::SwapError,
    store::SwapStore,
    types::{SwapInfo, SwapRecord, SwapRole, SwapStatus},
};

/// Everything a coordinator needs, built once and shared by all swaps.
pub struct SwapContext {
    /// Source of truth for the on-chain leg.
    pub chain: Arc<dyn ChainSource>,

    /// Pays the on-chain leg.
    pub wallet: Arc<dyn OnChainPayments>,

    /// Handles the off-chain leg.
    pub invoices: Arc<dyn OffChainInvoices>,

    /// Where swaps are persisted.
    pub store: Arc<dyn SwapStore>,

    /// How swaps are run.
    pub config: SwapConfig,
}

impl SwapContext {
    /// Builds a context, rejecting an invalid config.
    pub fn new(
        chain: Arc<dyn ChainSource>,
        wallet: Arc<dyn OnChainPayments>,
        invoices: Arc<dyn OffChainInvoices>,
        store: Arc<dyn SwapStore>,
        config: SwapConfig,
    ) -> Result<Self, SwapError> {
        config.validate()?;
        Ok(Self {
            chain,
            wallet,
            invoices,
            store,
            config,
        })
    }
}

impl fmt::Debug for SwapContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapContext")
            .field("chain", &self.chain)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The role-specific state of a swap.
#[derive(Clone, PartialEq, Eq)]
pub enum RoleState {
    /// The side that knows the preimage.
    Holder {
        /// The secret behind the commitment.
        preimage: [u8; 32],

        /// The hold invoice, once created.
        invoice: Option<String>,

        /// The output claimed as payment, once buried.
        payment: Option<OutPoint>,
    },

    /// The side that pays on-chain.
    Seeker {
        /// The on-chain payment, once sent.
        funding_txid: Option<Txid>,

        /// Whether the wallet was asked to pay. Stays set if the txid never made it to the store.
        send_pending: bool,

        /// The preimage, once revealed.
        preimage: Option<[u8; 32]>,
    },
}

impl RoleState {
    /// The role this state belongs to.
    pub const fn role(&self) -> SwapRole {
        match self {
            RoleState::Holder { .. } => SwapRole::Holder,
            RoleState::Seeker { .. } => SwapRole::Seeker,
        }
    }
}

// Preimages stay out of logs.
impl fmt::Debug for RoleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleState::Holder {
                invoice, payment, ..
            } => f
                .debug_struct("Holder")
                .field("invoice", invoice)
                .field("payment", payment)
                .finish_non_exhaustive(),
            RoleState::Seeker {
                funding_txid,
                send_pending,
                preimage,
            } => f
                .debug_struct("Seeker")
                .field("funding_txid", funding_txid)
                .field("send_pending", send_pending)
                .field("revealed", &preimage.is_some())
                .finish(),
        }
    }
}

/// Drives one swap through `open`, `commit` and `cancel`.
///
/// Phases take `&mut self`, so only one runs at a time. A running commit can be stopped from
/// elsewhere through [`Self::abort_handle`].
#[derive(Debug)]
pub struct SubmarineSwapCoordinator {
    ctx: Arc<SwapContext>,
    info: SwapInfo,
    role: RoleState,
    opened_height: u32,
    commit_started: bool,
    abort: CancellationToken,
}

impl SubmarineSwapCoordinator {
    /// A Holder swap committing to `sha256(preimage)`, paid on-chain to `l1_address`.
    pub fn holder(
        ctx: Arc<SwapContext>,
        preimage: [u8; 32],
        l1_address: impl Into<String>,
        amount_sat: u64,
    ) -> Self {
        let info = SwapInfo {
            hash: sha256::Hash::hash(&preimage),
            counterparty_l1_address: l1_address.into(),
            amount_sat,
            status: SwapStatus::Idle,
        };
        Self::from_parts(
            ctx,
            info,
            RoleState::Holder {
                preimage,
                invoice: None,
                payment: None,
            },
            0,
            false,
        )
    }

    /// A Seeker swap for the commitment `hash`, paying on-chain to `l1_address`.
    pub fn seeker(
        ctx: Arc<SwapContext>,
        hash: sha256::Hash,
        l1_address: impl Into<String>,
        amount_sat: u64,
    ) -> Self {
        let info = SwapInfo {
            hash,
            counterparty_l1_address: l1_address.into(),
            amount_sat,
            status: SwapStatus::Idle,
        };
        Self::from_parts(
            ctx,
            info,
            RoleState::Seeker {
                funding_txid: None,
                send_pending: false,
                preimage: None,
            },
            0,
            false,
        )
    }

    pub(crate) fn from_parts(
        ctx: Arc<SwapContext>,
        info: SwapInfo,
        role: RoleState,
        opened_height: u32,
        commit_started: bool,
    ) -> Self {
        Self {
            ctx,
            info,
            role,
            opened_height,
            commit_started,
            abort: CancellationToken::new(),
        }
    }

    /// The swap.
    pub const fn info(&self) -> &SwapInfo {
        &self.info
    }

    /// Current status.
    pub const fn status(&self) -> SwapStatus {
        self.info.status
    }

    /// The local role.
    pub const fn role(&self) -> SwapRole {
        self.role.role()
    }

    /// The role-specific state.
    pub const fn role_state(&self) -> &RoleState {
        &self.role
    }

    /// The preimage, if known: always for a Holder, once revealed for a Seeker.
    pub fn preimage(&self) -> Option<[u8; 32]> {
        match &self.role {
            RoleState::Holder { preimage, .. } => Some(*preimage),
            RoleState::Seeker { preimage, .. } => *preimage,
        }
    }

    /// The Seeker's on-chain payment, once sent.
    pub fn funding_txid(&self) -> Option<Txid> {
        match &self.role {
            RoleState::Seeker { funding_txid, .. } => *funding_txid,
            RoleState::Holder { .. } => None,
        }
    }

    /// Chain tip height when the swap was opened.
    pub const fn opened_height(&self) -> u32 {
        self.opened_height
    }

    /// The Holder's accepted on-chain payment, once claimed.
    pub fn payment(&self) -> Option<OutPoint> {
        match &self.role {
            RoleState::Holder { payment, .. } => *payment,
            RoleState::Seeker { .. } => None,
        }
    }

    fn send_pending(&self) -> bool {
        matches!(self.role, RoleState::Seeker { send_pending: true, .. })
    }

    /// Aborts the waits of a running commit. Once fired, every later wait aborts immediately.
    pub fn abort_handle(&self) -> CancellationToken {
        self.abort.clone()
    }

    fn record(&self, status: SwapStatus) -> SwapRecord {
        SwapRecord {
            info: SwapInfo {
                status,
                ..self.info.clone()
            },
            role: self.role(),
            opened_height: self.opened_height,
            payment: self.payment(),
            funding_txid: self.funding_txid(),
            send_pending: self.send_pending(),
            commit_started: self.commit_started,
        }
    }

    /// Persists the swap with `status`, then adopts that status.
    async fn persist_status(&mut self, status: SwapStatus) -> Result<(), SwapError> {
        self.ctx.store.save(&self.record(status)).await?;
        self.info.status = status;
        Ok(())
    }

    fn amount(&self) -> Amount {
        Amount::from_sat(self.info.amount_sat)
    }

    fn check_address(&self) -> Result<(), SwapError> {
        Address::<NetworkUnchecked>::from_str(&self.info.counterparty_l1_address)
            .map_err(|e| SwapError::PreconditionFailed(format!("invalid address: {e}")))?
            .require_network(self.ctx.config.network)
            .map_err(|e| SwapError::PreconditionFailed(format!("wrong network: {e}")))?;
        Ok(())
    }

    /// `Idle → Opened`.
    ///
    /// The Holder needs an invoice for the hash and amount. The Seeker needs enough spendable
    /// funds. If a precondition fails the swap stays `Idle` and nothing is persisted.
    ///
    /// The chain tip at this point bounds the payment: outputs confirmed at or below it never
    /// pay this swap. The Holder opens before the Seeker pays.
    pub async fn open(&mut self) -> Result<SwapStatus, SwapError> {
        if self.info.status != SwapStatus::Idle {
            return Err(SwapError::InvalidTransition {
                from: self.info.status,
                to: SwapStatus::Opened,
            });
        }

        let hash = self.info.hash;
        let amount = self.amount();
        if amount == Amount::ZERO {
            return Err(SwapError::PreconditionFailed(
                "amount must be positive".to_string(),
            ));
        }
        self.check_address()?;
        if self.ctx.store.load(&hash).await?.is_some() {
            return Err(SwapError::PreconditionFailed(format!(
                "a swap for {hash} already exists"
            )));
        }
        self.opened_height = self
            .ctx
            .chain
            .chaintip_height()
            .await
            .map_err(|e| SwapError::PreconditionFailed(format!("chain tip unavailable: {e}")))?;

        match &mut self.role {
            RoleState::Holder { invoice, .. } => {
                let created = self
                    .ctx
                    .invoices
                    .create_invoice(hash, amount)
                    .await
                    .map_err(|e| SwapError::PreconditionFailed(e.to_string()))?
                    .ok_or_else(|| {
                        SwapError::PreconditionFailed("no invoice could be created".to_string())
                    })?;
                *invoice = Some(created);
            }
            RoleState::Seeker { .. } => {
                let balance = self
                    .ctx
                    .wallet
                    .spendable_balance()
                    .await
                    .map_err(|e| SwapError::PreconditionFailed(e.to_string()))?;
                if balance < amount {
                    return Err(SwapError::PreconditionFailed(format!(
                        "spendable balance {balance} is below {amount}"
                    )));
                }
            }
        }

        if let Err(err) = self.persist_status(SwapStatus::Opened).await {
            if let RoleState::Holder { invoice, .. } = &mut self.role {
                invoice.take();
                if let Err(e) = self.ctx.invoices.cancel_invoice(hash).await {
                    warn!(%hash, %e, "could not release invoice of unpersisted swap");
                }
            }
            return Err(err);
        }

        info!(%hash, role = %self.role(), amount_sat = self.info.amount_sat, "swap opened");
        Ok(SwapStatus::Opened)
    }

    /// `Opened → Committed`.
    ///
    /// The Holder waits until a single output paying at least the amount to the address, confirmed
    /// after the swap was opened, is `min_confirmations` deep. It claims that output in the store
    /// and only then settles the invoice. The Seeker pays once, then waits for the preimage and
    /// checks it against the hash. Both waits are bounded by
    /// `confirmation_timeout`. On failure the swap stays `Opened` and can be committed again or
    /// recovered.
    pub async fn commit(&mut self) -> Result<SwapStatus, SwapError> {
        if self.info.status != SwapStatus::Opened {
            return Err(SwapError::InvalidTransition {
                from: self.info.status,
                to: SwapStatus::Committed,
            });
        }

        self.commit_started = true;
        self.persist_status(SwapStatus::Opened).await?;

        let result = match self.role.clone() {
            RoleState::Holder { preimage, .. } => self.commit_holder(preimage).await,
            RoleState::Seeker {
                funding_txid,
                send_pending,
                ..
            } => self.commit_seeker(funding_txid, send_pending).await,
        };
        if let Err(err) = result {
            warn!(hash = %self.info.hash, %err, "commit failed, swap stays opened");
            return Err(err);
        }

        self.persist_status(SwapStatus::Committed).await?;
        info!(hash = %self.info.hash, role = %self.role(), "swap committed");
        Ok(SwapStatus::Committed)
    }

    async fn commit_holder(&mut self, preimage: [u8; 32]) -> Result<(), SwapError> {
        self.wait_for_buried_payment().await?;
        self.ctx.invoices.settle_invoice(preimage).await?;
        info!(hash = %self.info.hash, "invoice settled, preimage revealed");
        Ok(())
    }

    async fn commit_seeker(
        &mut self,
        funding_txid: Option<Txid>,
        send_pending: bool,
    ) -> Result<(), SwapError> {
        let hash = self.info.hash;
        match funding_txid {
            Some(txid) => debug!(%hash, %txid, "on-chain payment already sent"),
            // A payment may be out without its txid on record.
            None if send_pending => self.find_own_payment().await?,
            None => self.pay().await?,
        }

        let revealed = self.wait_for_preimage().await?;
        if sha256::Hash::hash(&revealed) != hash {
            return Err(SwapError::InvalidPreimage { expected: hash });
        }
        if let RoleState::Seeker { preimage, .. } = &mut self.role {
            *preimage = Some(revealed);
        }
        Ok(())
    }

    /// Sends the on-chain leg. The intent is stored before the wallet is asked to pay.
    async fn pay(&mut self) -> Result<(), SwapError> {
        let hash = self.info.hash;
        self.set_seeker_payment(None, true);
        if let Err(err) = self.persist_status(SwapStatus::Opened).await {
            self.set_seeker_payment(None, false);
            return Err(err);
        }

        let sent = self
            .ctx
            .wallet
            .send(self.amount(), &self.info.counterparty_l1_address)
            .await;
        let txid = match sent {
            Ok(txid) => txid,
            Err(err) => {
                self.set_seeker_payment(None, false);
                if let Err(e) = self.persist_status(SwapStatus::Opened).await {
                    warn!(%hash, %e, "could not clear send intent after wallet failure");
                }
                return Err(err.into());
            }
        };

        self.set_seeker_payment(Some(txid), false);
        info!(%hash, %txid, "on-chain payment sent");
        self.persist_status(SwapStatus::Opened).await
    }

    /// Looks for the payment of an earlier attempt whose txid was lost.
    async fn find_own_payment(&mut self) -> Result<(), SwapError> {
        let hash = self.info.hash;
        match self.payment_candidates().await {
            Ok(candidates) => match candidates.first() {
                Some(&(outpoint, depth)) => {
                    info!(%hash, %outpoint, %depth, "found on-chain payment of an earlier attempt");
                    self.set_seeker_payment(Some(outpoint.txid), false);
                    self.persist_status(SwapStatus::Opened).await?;
                }
                None => warn!(%hash, "earlier on-chain payment not confirmed yet, not paying again"),
            },
            Err(err) => warn!(%hash, %err, "could not look for earlier on-chain payment"),
        }
        Ok(())
    }

    fn set_seeker_payment(&mut self, txid: Option<Txid>, pending: bool) {
        if let RoleState::Seeker {
            funding_txid,
            send_pending,
            ..
        } = &mut self.role
        {
            *funding_txid = txid;
            *send_pending = pending;
        }
    }

    /// Unspent outputs paying at least the amount to the swap address and confirmed after the
    /// swap was opened, with their depth, deepest first.
    async fn payment_candidates(&self) -> ChainResult<Vec<(OutPoint, u32)>> {
        let chain = &self.ctx.chain;
        let descriptor = chain
            .descriptor_info(&addr_descriptor(&self.info.counterparty_l1_address))
            .await?
            .descriptor;
        let tip = chain.chaintip_height().await?;
        let scan = chain.scan_utxo_set(&descriptor).await?;

        // Count against the lower of the two tips.
        let tip = tip.min(scan.height);
        let amount = self.amount();
        let mut candidates: Vec<(OutPoint, u32)> = scan
            .unspents
            .iter()
            .filter(|utxo| utxo.amount >= amount && utxo.height > self.opened_height)
            .map(|utxo| (OutPoint::new(utxo.txid, utxo.vout), utxo.confirmations(tip)))
            .filter(|(_, depth)| *depth > 0)
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(candidates)
    }

    /// Claims `outpoint` as this swap's payment. `false` if it pays another swap.
    async fn claim(&mut self, outpoint: OutPoint) -> Result<bool, SwapError> {
        if let Some(claimed) = self.payment() {
            return Ok(claimed == outpoint);
        }
        if !self.ctx.store.claim_payment(&self.info.hash, outpoint).await? {
            return Ok(false);
        }
        if let RoleState::Holder { payment, .. } = &mut self.role {
            *payment = Some(outpoint);
        }
        Ok(true)
    }

    async fn wait_for_buried_payment(&mut self) -> Result<(), SwapError> {
        let hash = self.info.hash;
        let required = self.ctx.config.min_confirmations;
        let deadline = Instant::now() + self.ctx.config.confirmation_timeout;

        loop {
            match self.payment_candidates().await {
                Ok(candidates) => {
                    for &(outpoint, depth) in candidates.iter().filter(|(_, d)| *d >= required) {
                        if self.claim(outpoint).await? {
                            info!(%hash, %outpoint, %depth, "on-chain payment buried");
                            return Ok(());
                        }
                        debug!(%hash, %outpoint, "output pays another swap");
                    }
                    let depth = candidates.first().map(|(_, depth)| *depth);
                    debug!(%hash, ?depth, %required, "waiting for on-chain payment");
                }
                Err(err) if err.is_transient() => warn!(%err, "could not check on-chain payment"),
                Err(err) => return Err(err.into()),
            }

            select! {
                biased;
                _ = self.abort.cancelled() => return Err(SwapError::Aborted),
                _ = sleep_until(deadline) => return Err(SwapError::ConfirmationTimeout),
                _ = sleep(self.ctx.config.poll_interval) => {}
            }
        }
    }

    async fn wait_for_preimage(&self) -> Result<[u8; 32], SwapError> {
        select! {
            biased;
            _ = self.abort.cancelled() => Err(SwapError::Aborted),
            _ = sleep(self.ctx.config.confirmation_timeout) => Err(SwapError::CounterpartyUnresponsive),
            preimage = self.ctx.invoices.wait_preimage(self.info.hash) => Ok(preimage?),
        }
    }

    /// `Opened → Canceled`. Canceling a canceled swap succeeds again.
    ///
    /// The Holder's invoice is canceled. A Seeker whose on-chain payment has been sent, or may
    /// have been sent, cannot cancel and must see the swap through.
    pub async fn cancel(&mut self) -> Result<SwapStatus, SwapError> {
        match self.info.status {
            SwapStatus::Canceled => return Ok(SwapStatus::Canceled),
            SwapStatus::Opened => {}
            from => {
                return Err(SwapError::InvalidTransition {
                    from,
                    to: SwapStatus::Canceled,
                })
            }
        }

        let hash = self.info.hash;
        match &self.role {
            RoleState::Seeker {
                funding_txid,
                send_pending,
                ..
            } if funding_txid.is_some() || *send_pending => {
                warn!(%hash, ?funding_txid, "refusing to cancel a funded swap");
                return Err(SwapError::FundsInFlight);
            }
            RoleState::Seeker { .. } => {}
            RoleState::Holder { .. } => self.ctx.invoices.cancel_invoice(hash).await?,
        }

        self.persist_status(SwapStatus::Canceled).await?;
        info!(%hash, role = %self.role(), "swap canceled");
        Ok(SwapStatus::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use swapline_test_utils::fixtures::regtest_address;

    use super::*;
    use crate::testing::{harness, harness_with_timeout};

    const AMOUNT: u64 = 50_000;

    fn address() -> String {
        regtest_address(42).to_string()
    }

    #[tokio::test]
    async fn open_cancel_cancel_is_idempotent() {
        let h = harness(Amount::from_sat(AMOUNT));
        let mut holder = SubmarineSwapCoordinator::holder(h.ctx.clone(), [7; 32], address(), AMOUNT);

        assert_eq!(holder.open().await.unwrap(), SwapStatus::Opened);
        assert_eq!(holder.cancel().await.unwrap(), SwapStatus::Canceled);
        assert_eq!(holder.cancel().await.unwrap(), SwapStatus::Canceled);

        assert!(h.invoices.is_canceled(&holder.info().hash));
        let stored = h.store.load(&holder.info().hash).await.unwrap().unwrap();
        assert_eq!(stored.info.status, SwapStatus::Canceled);
    }

    #[tokio::test]
    async fn idle_swap_cannot_be_committed_or_canceled() {
        let h = harness(Amount::from_sat(AMOUNT));
        let mut holder = SubmarineSwapCoordinator::holder(h.ctx.clone(), [11; 32], address(), AMOUNT);

        assert!(matches!(
            holder.commit().await,
            Err(SwapError::InvalidTransition { from: SwapStatus::Idle, to: SwapStatus::Committed })
        ));
        assert!(matches!(
            holder.cancel().await,
            Err(SwapError::InvalidTransition { from: SwapStatus::Idle, to: SwapStatus::Canceled })
        ));
        assert!(h.store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_precondition_is_not_persisted() {
        let h = harness(Amount::from_sat(AMOUNT - 1));
        let hash = sha256::Hash::hash(&[1; 32]);
        let mut seeker = SubmarineSwapCoordinator::seeker(h.ctx.clone(), hash, address(), AMOUNT);

        assert!(matches!(seeker.open().await, Err(SwapError::PreconditionFailed(_))));
        assert_eq!(seeker.status(), SwapStatus::Idle);
        assert!(h.store.load(&hash).await.unwrap().is_none());

        h.invoices.refuse_invoices();
        let mut holder = SubmarineSwapCoordinator::holder(h.ctx.clone(), [2; 32], address(), AMOUNT);
        assert!(matches!(holder.open().await, Err(SwapError::PreconditionFailed(_))));
        assert!(h.store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn address_must_match_network() {
        let h = harness(Amount::from_sat(AMOUNT));
        let mainnet = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
        let mut seeker = SubmarineSwapCoordinator::seeker(
            h.ctx.clone(),
            sha256::Hash::hash(&[3; 32]),
            mainnet,
            AMOUNT,
        );
        assert!(matches!(seeker.open().await, Err(SwapError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn same_hash_cannot_be_opened_twice() {
        let h = harness(Amount::from_sat(AMOUNT));
        let mut first = SubmarineSwapCoordinator::holder(h.ctx.clone(), [12; 32], address(), AMOUNT);
        let mut second = SubmarineSwapCoordinator::holder(h.ctx.clone(), [12; 32], address(), AMOUNT);

        first.open().await.unwrap();
        assert!(matches!(second.open().await, Err(SwapError::PreconditionFailed(_))));
        assert_eq!(second.status(), SwapStatus::Idle);
    }

    #[tokio::test]
    async fn committed_swap_cannot_be_canceled_or_reopened() {
        let h = harness(Amount::from_sat(AMOUNT));
        let mut holder = SubmarineSwapCoordinator::holder(h.ctx.clone(), [4; 32], address(), AMOUNT);
        holder.open().await.unwrap();

        h.chain.send(Amount::from_sat(AMOUNT), &regtest_address(42));
        h.chain.mine(h.ctx.config.min_confirmations);
        assert_eq!(holder.commit().await.unwrap(), SwapStatus::Committed);

        assert!(matches!(
            holder.cancel().await,
            Err(SwapError::InvalidTransition { from: SwapStatus::Committed, .. })
        ));
        assert!(matches!(holder.open().await, Err(SwapError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn holder_never_settles_before_depth() {
        let h = harness(Amount::from_sat(AMOUNT));
        let required = h.ctx.config.min_confirmations;
        let mut holder = SubmarineSwapCoordinator::holder(h.ctx.clone(), [5; 32], address(), AMOUNT);
        let hash = holder.info().hash;
        holder.open().await.unwrap();

        // An output that is too small never counts, however deep.
        h.chain.send(Amount::from_sat(AMOUNT - 1), &regtest_address(42));
        h.chain.mine(required);
        h.chain.send(Amount::from_sat(AMOUNT), &regtest_address(42));
        let commit = tokio::spawn(async move { holder.commit().await });

        for _ in 1..required {
            h.chain.mine(1);
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert!(!h.invoices.is_settled(&hash), "settled before reaching depth");
        }

        h.chain.mine(1);
        let status = tokio::time::timeout(Duration::from_secs(5), commit)
            .await
            .expect("commit finishes")
            .unwrap()
            .unwrap();
        assert_eq!(status, SwapStatus::Committed);

        let payment_height = h.chain.tip().height - required + 1;
        let settled_at = h.invoices.settled_height(&hash).expect("settled");
        assert!(settled_at + 1 - payment_height >= required);
    }

    #[tokio::test]
    async fn swap_of_fifty_thousand_sats_commits_on_both_sides() {
        let h = harness(Amount::from_sat(100_000));
        let preimage = [9; 32];
        let mut holder = SubmarineSwapCoordinator::holder(h.ctx.clone(), preimage, address(), AMOUNT);
        let hash = holder.info().hash;
        let (seeker_ctx, seeker_store) = h.peer();
        let mut seeker = SubmarineSwapCoordinator::seeker(seeker_ctx, hash, address(), AMOUNT);

        holder.open().await.unwrap();
        seeker.open().await.unwrap();

        let holder_task = tokio::spawn(async move { holder.commit().await });
        let seeker_task = tokio::spawn(async move { seeker.commit().await.map(|_| seeker) });

        // Bury the Seeker's payment once it is out.
        while h.wallet.sends() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        h.chain.mine(h.ctx.config.min_confirmations);

        let holder_status = tokio::time::timeout(Duration::from_secs(5), holder_task)
            .await
            .expect("holder finishes")
            .unwrap()
            .unwrap();
        let seeker = tokio::time::timeout(Duration::from_secs(5), seeker_task)
            .await
            .expect("seeker finishes")
            .unwrap()
            .unwrap();

        assert_eq!(holder_status, SwapStatus::Committed);
        assert_eq!(seeker.status(), SwapStatus::Committed);
        assert_eq!(seeker.preimage(), Some(preimage));
        assert_eq!(h.wallet.sends(), 1);
        assert_eq!(h.wallet.spendable_balance().await.unwrap(), Amount::from_sat(50_000));

        let stored = seeker_store.load(&hash).await.unwrap().unwrap();
        assert_eq!(stored.info.status, SwapStatus::Committed);
        assert_eq!(stored.funding_txid, seeker.funding_txid());
    }

    #[tokio::test]
    async fn seeker_rejects_wrong_preimage() {
        let h = harness(Amount::from_sat(AMOUNT));
        let hash = sha256::Hash::hash(&[13; 32]);
        let mut seeker = SubmarineSwapCoordinator::seeker(h.ctx.clone(), hash, address(), AMOUNT);
        seeker.open().await.unwrap();

        h.invoices.settle_with(hash, [14; 32]);
        assert!(matches!(
            seeker.commit().await,
            Err(SwapError::InvalidPreimage { expected }) if expected == hash
        ));
        assert_eq!(seeker.status(), SwapStatus::Opened);
        assert_eq!(seeker.preimage(), None);
    }

    #[tokio::test]
    async fn timeouts_leave_swap_opened() {
        let h = harness_with_timeout(Amount::from_sat(AMOUNT), Duration::from_millis(50));
        let mut holder = SubmarineSwapCoordinator::holder(h.ctx.clone(), [6; 32], address(), AMOUNT);
        holder.open().await.unwrap();
        assert!(matches!(holder.commit().await, Err(SwapError::ConfirmationTimeout)));
        assert_eq!(holder.status(), SwapStatus::Opened);
        assert!(!h.invoices.is_settled(&holder.info().hash));

        let stored = h.store.load(&holder.info().hash).await.unwrap().unwrap();
        assert_eq!(stored.info.status, SwapStatus::Opened);
        assert!(stored.commit_started);
    }

    #[tokio::test]
    async fn funded_seeker_cannot_cancel() {
        let h = harness_with_timeout(Amount::from_sat(AMOUNT), Duration::from_millis(50));
        let hash = sha256::Hash::hash(&[8; 32]);
        let mut seeker = SubmarineSwapCoordinator::seeker(h.ctx.clone(), hash, address(), AMOUNT);
        seeker.open().await.unwrap();

        assert!(matches!(seeker.commit().await, Err(SwapError::CounterpartyUnresponsive)));
        assert!(seeker.funding_txid().is_some());
        assert!(matches!(seeker.cancel().await, Err(SwapError::FundsInFlight)));
        assert_eq!(seeker.status(), SwapStatus::Opened);

        // A second attempt waits again without paying twice.
        assert!(matches!(seeker.commit().await, Err(SwapError::CounterpartyUnresponsive)));
        assert_eq!(h.wallet.sends(), 1);
    }

    #[tokio::test]
    async fn abort_handle_stops_the_wait() {
        let h = harness(Amount::from_sat(AMOUNT));
        let mut holder = SubmarineSwapCoordinator::holder(h.ctx.clone(), [10; 32], address(), AMOUNT);
        holder.open().await.unwrap();

        let abort = holder.abort_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            abort.cancel();
        });
        assert!(matches!(holder.commit().await, Err(SwapError::Aborted)));
        assert_eq!(holder.status(), SwapStatus::Opened);
    }

    #[tokio::test]
    async fn unreachable_chain_is_retried_until_timeout() {
        let h = harness_with_timeout(Amount::from_sat(AMOUNT), Duration::from_millis(80));
        let mut holder = SubmarineSwapCoordinator::holder(h.ctx.clone(), [15; 32], address(), AMOUNT);
        holder.open().await.unwrap();

        h.chain.set_offline(true);
        assert!(matches!(holder.commit().await, Err(SwapError::ConfirmationTimeout)));
    }

    #[tokio::test]
    async fn payment_older_than_the_swap_is_ignored() {
        let h = harness_with_timeout(Amount::from_sat(AMOUNT), Duration::from_millis(50));
        let required = h.ctx.config.min_confirmations;
        let old = h.chain.send(Amount::from_sat(AMOUNT), &regtest_address(42));
        h.chain.mine(required);

        let mut holder = SubmarineSwapCoordinator::holder(h.ctx.clone(), [16; 32], address(), AMOUNT);
        holder.open().await.unwrap();
        assert_eq!(holder.opened_height(), required);
        assert!(matches!(holder.commit().await, Err(SwapError::ConfirmationTimeout)));
        assert!(!h.invoices.is_settled(&holder.info().hash));
        assert_eq!(holder.payment(), None);

        let fresh = h.chain.send(Amount::from_sat(AMOUNT), &regtest_address(42));
        h.chain.mine(required);
        assert_eq!(holder.commit().await.unwrap(), SwapStatus::Committed);
        assert_eq!(holder.payment(), Some(OutPoint::new(fresh, 0)));
        assert_ne!(fresh, old);
    }

    #[tokio::test]
    async fn one_payment_settles_one_holder() {
        let h = harness_with_timeout(Amount::from_sat(AMOUNT), Duration::from_millis(50));
        let mut first = SubmarineSwapCoordinator::holder(h.ctx.clone(), [17; 32], address(), AMOUNT);
        let mut second = SubmarineSwapCoordinator::holder(h.ctx.clone(), [18; 32], address(), AMOUNT);
        first.open().await.unwrap();
        second.open().await.unwrap();

        let txid = h.chain.send(Amount::from_sat(AMOUNT), &regtest_address(42));
        h.chain.mine(h.ctx.config.min_confirmations);

        assert_eq!(first.commit().await.unwrap(), SwapStatus::Committed);
        assert!(matches!(second.commit().await, Err(SwapError::ConfirmationTimeout)));
        assert!(h.invoices.is_settled(&first.info().hash));
        assert!(!h.invoices.is_settled(&second.info().hash));

        let stored = h.store.load(&first.info().hash).await.unwrap().unwrap();
        assert_eq!(stored.payment, Some(OutPoint::new(txid, 0)));
        assert_eq!(h.store.load(&second.info().hash).await.unwrap().unwrap().payment, None);
    }

    #[tokio::test]
    async fn failed_send_leaves_swap_cancelable() {
        let h = harness_with_timeout(Amount::from_sat(AMOUNT), Duration::from_millis(50));
        let mut paid = SubmarineSwapCoordinator::seeker(
            h.ctx.clone(),
            sha256::Hash::hash(&[19; 32]),
            address(),
            AMOUNT,
        );
        let mut broke = SubmarineSwapCoordinator::seeker(
            h.ctx.clone(),
            sha256::Hash::hash(&[20; 32]),
            address(),
            AMOUNT,
        );
        paid.open().await.unwrap();
        broke.open().await.unwrap();

        // The first payment empties the wallet.
        assert!(matches!(paid.commit().await, Err(SwapError::CounterpartyUnresponsive)));
        assert!(matches!(broke.commit().await, Err(SwapError::Wallet(_))));
        assert_eq!(h.wallet.sends(), 1);

        let stored = h.store.load(&broke.info().hash).await.unwrap().unwrap();
        assert!(!stored.send_pending);
        assert_eq!(stored.funding_txid, None);
        assert_eq!(broke.cancel().await.unwrap(), SwapStatus::Canceled);
    }
}
