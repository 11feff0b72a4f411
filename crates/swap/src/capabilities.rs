//! What a coordinator needs from the wallet and from the Lightning node.
use async_trait::async_trait;
use bitcoin::{hashes::sha256, Amount, Txid};

use crate::errors::{InvoiceError, WalletError};

/// Pays on-chain.
#[async_trait]
pub trait OnChainPayments: Send + Sync {
    /// Sends `amount` to `address` and returns the txid of the payment. An error means nothing
    /// was broadcast.
    async fn send(&self, amount: Amount, address: &str) -> Result<Txid, WalletError>;

    /// The amount currently available to [`Self::send`].
    async fn spendable_balance(&self) -> Result<Amount, WalletError>;
}

/// Hold invoices, whose settlement is in the hands of whoever knows the preimage.
#[async_trait]
pub trait OffChainInvoices: Send + Sync {
    /// Creates a hold invoice for `hash` and `amount`. `None` if no invoice can be issued.
    async fn create_invoice(
        &self,
        hash: sha256::Hash,
        amount: Amount,
    ) -> Result<Option<String>, InvoiceError>;

    /// Settles the invoice for `sha256(preimage)`, revealing the preimage.
    async fn settle_invoice(&self, preimage: [u8; 32]) -> Result<(), InvoiceError>;

    /// Cancels the invoice for `hash`, releasing any held payment.
    async fn cancel_invoice(&self, hash: sha256::Hash) -> Result<(), InvoiceError>;

    /// Resolves with the preimage once the invoice for `hash` is settled.
    async fn wait_preimage(&self, hash: sha256::Hash) -> Result<[u8; 32], InvoiceError>;
}
