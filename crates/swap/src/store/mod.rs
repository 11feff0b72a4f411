//! Durable storage of swap records, keyed by hash.
use async_trait::async_trait;
use bitcoin::{hashes::sha256, OutPoint};

use crate::{
    errors::StoreError,
    types::{SwapRecord, SwapStatus},
};

mod memory;
mod sqlite;

pub use memory::InMemorySwapStore;
pub use sqlite::SqliteSwapStore;

/// Stores [`SwapRecord`]s.
#[async_trait]
pub trait SwapStore: Send + Sync {
    /// Inserts or replaces the record with the same hash.
    async fn save(&self, record: &SwapRecord) -> Result<(), StoreError>;

    /// Loads the record for `hash`.
    async fn load(&self, hash: &sha256::Hash) -> Result<Option<SwapRecord>, StoreError>;

    /// Loads every record with `status`.
    async fn load_by_status(&self, status: SwapStatus) -> Result<Vec<SwapRecord>, StoreError>;

    /// Loads every record.
    async fn load_all(&self) -> Result<Vec<SwapRecord>, StoreError>;

    /// Records `outpoint` as the payment of the swap `hash`, atomically with respect to every
    /// other claim on the store.
    ///
    /// Returns `false` if another swap already claimed `outpoint` or if this swap claimed a
    /// different output. Claiming the same output again returns `true`.
    async fn claim_payment(
        &self,
        hash: &sha256::Hash,
        outpoint: OutPoint,
    ) -> Result<bool, StoreError>;
}
