use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bitcoin::{hashes::sha256, OutPoint};
use parking_lot::RwLock;

use super::SwapStore;
use crate::{
    errors::StoreError,
    types::{SwapRecord, SwapStatus},
};

/// A [`SwapStore`] that lives in memory. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemorySwapStore {
    records: Arc<RwLock<BTreeMap<sha256::Hash, SwapRecord>>>,
}

impl InMemorySwapStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SwapStore for InMemorySwapStore {
    async fn save(&self, record: &SwapRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .insert(record.info.hash, record.clone());
        Ok(())
    }

    async fn load(&self, hash: &sha256::Hash) -> Result<Option<SwapRecord>, StoreError> {
        Ok(self.records.read().get(hash).cloned())
    }

    async fn load_by_status(&self, status: SwapStatus) -> Result<Vec<SwapRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.info.status == status)
            .cloned()
            .collect())
    }

    async fn load_all(&self) -> Result<Vec<SwapRecord>, StoreError> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn claim_payment(
        &self,
        hash: &sha256::Hash,
        outpoint: OutPoint,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write();
        if records
            .values()
            .any(|r| r.payment == Some(outpoint) && r.info.hash != *hash)
        {
            return Ok(false);
        }

        let record = records.get_mut(hash).ok_or(StoreError::NotFound(*hash))?;
        match record.payment {
            Some(claimed) => Ok(claimed == outpoint),
            None => {
                record.payment = Some(outpoint);
                Ok(true)
            }
        }
    }
}
