//! Picking up swaps that were opened before a restart.
use std::sync::Arc;

use bitcoin::hashes::{sha256, Hash};
use tracing::info;

use crate::{
    coordinator::{RoleState, SubmarineSwapCoordinator, SwapContext},
    errors::SwapError,
    types::{SwapRecord, SwapRole, SwapStatus},
};

/// An `Opened` swap found in the store.
#[derive(Debug)]
pub struct PendingSwap {
    ctx: Arc<SwapContext>,
    record: SwapRecord,
}

impl PendingSwap {
    /// The stored swap.
    pub const fn record(&self) -> &SwapRecord {
        &self.record
    }

    /// The local role in the swap.
    pub const fn role(&self) -> SwapRole {
        self.record.role
    }

    /// Resumes a Seeker swap. A payment already sent, or possibly sent, is never repeated by the
    /// next commit.
    pub fn resume_seeker(self) -> Result<SubmarineSwapCoordinator, SwapError> {
        if self.record.role != SwapRole::Seeker {
            return Err(SwapError::PreconditionFailed(format!(
                "swap {} is not a seeker swap",
                self.record.info.hash
            )));
        }
        let role = RoleState::Seeker {
            funding_txid: self.record.funding_txid,
            send_pending: self.record.send_pending,
            preimage: None,
        };
        Ok(self.into_coordinator(role))
    }

    /// Resumes a Holder swap. The preimage is not stored and has to be supplied again.
    pub fn resume_holder(self, preimage: [u8; 32]) -> Result<SubmarineSwapCoordinator, SwapError> {
        if self.record.role != SwapRole::Holder {
            return Err(SwapError::PreconditionFailed(format!(
                "swap {} is not a holder swap",
                self.record.info.hash
            )));
        }
        if sha256::Hash::hash(&preimage) != self.record.info.hash {
            return Err(SwapError::InvalidPreimage {
                expected: self.record.info.hash,
            });
        }
        let role = RoleState::Holder {
            preimage,
            invoice: None,
            payment: self.record.payment,
        };
        Ok(self.into_coordinator(role))
    }

    fn into_coordinator(self, role: RoleState) -> SubmarineSwapCoordinator {
        info!(hash = %self.record.info.hash, role = %self.record.role, "resuming swap");
        SubmarineSwapCoordinator::from_parts(
            self.ctx,
            self.record.info,
            role,
            self.record.opened_height,
            self.record.commit_started,
        )
    }
}

/// Loads every swap left `Opened` in the context's store.
pub async fn recover_pending(ctx: Arc<SwapContext>) -> Result<Vec<PendingSwap>, SwapError> {
    let records = ctx.store.load_by_status(SwapStatus::Opened).await?;
    info!(count = records.len(), "found pending swaps");
    Ok(records
        .into_iter()
        .map(|record| PendingSwap {
            ctx: ctx.clone(),
            record,
        })
        .collect())
}
