//! Turns finder candidates into persistable chain entities

use tracing::error;

use crate::shared::errors::SwapError;
use super::{check_chain_consistency, ChainStatistics, Percent, SwapChainCandidate, SwapChainEntity};

#[derive(Debug, Clone, Copy, Default)]
pub struct SwapChainBuilder;

impl SwapChainBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the entity for `candidate`, keeping identity of an `existing` chain with the same hash
    pub fn build_entity(
        &self,
        candidate: &SwapChainCandidate,
        percent: Percent,
        statistics: ChainStatistics,
        existing: Option<&SwapChainEntity>,
        now: i64,
    ) -> Result<SwapChainEntity, SwapError> {
        if let Err(err) = check_chain_consistency(candidate.legs()) {
            error!("Inconsistent swap chain {}: {}", candidate.title, err);
            return Err(err);
        }

        let hash = candidate.hash();
        if let Some(existing) = existing {
            if existing.hash != hash {
                error!(
                    "Swap chain {} does not match stored chain {}",
                    hash, existing.hash
                );
                return Err(SwapError::InconsistentChain(format!(
                    "hash {} differs from stored {}",
                    hash, existing.hash
                )));
            }
        }

        Ok(SwapChainEntity {
            id: existing.and_then(|e| e.id),
            title: candidate.title.clone(),
            chain_type: candidate.chain_type.clone(),
            hash,
            swap_one: candidate.swap_one.clone(),
            swap_two: candidate.swap_two.clone(),
            swap_three: candidate.swap_three.clone(),
            percent,
            statistics,
            created_at: existing.map_or(now, |e| e.created_at),
            updated_at: now,
        })
    }
}
