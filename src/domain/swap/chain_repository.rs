//! Chain repository interface

use async_trait::async_trait;
use crate::shared::errors::RepositoryError;
use super::SwapChainEntity;

/// Storage for discovered swap chains
#[async_trait]
pub trait ChainRepository: Send + Sync {
    async fn get_chain_by_hash(&self, hash: &str) -> Result<Option<SwapChainEntity>, RepositoryError>;

    async fn get_chain_by_id(&self, id: i64) -> Result<Option<SwapChainEntity>, RepositoryError>;

    /// Persists a new chain and returns its id
    async fn create_chain(&self, chain: &SwapChainEntity) -> Result<i64, RepositoryError>;

    async fn update_chain(&self, chain: &SwapChainEntity) -> Result<(), RepositoryError>;

    async fn get_chains(&self) -> Result<Vec<SwapChainEntity>, RepositoryError>;

    /// Remember the chain to use for the next swap of `asset`
    async fn cache_chain(&self, asset: &str, chain: &SwapChainEntity);

    async fn get_cached_chain(&self, asset: &str) -> Option<SwapChainEntity>;
}
