//! Swap chains and the per-asset best-chain cache

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::swap::{ChainRepository, SwapChainEntity};
use crate::shared::errors::RepositoryError;

#[derive(Default)]
struct ChainState {
    next_id: i64,
    chains: Vec<SwapChainEntity>,
    cached: HashMap<String, SwapChainEntity>,
}

/// Chain repository; ids are assigned sequentially from 1
#[derive(Default)]
pub struct InMemoryChainRepository {
    state: RwLock<ChainState>,
}

impl InMemoryChainRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository seeded with `chains`, numbered from 1 in order
    pub fn with_chains(chains: Vec<SwapChainEntity>) -> Self {
        let chains: Vec<_> = chains
            .into_iter()
            .zip(1..)
            .map(|(mut chain, id)| {
                chain.id = Some(id);
                chain
            })
            .collect();
        Self {
            state: RwLock::new(ChainState {
                next_id: chains.len() as i64,
                chains,
                cached: HashMap::new(),
            }),
        }
    }
}

#[async_trait]
impl ChainRepository for InMemoryChainRepository {
    async fn get_chain_by_hash(&self, hash: &str) -> Result<Option<SwapChainEntity>, RepositoryError> {
        Ok(self.state.read().await.chains.iter().find(|c| c.hash == hash).cloned())
    }

    async fn get_chain_by_id(&self, id: i64) -> Result<Option<SwapChainEntity>, RepositoryError> {
        Ok(self.state.read().await.chains.iter().find(|c| c.id == Some(id)).cloned())
    }

    async fn create_chain(&self, chain: &SwapChainEntity) -> Result<i64, RepositoryError> {
        let mut state = self.state.write().await;
        if state.chains.iter().any(|c| c.hash == chain.hash) {
            return Err(RepositoryError::Duplicate(chain.hash.clone()));
        }

        state.next_id += 1;
        let id = state.next_id;
        let mut stored = chain.clone();
        stored.id = Some(id);
        state.chains.push(stored);
        Ok(id)
    }

    async fn update_chain(&self, chain: &SwapChainEntity) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let stored = state
            .chains
            .iter_mut()
            .find(|c| c.id.is_some() && c.id == chain.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("swap chain {:?}", chain.id)))?;
        *stored = chain.clone();
        Ok(())
    }

    async fn get_chains(&self) -> Result<Vec<SwapChainEntity>, RepositoryError> {
        Ok(self.state.read().await.chains.clone())
    }

    async fn cache_chain(&self, asset: &str, chain: &SwapChainEntity) {
        self.state
            .write()
            .await
            .cached
            .insert(asset.to_string(), chain.clone());
    }

    async fn get_cached_chain(&self, asset: &str) -> Option<SwapChainEntity> {
        self.state.read().await.cached.get(asset).cloned()
    }
}
