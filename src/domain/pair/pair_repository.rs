//! Pair repository interface

use async_trait::async_trait;
use crate::shared::errors::RepositoryError;
use super::TradingPair;

/// Read access to known trading pairs
#[async_trait]
pub trait PairRepository: Send + Sync {
    async fn get_pairs_by_base_asset(&self, asset: &str) -> Result<Vec<TradingPair>, RepositoryError>;

    async fn get_pairs_by_quote_asset(&self, asset: &str) -> Result<Vec<TradingPair>, RepositoryError>;

    /// `Ok(None)` when no pair with this symbol is known
    async fn get_pair_by_symbol(&self, symbol: &str) -> Result<Option<TradingPair>, RepositoryError>;
}
