//! Trading pairs held in memory, optionally seeded from a JSON file

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::pair::{PairRepository, TradingPair};
use crate::shared::errors::{AppError, RepositoryError};

/// Pair repository preserving insertion order
pub struct InMemoryPairRepository {
    pairs: RwLock<Vec<TradingPair>>,
}

impl InMemoryPairRepository {
    pub fn new(pairs: Vec<TradingPair>) -> Self {
        Self {
            pairs: RwLock::new(pairs),
        }
    }

    /// Load a JSON array of pairs
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        let pairs: Vec<TradingPair> = serde_json::from_str(&content)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse {}: {}", path.display(), e)))?;

        info!("Loaded {} trading pairs from {}", pairs.len(), path.display());
        Ok(Self::new(pairs))
    }

    /// Record a new last price
    pub async fn update_price(&self, symbol: &str, price: f64, timestamp: i64) -> Result<(), RepositoryError> {
        let mut pairs = self.pairs.write().await;
        let pair = pairs
            .iter_mut()
            .find(|p| p.symbol == symbol)
            .ok_or_else(|| RepositoryError::NotFound(symbol.to_string()))?;
        pair.last_price = price;
        pair.price_timestamp = timestamp;
        Ok(())
    }

    /// Stamp every price as observed at `timestamp`
    pub async fn touch_all(&self, timestamp: i64) {
        for pair in self.pairs.write().await.iter_mut() {
            pair.price_timestamp = timestamp;
        }
    }

    pub async fn count(&self) -> usize {
        self.pairs.read().await.len()
    }
}

#[async_trait]
impl PairRepository for InMemoryPairRepository {
    async fn get_pairs_by_base_asset(&self, asset: &str) -> Result<Vec<TradingPair>, RepositoryError> {
        Ok(self
            .pairs
            .read()
            .await
            .iter()
            .filter(|p| p.base_asset == asset)
            .cloned()
            .collect())
    }

    async fn get_pairs_by_quote_asset(&self, asset: &str) -> Result<Vec<TradingPair>, RepositoryError> {
        Ok(self
            .pairs
            .read()
            .await
            .iter()
            .filter(|p| p.quote_asset == asset)
            .cloned()
            .collect())
    }

    async fn get_pair_by_symbol(&self, symbol: &str) -> Result<Option<TradingPair>, RepositoryError> {
        Ok(self.pairs.read().await.iter().find(|p| p.symbol == symbol).cloned())
    }
}
