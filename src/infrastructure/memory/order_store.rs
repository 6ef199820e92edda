//! Receives order updates after a finished swap

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::execution::{Order, OrderUpdater};
use crate::shared::errors::RepositoryError;

#[derive(Default)]
pub struct InMemoryOrderUpdater {
    updates: RwLock<Vec<Order>>,
}

impl InMemoryOrderUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every order passed to `update`, oldest first
    pub async fn updates(&self) -> Vec<Order> {
        self.updates.read().await.clone()
    }
}

#[async_trait]
impl OrderUpdater for InMemoryOrderUpdater {
    async fn update(&self, order: &Order) -> Result<(), RepositoryError> {
        info!(
            "Order #{} now holds {} {} (swap action {:?})",
            order.id, order.executed_quantity, order.asset, order.swap_action_id
        );
        self.updates.write().await.push(order.clone());
        Ok(())
    }
}
