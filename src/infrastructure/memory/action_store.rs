//! Swap actions held in memory

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::execution::{ActionRepository, Order, SwapAction};
use crate::shared::errors::RepositoryError;

#[derive(Default)]
struct ActionState {
    next_id: i64,
    actions: Vec<SwapAction>,
    updates: usize,
}

/// Action repository; at most one active action per order
#[derive(Default)]
pub struct InMemoryActionRepository {
    state: RwLock<ActionState>,
}

impl InMemoryActionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored action as left behind by an earlier run
    pub async fn insert(&self, mut action: SwapAction) -> i64 {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = state.next_id;
        action.id = Some(id);
        state.actions.push(action);
        id
    }

    pub async fn actions(&self) -> Vec<SwapAction> {
        self.state.read().await.actions.clone()
    }

    /// Number of `update_action` calls so far
    pub async fn update_count(&self) -> usize {
        self.state.read().await.updates
    }
}

#[async_trait]
impl ActionRepository for InMemoryActionRepository {
    async fn get_active_action(&self, order: &Order) -> Result<Option<SwapAction>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .actions
            .iter()
            .find(|a| a.order_id == order.id && a.is_active())
            .cloned())
    }

    async fn get_action_by_order(&self, order: &Order) -> Result<Option<SwapAction>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .actions
            .iter()
            .rev()
            .find(|a| a.order_id == order.id)
            .cloned())
    }

    async fn get_action_by_id(&self, id: i64) -> Result<Option<SwapAction>, RepositoryError> {
        Ok(self.state.read().await.actions.iter().find(|a| a.id == Some(id)).cloned())
    }

    async fn create_action(&self, action: &SwapAction) -> Result<i64, RepositoryError> {
        let mut state = self.state.write().await;
        if state
            .actions
            .iter()
            .any(|a| a.order_id == action.order_id && a.is_active())
        {
            return Err(RepositoryError::Duplicate(format!(
                "active swap action for order #{}",
                action.order_id
            )));
        }

        state.next_id += 1;
        let id = state.next_id;
        let mut stored = action.clone();
        stored.id = Some(id);
        state.actions.push(stored);
        Ok(id)
    }

    async fn update_action(&self, action: &SwapAction) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let stored = state
            .actions
            .iter_mut()
            .find(|a| a.id.is_some() && a.id == action.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("swap action {:?}", action.id)))?;
        *stored = action.clone();
        state.updates += 1;
        Ok(())
    }
}
