//! In-memory repository implementations.
//!
//! `compare_and_set_status` is the only place that mutates a stored status:
//! the whole check-then-swap happens under one write-lock acquisition, which
//! is what makes it safe as the at-most-once commit point under concurrent
//! scheduler ticks (spec.md §4.9, §9).
//!
//! Data is lost on restart; there is no cross-instance persistence. Suitable
//! for a single-process deployment, matching the teacher's in-memory
//! repositories.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::conditional_order::{ConditionalOrder, ConditionalOrderStatus};
use crate::domain::errors::CoreError;
use crate::domain::position::FuturesPosition;
use crate::domain::repositories::{
    ConditionalOrderRepository, PositionRepository, StopOrderRepository, StopPairRepository,
    TrailingStopRepository,
};
use crate::domain::stop_order::{StopOrder, StopOrderPair, StopOrderStatus};
use crate::domain::trailing_stop::TrailingStopOrder;

#[derive(Default)]
pub struct InMemoryConditionalOrderRepository {
    orders: Arc<RwLock<HashMap<String, ConditionalOrder>>>,
}

impl InMemoryConditionalOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConditionalOrderRepository for InMemoryConditionalOrderRepository {
    async fn save(&self, order: ConditionalOrder) -> Result<(), CoreError> {
        self.orders.write().await.insert(order.id.clone(), order);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<ConditionalOrder, CoreError> {
        self.orders
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::ConditionalOrderNotFound(id.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<ConditionalOrder>, CoreError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.is_active())
            .cloned()
            .collect())
    }

    async fn count_active(&self) -> Result<usize, CoreError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.is_active())
            .count())
    }

    async fn compare_and_set_status(
        &self,
        id: &str,
        expected: ConditionalOrderStatus,
        new: ConditionalOrderStatus,
    ) -> Result<bool, CoreError> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(id) else {
            return Err(CoreError::ConditionalOrderNotFound(id.to_string()));
        };
        if order.status != expected {
            return Ok(false);
        }
        order.status = new;
        if new == ConditionalOrderStatus::Triggered {
            order.triggered_at = Some(chrono::Utc::now());
        }
        Ok(true)
    }

    async fn record_execution(&self, id: &str, exchange_order_id: String) -> Result<(), CoreError> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(id) else {
            return Err(CoreError::ConditionalOrderNotFound(id.to_string()));
        };
        order.executed_order_id = Some(exchange_order_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStopOrderRepository {
    orders: Arc<RwLock<HashMap<String, StopOrder>>>,
}

impl InMemoryStopOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StopOrderRepository for InMemoryStopOrderRepository {
    async fn save(&self, order: StopOrder) -> Result<(), CoreError> {
        self.orders.write().await.insert(order.id.clone(), order);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<StopOrder, CoreError> {
        self.orders
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::StopOrderNotFound(id.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<StopOrder>, CoreError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.status == StopOrderStatus::Active)
            .cloned()
            .collect())
    }

    async fn compare_and_set_status(
        &self,
        id: &str,
        expected: StopOrderStatus,
        new: StopOrderStatus,
    ) -> Result<bool, CoreError> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(id) else {
            return Err(CoreError::StopOrderNotFound(id.to_string()));
        };
        if order.status != expected {
            return Ok(false);
        }
        order.status = new;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryStopPairRepository {
    pairs: Arc<RwLock<HashMap<String, StopOrderPair>>>,
}

impl InMemoryStopPairRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StopPairRepository for InMemoryStopPairRepository {
    async fn save(&self, pair: StopOrderPair) -> Result<(), CoreError> {
        self.pairs.write().await.insert(pair.id.clone(), pair);
        Ok(())
    }

    async fn find_by_child_id(&self, child_id: &str) -> Result<Option<StopOrderPair>, CoreError> {
        Ok(self
            .pairs
            .read()
            .await
            .values()
            .find(|p| p.stop_loss_id == child_id || p.take_profit_id == child_id)
            .cloned())
    }

    async fn update(&self, pair: StopOrderPair) -> Result<(), CoreError> {
        self.pairs.write().await.insert(pair.id.clone(), pair);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<StopOrderPair>, CoreError> {
        use crate::domain::stop_order::StopPairStatus;
        Ok(self
            .pairs
            .read()
            .await
            .values()
            .filter(|p| p.status != StopPairStatus::Completed)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryTrailingStopRepository {
    orders: Arc<RwLock<HashMap<String, TrailingStopOrder>>>,
}

impl InMemoryTrailingStopRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrailingStopRepository for InMemoryTrailingStopRepository {
    async fn save(&self, order: TrailingStopOrder) -> Result<(), CoreError> {
        self.orders.write().await.insert(order.id.clone(), order);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<TrailingStopOrder, CoreError> {
        self.orders
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::StopOrderNotFound(id.to_string()))
    }

    async fn update(&self, order: TrailingStopOrder) -> Result<(), CoreError> {
        self.orders.write().await.insert(order.id.clone(), order);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<TrailingStopOrder>, CoreError> {
        use crate::domain::trailing_stop::TrailingStopStatus;
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.status == TrailingStopStatus::Active)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryPositionRepository {
    positions: Arc<RwLock<HashMap<String, FuturesPosition>>>,
}

impl InMemoryPositionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionRepository for InMemoryPositionRepository {
    async fn upsert(&self, position: FuturesPosition) -> Result<(), CoreError> {
        self.positions
            .write()
            .await
            .insert(position.symbol.clone(), position);
        Ok(())
    }

    async fn find(&self, symbol: &str) -> Result<FuturesPosition, CoreError> {
        self.positions
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| CoreError::PositionNotFound(symbol.to_string()))
    }
}
