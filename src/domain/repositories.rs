//! Repository trait abstractions.
//!
//! The commit point for at-most-once firing (spec.md §4.9, §9) is exposed
//! here as `compare_and_set_status` rather than left to callers doing
//! read-modify-write around a store lock — any number of concurrent
//! dispatches can race this method and only one will observe `true`.

use async_trait::async_trait;

use crate::domain::conditional_order::{ConditionalOrder, ConditionalOrderStatus};
use crate::domain::errors::CoreError;
use crate::domain::position::FuturesPosition;
use crate::domain::stop_order::{StopOrder, StopOrderPair, StopOrderStatus};
use crate::domain::trailing_stop::TrailingStopOrder;

#[async_trait]
pub trait ConditionalOrderRepository: Send + Sync {
    async fn save(&self, order: ConditionalOrder) -> Result<(), CoreError>;
    async fn find_by_id(&self, id: &str) -> Result<ConditionalOrder, CoreError>;
    async fn list_active(&self) -> Result<Vec<ConditionalOrder>, CoreError>;
    async fn count_active(&self) -> Result<usize, CoreError>;

    /// Atomically transition `id` from `expected` to `new` iff its current
    /// status equals `expected`. Returns `true` if the swap happened.
    async fn compare_and_set_status(
        &self,
        id: &str,
        expected: ConditionalOrderStatus,
        new: ConditionalOrderStatus,
    ) -> Result<bool, CoreError>;

    /// Record the exchange order id once dispatch succeeds (TRIGGERED -> EXECUTED).
    async fn record_execution(&self, id: &str, exchange_order_id: String) -> Result<(), CoreError>;
}

#[async_trait]
pub trait StopOrderRepository: Send + Sync {
    async fn save(&self, order: StopOrder) -> Result<(), CoreError>;
    async fn find_by_id(&self, id: &str) -> Result<StopOrder, CoreError>;
    async fn list_active(&self) -> Result<Vec<StopOrder>, CoreError>;
    async fn compare_and_set_status(
        &self,
        id: &str,
        expected: StopOrderStatus,
        new: StopOrderStatus,
    ) -> Result<bool, CoreError>;
}

#[async_trait]
pub trait StopPairRepository: Send + Sync {
    async fn save(&self, pair: StopOrderPair) -> Result<(), CoreError>;
    async fn find_by_child_id(&self, child_id: &str) -> Result<Option<StopOrderPair>, CoreError>;
    async fn update(&self, pair: StopOrderPair) -> Result<(), CoreError>;
    async fn list_active(&self) -> Result<Vec<StopOrderPair>, CoreError>;
}

#[async_trait]
pub trait TrailingStopRepository: Send + Sync {
    async fn save(&self, order: TrailingStopOrder) -> Result<(), CoreError>;
    async fn find_by_id(&self, id: &str) -> Result<TrailingStopOrder, CoreError>;
    async fn update(&self, order: TrailingStopOrder) -> Result<(), CoreError>;
    async fn list_active(&self) -> Result<Vec<TrailingStopOrder>, CoreError>;
}

#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn upsert(&self, position: FuturesPosition) -> Result<(), CoreError>;
    async fn find(&self, symbol: &str) -> Result<FuturesPosition, CoreError>;
}
