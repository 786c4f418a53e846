//! Exchange capability: the narrow typed interface the core treats as an
//! oracle (spec.md §4.3, §6.1). Authentication, URL construction, and JSON
//! decoding are the infrastructure layer's concern; the core only ever sees
//! this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::conditional_order::{OrderSide, OrderType};
use crate::domain::errors::CoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    /// FUTURES only: true when this order may only reduce an existing position.
    pub reduce_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub base_volume: Decimal,
}

#[async_trait]
pub trait ExchangeCapability: Send + Sync {
    async fn get_last_price(&self, symbol: &str) -> Result<Decimal, CoreError>;
    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, CoreError>;
    async fn get_funding_rate(&self, symbol: &str) -> Result<Decimal, CoreError>;
    async fn get_recent_klines(
        &self,
        symbol: &str,
        window: chrono::Duration,
    ) -> Result<Vec<Kline>, CoreError>;
    async fn get_quote_balance(&self, asset: &str) -> Result<Decimal, CoreError>;

    /// Places an order and returns the exchange-assigned order id.
    async fn place_order(&self, intent: &OrderIntent) -> Result<String, CoreError>;
}
