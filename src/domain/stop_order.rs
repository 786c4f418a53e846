//! Stop-loss / take-profit orders and OCO-style stop-order pairs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOrderKind {
    StopLoss,
    TakeProfit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOrderStatus {
    Active,
    Triggered,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopOrder {
    pub id: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub stop_price: Decimal,
    pub kind: StopOrderKind,
    pub status: StopOrderStatus,
    pub created_at: DateTime<Utc>,
}

impl StopOrder {
    pub fn new(
        id: String,
        symbol: String,
        quantity: Decimal,
        stop_price: Decimal,
        kind: StopOrderKind,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if stop_price <= Decimal::ZERO {
            return Err(CoreError::InvalidParameter(
                "stop price must be strictly positive".into(),
            ));
        }
        if quantity <= Decimal::ZERO {
            return Err(CoreError::InvalidParameter(
                "quantity must be strictly positive".into(),
            ));
        }
        Ok(Self {
            id,
            symbol,
            quantity,
            stop_price,
            kind,
            status: StopOrderStatus::Active,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPairStatus {
    Active,
    PartiallyTriggered,
    Completed,
}

/// Couples a stop-loss with a take-profit against one position. When either
/// child triggers, its sibling is cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct StopOrderPair {
    pub id: String,
    pub stop_loss_id: String,
    pub take_profit_id: String,
    pub status: StopPairStatus,
}

impl StopOrderPair {
    pub fn new(id: String, stop_loss_id: String, take_profit_id: String) -> Self {
        Self {
            id,
            stop_loss_id,
            take_profit_id,
            status: StopPairStatus::Active,
        }
    }

    /// Record that one child triggered; the pair moves to PartiallyTriggered
    /// (first child) then Completed (once both ends are accounted for —
    /// the sibling is cancelled by the caller, not re-evaluated).
    pub fn on_child_triggered(&mut self, triggered_id: &str) -> Result<&str, CoreError> {
        if self.status == StopPairStatus::Completed {
            return Err(CoreError::OrderAlreadyTriggered(self.id.clone()));
        }
        let sibling = if triggered_id == self.stop_loss_id {
            &self.take_profit_id
        } else if triggered_id == self.take_profit_id {
            &self.stop_loss_id
        } else {
            return Err(CoreError::StopOrderNotFound(triggered_id.to_string()));
        };
        self.status = StopPairStatus::Completed;
        Ok(sibling)
    }
}
