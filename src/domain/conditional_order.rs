//! Conditional order: a unit of deferred trading intent gated by a
//! `TriggerCondition` (see `domain::trigger`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::CoreError;
use crate::domain::trigger::{TriggerCondition, Venue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// Status transitions are monotone: PENDING -> (TRIGGERED -> EXECUTED) | CANCELLED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionalOrderStatus {
    Pending,
    Triggered,
    Executed,
    Cancelled,
}

impl ConditionalOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConditionalOrderStatus::Executed | ConditionalOrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now > self.end
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now >= self.start && now <= self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalOrder {
    pub id: String,
    pub venue: Venue,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub condition: TriggerCondition,
    pub time_window: Option<TimeWindow>,
    pub status: ConditionalOrderStatus,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub executed_order_id: Option<String>,
}

impl ConditionalOrder {
    /// Construct a new PENDING conditional order, validating the invariants
    /// that must hold at creation time (spec.md §3, §8 boundary behaviours).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        venue: Venue,
        symbol: String,
        side: OrderSide,
        order_type: OrderType,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        condition: TriggerCondition,
        time_window: Option<TimeWindow>,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if quantity <= Decimal::ZERO {
            return Err(CoreError::InvalidParameter(
                "quantity must be strictly positive".into(),
            ));
        }
        if order_type == OrderType::Limit && limit_price.is_none() {
            return Err(CoreError::InvalidParameter(
                "LIMIT orders require a limit price".into(),
            ));
        }
        condition.validate_venue(venue)?;
        if let Some(window) = &time_window {
            if window.has_elapsed(now) {
                return Err(CoreError::TimeWindowExpired);
            }
        }

        Ok(Self {
            id,
            venue,
            symbol,
            side,
            order_type,
            quantity,
            limit_price,
            condition,
            time_window,
            status: ConditionalOrderStatus::Pending,
            created_at: now,
            triggered_at: None,
            executed_order_id: None,
        })
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, ConditionalOrderStatus::Pending)
    }
}
