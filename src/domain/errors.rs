//! Core error taxonomy.
//!
//! One enum rather than several per-concern enums: every branch here is a
//! mutually exclusive outcome of the same trigger-evaluate-dispatch pipeline,
//! so callers match on a single type instead of threading conversions
//! between conditional-order, stop-order, and transport error families.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("insufficient balance: need {need}, available {available}")]
    InsufficientBalance { need: Decimal, available: Decimal },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("risk limit exceeded: {0}")]
    RiskLimitExceeded(String),

    #[error("invalid trigger condition: {0}")]
    InvalidTriggerCondition(String),

    #[error("conditional order not found: {0}")]
    ConditionalOrderNotFound(String),

    #[error("stop order not found: {0}")]
    StopOrderNotFound(String),

    #[error("order already triggered: {0}")]
    OrderAlreadyTriggered(String),

    #[error("time window expired")]
    TimeWindowExpired,

    #[error("insufficient margin: need {need}, available {available}")]
    InsufficientMargin { need: Decimal, available: Decimal },

    #[error("invalid leverage: {0}")]
    InvalidLeverage(u32),

    #[error("position mode conflict: {0}")]
    PositionModeConflict(String),

    #[error("margin mode conflict: {0}")]
    MarginModeConflict(String),

    #[error("liquidation risk: entry {entry} too close to liquidation {liquidation}")]
    LiquidationRisk { entry: Decimal, liquidation: Decimal },

    #[error("max position exceeded: {current} > {max}")]
    MaxPositionExceeded { current: Decimal, max: Decimal },

    #[error("reduce-only violation: {0}")]
    ReduceOnlyViolation(String),

    #[error("position not found: {0}")]
    PositionNotFound(String),
}

impl CoreError {
    /// Whether a `RetryTransport` should replay the call that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Network(_) | CoreError::RateLimit)
    }
}
