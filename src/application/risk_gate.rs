//! Risk Gate (spec.md §4.5): the last check before an order intent reaches
//! the exchange. Fail-fast, ordered checks, grounded on the teacher's
//! `RiskValidationPipeline` (stop on first rejection, log the failing step).
//!
//! Counters are per-process and reset on restart (spec.md §6.4); this is an
//! accepted limitation, not an oversight.

use std::sync::Mutex;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::conditional_order::OrderSide;
use crate::domain::errors::CoreError;
use crate::domain::exchange::OrderIntent;
use crate::domain::position::FuturesPosition;
use crate::domain::risk::{DailyCounter, MinuteWindowCounter};

#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub max_orders_per_day: u32,
    pub max_orders_per_minute: u32,
    pub max_active_orders: usize,
    pub min_leverage: u32,
    pub max_leverage: u32,
    pub max_order_notional: Decimal,
    pub quote_balance_reserve: Decimal,
    pub max_position_value: Decimal,
    pub min_margin_ratio: Decimal,
    pub liquidation_buffer: Decimal,
}

struct Counters {
    daily: DailyCounter,
    minute: MinuteWindowCounter,
}

/// Venue-agnostic pre-trade checks plus futures-only margin/leverage checks.
pub struct RiskGate {
    limits: RiskLimits,
    counters: Mutex<Counters>,
}

impl RiskGate {
    pub fn new(limits: RiskLimits, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            limits,
            counters: Mutex::new(Counters {
                daily: DailyCounter::new(now),
                minute: MinuteWindowCounter::default(),
            }),
        }
    }

    /// Checks that apply to every dispatch regardless of venue: notional
    /// ceiling, active-order ceiling, daily and per-minute call budgets
    /// (spec.md §4.5, the "SPOT and FUTURES" rows of the check table).
    pub fn check_common(
        &self,
        active_order_count: usize,
        notional: Decimal,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CoreError> {
        if notional > self.limits.max_order_notional {
            warn!(%notional, max = %self.limits.max_order_notional, "risk gate: order notional exceeds maximum");
            return Err(CoreError::RiskLimitExceeded(format!(
                "order notional {notional} exceeds configured maximum {}",
                self.limits.max_order_notional
            )));
        }

        if active_order_count >= self.limits.max_active_orders {
            warn!(active_order_count, "risk gate: max active orders exceeded");
            return Err(CoreError::RiskLimitExceeded(format!(
                "active order count {active_order_count} reached the configured maximum"
            )));
        }

        let mut counters = self.counters.lock().unwrap();
        if counters.daily.current(now) >= self.limits.max_orders_per_day {
            warn!("risk gate: daily order budget exhausted");
            return Err(CoreError::RiskLimitExceeded(
                "daily order budget exhausted".into(),
            ));
        }
        if counters.minute.count(now) as u32 >= self.limits.max_orders_per_minute {
            warn!("risk gate: per-minute order budget exhausted");
            return Err(CoreError::RiskLimitExceeded(
                "per-minute order budget exhausted".into(),
            ));
        }
        debug!("risk gate: common checks passed");
        Ok(())
    }

    /// SPOT-only check (spec.md §4.5): a BUY may not push the quote balance
    /// below the configured reserve. SELLs draw down the base asset, which
    /// this gate doesn't track, so only BUY is checked.
    pub fn check_spot(
        &self,
        intent: &OrderIntent,
        notional: Decimal,
        quote_balance: Decimal,
    ) -> Result<(), CoreError> {
        if intent.side == OrderSide::Buy {
            let remaining = quote_balance - notional;
            if remaining < self.limits.quote_balance_reserve {
                warn!(%remaining, reserve = %self.limits.quote_balance_reserve, "risk gate: BUY would breach quote balance reserve");
                return Err(CoreError::InsufficientBalance {
                    need: self.limits.quote_balance_reserve,
                    available: remaining,
                });
            }
        }
        debug!("risk gate: spot checks passed");
        Ok(())
    }

    /// Futures-only margin and leverage checks (spec.md §3 futures block,
    /// §4.5 check table). `mark_price` and `quote_balance` are the account
    /// snapshot the order would be filled against.
    pub fn check_futures(
        &self,
        intent: &OrderIntent,
        leverage: u32,
        position: Option<&FuturesPosition>,
        mark_price: Decimal,
        quote_balance: Decimal,
    ) -> Result<(), CoreError> {
        if leverage < self.limits.min_leverage || leverage > self.limits.max_leverage {
            return Err(CoreError::InvalidLeverage(leverage));
        }

        if intent.reduce_only {
            let Some(position) = position else {
                return Err(CoreError::ReduceOnlyViolation(
                    "reduce-only order with no open position".into(),
                ));
            };
            let reduces = (position.amount > Decimal::ZERO && intent.side == OrderSide::Sell)
                || (position.amount < Decimal::ZERO && intent.side == OrderSide::Buy);
            if !reduces {
                return Err(CoreError::ReduceOnlyViolation(
                    "order side does not reduce the open position".into(),
                ));
            }
            if intent.quantity.abs() > position.amount.abs() {
                return Err(CoreError::ReduceOnlyViolation(
                    "reduce-only quantity exceeds open position size".into(),
                ));
            }
        }

        let existing_amount = position.map(|p| p.amount).unwrap_or(Decimal::ZERO);
        let signed_delta = match intent.side {
            OrderSide::Buy => intent.quantity,
            OrderSide::Sell => -intent.quantity,
        };
        let position_value_after = (existing_amount + signed_delta).abs() * mark_price;

        if position_value_after > self.limits.max_position_value {
            warn!(%position_value_after, max = %self.limits.max_position_value, "risk gate: post-trade position value exceeds maximum");
            return Err(CoreError::MaxPositionExceeded {
                current: position_value_after,
                max: self.limits.max_position_value,
            });
        }

        if position_value_after > Decimal::ZERO {
            let margin_ratio = quote_balance / position_value_after;
            if margin_ratio < self.limits.min_margin_ratio {
                warn!(%margin_ratio, min = %self.limits.min_margin_ratio, "risk gate: margin ratio after fill too low");
                return Err(CoreError::InsufficientMargin {
                    need: self.limits.min_margin_ratio,
                    available: margin_ratio,
                });
            }
        }

        if let Some(position) = position {
            let required_entry =
                position.liquidation_price * (Decimal::ONE + self.limits.liquidation_buffer);
            if position.entry_price < required_entry {
                warn!(entry = %position.entry_price, liquidation = %position.liquidation_price, "risk gate: entry price too close to liquidation");
                return Err(CoreError::LiquidationRisk {
                    entry: position.entry_price,
                    liquidation: position.liquidation_price,
                });
            }
        }

        debug!("risk gate: futures checks passed");
        Ok(())
    }

    /// Records one accepted dispatch against the daily/minute budgets.
    pub fn record_call(&self, now: chrono::DateTime<chrono::Utc>) {
        let mut counters = self.counters.lock().unwrap();
        counters.daily.increment(now);
        counters.minute.record(now);
    }
}
