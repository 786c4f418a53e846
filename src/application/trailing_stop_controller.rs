//! Trailing-stop controller (spec.md §4.7). Advances `extreme`/`stop` from a
//! fresh price and reports whether the order should fire this tick.
//!
//! Grounded on the teacher's `StopState`-style match-per-side state machine,
//! rebuilt around a percentage trail on the domain's `TrailingStopOrder`
//! instead of an ATR multiple.

use rust_decimal::Decimal;

use crate::domain::trailing_stop::{PositionSide, TrailingStopOrder};

/// Outcome of advancing a trailing stop by one observed price.
pub struct Advance {
    pub updated: bool,
    pub should_fire: bool,
}

/// Recomputes `extreme`/`stop` for `order` given a fresh price, preserving
/// the monotonicity invariant: `stop` never moves against the position.
pub fn advance(order: &mut TrailingStopOrder, price: Decimal, now: chrono::DateTime<chrono::Utc>) -> Advance {
    let mut updated = false;
    match order.side {
        PositionSide::Long => {
            if price > order.extreme_price {
                order.extreme_price = price;
                order.stop_price = price * (Decimal::ONE - order.trail_percent / Decimal::from(100));
                updated = true;
            }
        }
        PositionSide::Short => {
            if price < order.extreme_price {
                order.extreme_price = price;
                order.stop_price = price * (Decimal::ONE + order.trail_percent / Decimal::from(100));
                updated = true;
            }
        }
    }
    if updated {
        order.last_updated_at = now;
    }

    let should_fire = match order.side {
        PositionSide::Long => price <= order.stop_price,
        PositionSide::Short => price >= order.stop_price,
    };

    Advance { updated, should_fire }
}

/// Recomputes `stop` from the *current* `extreme` under a new trail
/// percentage. The monotonicity invariant holds because `extreme` is
/// untouched (spec.md §8 "UpdateTrail" law).
pub fn update_trail(order: &mut TrailingStopOrder, new_trail_percent: Decimal, now: chrono::DateTime<chrono::Utc>) {
    order.trail_percent = new_trail_percent;
    order.stop_price = match order.side {
        PositionSide::Long => {
            order.extreme_price * (Decimal::ONE - new_trail_percent / Decimal::from(100))
        }
        PositionSide::Short => {
            order.extreme_price * (Decimal::ONE + new_trail_percent / Decimal::from(100))
        }
    };
    order.last_updated_at = now;
}
