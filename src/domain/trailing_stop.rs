//! Trailing-stop order data model. State transitions (extreme/stop
//! recomputation) live in `application::trailing_stop_controller`, which
//! owns the monotonicity invariants — this module is just the record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingStopStatus {
    Active,
    Triggered,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrailingStopOrder {
    pub id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub trail_percent: Decimal,
    /// Highest observed price for LONG, lowest for SHORT.
    pub extreme_price: Decimal,
    pub stop_price: Decimal,
    pub status: TrailingStopStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl TrailingStopOrder {
    pub fn new(
        id: String,
        symbol: String,
        side: PositionSide,
        quantity: Decimal,
        trail_percent: Decimal,
        entry_price: Decimal,
        min_trail_percent: Decimal,
        max_trail_percent: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if quantity <= Decimal::ZERO {
            return Err(CoreError::InvalidParameter(
                "quantity must be strictly positive".into(),
            ));
        }
        if trail_percent < min_trail_percent || trail_percent > max_trail_percent {
            return Err(CoreError::InvalidParameter(format!(
                "trail percent {trail_percent} out of bounds [{min_trail_percent}, {max_trail_percent}]"
            )));
        }
        let stop_price = match side {
            PositionSide::Long => entry_price * (Decimal::ONE - trail_percent / Decimal::from(100)),
            PositionSide::Short => entry_price * (Decimal::ONE + trail_percent / Decimal::from(100)),
        };
        Ok(Self {
            id,
            symbol,
            side,
            quantity,
            trail_percent,
            extreme_price: entry_price,
            stop_price,
            status: TrailingStopStatus::Active,
            created_at: now,
            last_updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn long_stop_is_entry_times_one_minus_trail() {
        let order = TrailingStopOrder::new(
            "t1".into(),
            "BTC/USDT".into(),
            PositionSide::Long,
            dec!(1),
            dec!(2),
            dec!(50000),
            dec!(0.5),
            dec!(10),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(order.stop_price, dec!(49000));
        assert_eq!(order.extreme_price, dec!(50000));
    }

    #[test]
    fn short_stop_is_entry_times_one_plus_trail() {
        let order = TrailingStopOrder::new(
            "t1".into(),
            "BTC/USDT".into(),
            PositionSide::Short,
            dec!(1),
            dec!(2),
            dec!(50000),
            dec!(0.5),
            dec!(10),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(order.stop_price, dec!(51000));
    }

    #[test]
    fn rejects_trail_percent_outside_bounds() {
        let err = TrailingStopOrder::new(
            "t1".into(),
            "BTC/USDT".into(),
            PositionSide::Long,
            dec!(1),
            dec!(20),
            dec!(50000),
            dec!(0.5),
            dec!(10),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidParameter(_)));
    }
}
