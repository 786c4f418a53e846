//! Trigger condition tree: an explicit sum type rather than a dynamically
//! dispatched `Type` field, per the redesign note in SPEC_FULL.md §9.
//! Evaluation is a fold over the tree, short-circuiting left to right.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::CoreError;

/// Which exchange venue a conditional order (and therefore its trigger
/// tree) belongs to. A leaf's kind is only legal against the venue that
/// lists it in spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Venue {
    Spot,
    Futures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LeafKind {
    Price,
    PriceChangePercent,
    Volume,
    MarkPrice,
    LastPrice,
    UnrealizedPnl,
    FundingRate,
    MarginRatio,
}

impl LeafKind {
    pub fn venue(self) -> Venue {
        match self {
            LeafKind::Price | LeafKind::PriceChangePercent | LeafKind::Volume => Venue::Spot,
            LeafKind::MarkPrice
            | LeafKind::LastPrice
            | LeafKind::UnrealizedPnl
            | LeafKind::FundingRate
            | LeafKind::MarginRatio => Venue::Futures,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Comparator {
    Gt,
    Lt,
    Ge,
    Le,
}

impl Comparator {
    fn compare(self, value: Decimal, threshold: Decimal) -> bool {
        match self {
            Comparator::Gt => value > threshold,
            Comparator::Lt => value < threshold,
            Comparator::Ge => value >= threshold,
            Comparator::Le => value <= threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

/// A single leaf comparison. `base_price` is required (and validated > 0)
/// for `PriceChangePercent`; `time_window_secs` is required for `Volume`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TriggerLeaf {
    pub kind: LeafKind,
    pub comparator: Comparator,
    pub threshold: Decimal,
    pub base_price: Option<Decimal>,
    pub time_window_secs: Option<u64>,
}

impl TriggerLeaf {
    pub fn new(
        kind: LeafKind,
        comparator: Comparator,
        threshold: Decimal,
        base_price: Option<Decimal>,
        time_window_secs: Option<u64>,
    ) -> Result<Self, CoreError> {
        if kind == LeafKind::PriceChangePercent {
            match base_price {
                Some(bp) if bp > Decimal::ZERO => {}
                _ => {
                    return Err(CoreError::InvalidTriggerCondition(
                        "PRICE_CHANGE_PERCENT requires a strictly positive basePrice".into(),
                    ));
                }
            }
        }
        if kind == LeafKind::Volume && time_window_secs.is_none() {
            return Err(CoreError::InvalidTriggerCondition(
                "VOLUME requires a timeWindow".into(),
            ));
        }
        Ok(Self {
            kind,
            comparator,
            threshold,
            base_price,
            time_window_secs,
        })
    }

    fn evaluate(&self, snapshot: &SymbolSnapshot) -> bool {
        let value = match self.kind {
            LeafKind::Price | LeafKind::LastPrice => snapshot.last_price,
            LeafKind::MarkPrice => snapshot.mark_price,
            LeafKind::FundingRate => snapshot.funding_rate,
            LeafKind::Volume => snapshot.volume,
            LeafKind::UnrealizedPnl => snapshot.unrealized_pnl,
            LeafKind::MarginRatio => snapshot.margin_ratio,
            LeafKind::PriceChangePercent => {
                let (Some(current), Some(base)) = (snapshot.last_price, self.base_price) else {
                    return false;
                };
                let pct = (current - base) / base * Decimal::from(100);
                return self.comparator.compare(pct, self.threshold);
            }
        };
        match value {
            Some(v) => self.comparator.compare(v, self.threshold),
            None => false,
        }
    }
}

/// A finite, acyclic predicate tree. Cycles are impossible by construction:
/// a `Composite` owns its children by value, so there is no way to make a
/// node reachable from itself.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TriggerCondition {
    Leaf(TriggerLeaf),
    Composite {
        op: LogicOp,
        children: Vec<TriggerCondition>,
    },
}

impl TriggerCondition {
    pub fn leaf(leaf: TriggerLeaf) -> Self {
        TriggerCondition::Leaf(leaf)
    }

    pub fn and(children: Vec<TriggerCondition>) -> Self {
        TriggerCondition::Composite {
            op: LogicOp::And,
            children,
        }
    }

    pub fn or(children: Vec<TriggerCondition>) -> Self {
        TriggerCondition::Composite {
            op: LogicOp::Or,
            children,
        }
    }

    /// Every leaf kind referenced in the tree must belong to `venue`.
    pub fn validate_venue(&self, venue: Venue) -> Result<(), CoreError> {
        match self {
            TriggerCondition::Leaf(leaf) => {
                if leaf.kind.venue() != venue {
                    return Err(CoreError::InvalidTriggerCondition(format!(
                        "leaf kind {:?} is not valid for venue {:?}",
                        leaf.kind, venue
                    )));
                }
                Ok(())
            }
            TriggerCondition::Composite { children, .. } => {
                for child in children {
                    child.validate_venue(venue)?;
                }
                Ok(())
            }
        }
    }

    /// Short-circuit, left-to-right evaluation against a single symbol's
    /// snapshot. Missing fields make the owning leaf false rather than
    /// erroring — the scheduler simply re-evaluates next tick.
    pub fn evaluate(&self, snapshot: &SymbolSnapshot) -> bool {
        match self {
            TriggerCondition::Leaf(leaf) => leaf.evaluate(snapshot),
            TriggerCondition::Composite { op, children } => match op {
                LogicOp::And => children.iter().all(|c| c.evaluate(snapshot)),
                LogicOp::Or => children.iter().any(|c| c.evaluate(snapshot)),
            },
        }
    }
}

/// Per-symbol market data visible to the Trigger Engine for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolSnapshot {
    pub last_price: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub funding_rate: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub margin_ratio: Option<Decimal>,
}

/// A consistent, single-fetch-batch view of the market across all symbols
/// referenced by active orders in one scheduler tick.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub taken_at: DateTime<Utc>,
    symbols: HashMap<String, SymbolSnapshot>,
}

impl MarketSnapshot {
    pub fn new(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            symbols: HashMap::new(),
        }
    }

    pub fn insert(&mut self, symbol: impl Into<String>, snapshot: SymbolSnapshot) {
        self.symbols.insert(symbol.into(), snapshot);
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolSnapshot> {
        self.symbols.get(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snap(last_price: Decimal) -> SymbolSnapshot {
        SymbolSnapshot {
            last_price: Some(last_price),
            ..Default::default()
        }
    }

    #[test]
    fn price_change_percent_rejects_non_positive_base_at_construction() {
        let err = TriggerLeaf::new(
            LeafKind::PriceChangePercent,
            Comparator::Gt,
            dec!(5),
            Some(Decimal::ZERO),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTriggerCondition(_)));
    }

    #[test]
    fn volume_requires_time_window() {
        let err =
            TriggerLeaf::new(LeafKind::Volume, Comparator::Gt, dec!(1000), None, None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTriggerCondition(_)));
    }

    #[test]
    fn strict_comparators_are_false_at_equality() {
        let leaf = TriggerLeaf::new(LeafKind::Price, Comparator::Lt, dec!(49000), None, None)
            .unwrap();
        assert!(!leaf.evaluate(&snap(dec!(49000))));
        let leaf = TriggerLeaf::new(LeafKind::Price, Comparator::Le, dec!(49000), None, None)
            .unwrap();
        assert!(leaf.evaluate(&snap(dec!(49000))));
    }

    #[test]
    fn missing_field_evaluates_false_not_error() {
        let leaf =
            TriggerLeaf::new(LeafKind::MarkPrice, Comparator::Gt, dec!(100), None, None).unwrap();
        assert!(!leaf.evaluate(&SymbolSnapshot::default()));
    }

    #[test]
    fn and_short_circuits_left_to_right() {
        let lhs = TriggerCondition::leaf(
            TriggerLeaf::new(LeafKind::Price, Comparator::Gt, dec!(100), None, None).unwrap(),
        );
        let rhs = TriggerCondition::leaf(
            TriggerLeaf::new(LeafKind::Price, Comparator::Lt, dec!(50), None, None).unwrap(),
        );
        let tree = TriggerCondition::and(vec![lhs, rhs]);
        assert!(!tree.evaluate(&snap(dec!(10))));
        assert!(!tree.evaluate(&snap(dec!(200))));
    }

    #[test]
    fn or_is_true_if_either_side_true() {
        let lhs = TriggerCondition::leaf(
            TriggerLeaf::new(LeafKind::Price, Comparator::Gt, dec!(100), None, None).unwrap(),
        );
        let rhs = TriggerCondition::leaf(
            TriggerLeaf::new(LeafKind::Price, Comparator::Lt, dec!(50), None, None).unwrap(),
        );
        let tree = TriggerCondition::or(vec![lhs, rhs]);
        assert!(tree.evaluate(&snap(dec!(10))));
        assert!(tree.evaluate(&snap(dec!(200))));
        assert!(!tree.evaluate(&snap(dec!(75))));
    }

    #[test]
    fn price_change_percent_computes_relative_move() {
        let leaf = TriggerLeaf::new(
            LeafKind::PriceChangePercent,
            Comparator::Ge,
            dec!(10),
            Some(dec!(100)),
            None,
        )
        .unwrap();
        assert!(leaf.evaluate(&snap(dec!(110))));
        assert!(!leaf.evaluate(&snap(dec!(105))));
    }

    #[test]
    fn venue_validation_rejects_mismatched_leaf_kind() {
        let spot_leaf = TriggerCondition::leaf(
            TriggerLeaf::new(LeafKind::Volume, Comparator::Gt, dec!(1), None, Some(60)).unwrap(),
        );
        assert!(spot_leaf.validate_venue(Venue::Spot).is_ok());
        assert!(spot_leaf.validate_venue(Venue::Futures).is_err());

        let futures_leaf = TriggerCondition::leaf(
            TriggerLeaf::new(LeafKind::FundingRate, Comparator::Gt, dec!(1), None, None).unwrap(),
        );
        assert!(futures_leaf.validate_venue(Venue::Futures).is_ok());
        assert!(futures_leaf.validate_venue(Venue::Spot).is_err());
    }
}
