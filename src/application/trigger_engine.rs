//! Trigger registry (spec.md §4.6). Owns the order-id -> (symbol, condition)
//! mapping; the condition tree evaluation itself lives in `domain::trigger`.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::trigger::{MarketSnapshot, SymbolSnapshot, TriggerCondition};

struct Registration {
    symbol: String,
    condition: TriggerCondition,
}

#[derive(Default)]
pub struct TriggerEngine {
    registrations: RwLock<HashMap<String, Registration>>,
}

impl TriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, order_id: String, symbol: String, condition: TriggerCondition) {
        self.registrations
            .write()
            .unwrap()
            .insert(order_id, Registration { symbol, condition });
    }

    pub fn unregister(&self, order_id: &str) {
        self.registrations.write().unwrap().remove(order_id);
    }

    /// Returns the ids of every registered order whose condition the
    /// snapshot satisfies. An order whose symbol is absent from the
    /// snapshot evaluates to false rather than erroring (spec.md §4.6).
    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> Vec<String> {
        let registrations = self.registrations.read().unwrap();
        registrations
            .iter()
            .filter(|(_, reg)| {
                let empty = SymbolSnapshot::default();
                let symbol_snapshot = snapshot.get(&reg.symbol).unwrap_or(&empty);
                reg.condition.evaluate(symbol_snapshot)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trigger::{Comparator, LeafKind, TriggerLeaf};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn condition(
        kind: LeafKind,
        comparator: Comparator,
        threshold: rust_decimal::Decimal,
    ) -> TriggerCondition {
        TriggerCondition::leaf(TriggerLeaf::new(kind, comparator, threshold, None, None).unwrap())
    }

    #[test]
    fn register_then_unregister_never_fires() {
        let engine = TriggerEngine::new();
        engine.register(
            "o1".into(),
            "BTCUSDT".into(),
            condition(LeafKind::Price, Comparator::Le, dec!(49000)),
        );
        engine.unregister("o1");

        let mut snapshot = MarketSnapshot::new(Utc::now());
        snapshot.insert(
            "BTCUSDT",
            SymbolSnapshot {
                last_price: Some(dec!(48000)),
                ..Default::default()
            },
        );
        assert!(engine.evaluate(&snapshot).is_empty());
    }

    #[test]
    fn evaluate_returns_only_satisfied_orders() {
        let engine = TriggerEngine::new();
        engine.register(
            "fires".into(),
            "BTCUSDT".into(),
            condition(LeafKind::Price, Comparator::Le, dec!(49000)),
        );
        engine.register(
            "does_not".into(),
            "BTCUSDT".into(),
            condition(LeafKind::Price, Comparator::Ge, dec!(60000)),
        );

        let mut snapshot = MarketSnapshot::new(Utc::now());
        snapshot.insert(
            "BTCUSDT",
            SymbolSnapshot {
                last_price: Some(dec!(48900)),
                ..Default::default()
            },
        );

        let fired = engine.evaluate(&snapshot);
        assert_eq!(fired, vec!["fires".to_string()]);
    }

    #[test]
    fn order_with_unknown_symbol_does_not_fire() {
        let engine = TriggerEngine::new();
        engine.register(
            "o1".into(),
            "ETHUSDT".into(),
            condition(LeafKind::Price, Comparator::Ge, dec!(0)),
        );
        let snapshot = MarketSnapshot::new(Utc::now());
        assert!(engine.evaluate(&snapshot).is_empty());
    }
}
