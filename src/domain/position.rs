//! Futures position, keyed by (symbol, position side).

use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionSide {
    Long,
    Short,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginType {
    Crossed,
    Isolated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuturesPosition {
    pub symbol: String,
    pub side: PositionSide,
    /// Signed amount: positive for LONG, negative for SHORT.
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub leverage: u32,
    pub margin_type: MarginType,
    pub liquidation_price: Decimal,
}

impl FuturesPosition {
    pub fn unrealized_pnl(&self) -> Decimal {
        (self.mark_price - self.entry_price) * self.amount
    }
}
