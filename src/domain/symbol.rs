//! Symbol normalization between the wire format (`BTCUSDT`) and the
//! human-facing notation (`BTC/USDT`) used everywhere else in the core.

/// Converts `BTC/USDT` (local notation) into `BTCUSDT` (Binance wire notation).
pub fn denormalize_symbol(symbol: &str) -> String {
    symbol.replace('/', "")
}

const QUOTES: &[&str] = &["USDT", "BUSD", "USDC", "BTC", "ETH", "BNB", "USD"];

/// Converts `BTCUSDT` (Binance wire notation) into `BTC/USDT` (local notation).
///
/// Binance does not delimit base/quote in its symbol strings, so this
/// recognises a fixed set of common quote assets, longest first. Symbols
/// whose quote asset isn't recognised are returned unchanged inside `Err`.
pub fn normalize_symbol(wire: &str) -> Result<String, String> {
    for quote in QUOTES {
        if let Some(base) = wire.strip_suffix(quote) {
            if !base.is_empty() {
                return Ok(format!("{base}/{quote}"));
            }
        }
    }
    Err(format!("unrecognised quote asset in symbol: {wire}"))
}

/// Extracts just the quote asset from wire notation (e.g. `BTCUSDT` -> `USDT`).
/// Used by the risk gate to look up the balance a SPOT buy would draw down.
pub fn quote_asset(wire: &str) -> Result<String, String> {
    for quote in QUOTES {
        if let Some(base) = wire.strip_suffix(quote) {
            if !base.is_empty() {
                return Ok((*quote).to_string());
            }
        }
    }
    Err(format!("unrecognised quote asset in symbol: {wire}"))
}
