//! Market-data cache: short-TTL memoisation of exchange reads (spec.md §4.4,
//! §9 "pluggable trait" note). Per-key guards, as the teacher's in-memory
//! repository uses per-store locks rather than one global mutex.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;

const DEFAULT_TTL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy)]
struct Entry {
    value: Decimal,
    fetched_at: Instant,
}

/// A pluggable price source the scheduler reads through instead of hitting
/// the exchange on every tick. Swappable for an event-stream-backed
/// implementation later without touching the scheduler.
pub struct MarketDataCache {
    ttl: Duration,
    entries: RwLock<HashMap<(String, &'static str), Entry>>,
}

impl MarketDataCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `(symbol, kind)` if it was populated
    /// within the TTL, else `None`.
    pub fn get(&self, symbol: &str, kind: &'static str) -> Option<Decimal> {
        let entries = self.entries.read().unwrap();
        entries
            .get(&(symbol.to_string(), kind))
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.value)
    }

    pub fn put(&self, symbol: &str, kind: &'static str, value: Decimal) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            (symbol.to_string(), kind),
            Entry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }
}

impl Default for MarketDataCache {
    fn default() -> Self {
        Self::new()
    }
}
