pub mod binance;
pub mod core;
pub mod observability;
pub mod repositories;
pub mod transport;
