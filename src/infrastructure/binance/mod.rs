pub mod client;
pub mod common;

pub use client::BinanceExchange;
