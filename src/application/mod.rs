pub mod bootstrap;
pub mod dispatcher;
pub mod market_data_cache;
pub mod rate_limiter;
pub mod risk_gate;
pub mod scheduler;
pub mod trailing_stop_controller;
pub mod trigger_engine;
