//! Component graph construction (SPEC_FULL.md §2). Kept out of `domain` and
//! out of the scheduler itself: wiring concrete repositories, exchange
//! clients, and the scheduler together is an infrastructure concern, not a
//! core one.

use std::sync::Arc;
use std::time::Duration;

use crate::config::CoreConfig;
use crate::domain::errors::CoreError;
use crate::domain::trigger::Venue;
use crate::infrastructure::binance::BinanceExchange;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::repositories::{
    InMemoryConditionalOrderRepository, InMemoryPositionRepository, InMemoryStopOrderRepository,
    InMemoryStopPairRepository, InMemoryTrailingStopRepository,
};

use super::dispatcher::Dispatcher;
use super::market_data_cache::MarketDataCache;
use super::risk_gate::RiskGate;
use super::scheduler::{MonitoringScheduler, SchedulerConfig};
use super::trigger_engine::TriggerEngine;

/// Exchange-wide request budget. Not part of the configuration schema
/// (spec.md §6.3 covers order-level risk limits, not HTTP call volume); set
/// to Binance's conservative documented default.
const DEFAULT_MAX_CALLS_PER_MINUTE: u32 = 1200;

/// Everything the process needs to run one venue's monitoring loop.
pub struct CoreHandle {
    pub scheduler: Arc<MonitoringScheduler>,
    pub conditional_orders: Arc<InMemoryConditionalOrderRepository>,
    pub stop_orders: Arc<InMemoryStopOrderRepository>,
    pub stop_pairs: Arc<InMemoryStopPairRepository>,
    pub trailing_stops: Arc<InMemoryTrailingStopRepository>,
    pub positions: Arc<InMemoryPositionRepository>,
    pub risk_gate: Arc<RiskGate>,
    pub metrics: Arc<Metrics>,
}

/// Builds the full component graph for `venue` from a resolved config.
pub fn build(config: &CoreConfig, venue: Venue) -> Result<CoreHandle, CoreError> {
    let venue_config = match venue {
        Venue::Spot => &config.spot,
        Venue::Futures => &config.futures,
    };

    let exchange = Arc::new(BinanceExchange::new(
        venue,
        venue_config.api_key.clone(),
        venue_config.api_secret.clone(),
        venue_config.base_url.clone(),
        DEFAULT_MAX_CALLS_PER_MINUTE,
    )?);

    let conditional_orders = Arc::new(InMemoryConditionalOrderRepository::new());
    let stop_orders = Arc::new(InMemoryStopOrderRepository::new());
    let stop_pairs = Arc::new(InMemoryStopPairRepository::new());
    let trailing_stops = Arc::new(InMemoryTrailingStopRepository::new());
    let positions = Arc::new(InMemoryPositionRepository::new());

    let cache = Arc::new(MarketDataCache::new());
    let trigger_engine = Arc::new(TriggerEngine::new());
    let metrics = Arc::new(
        Metrics::new().map_err(|e| CoreError::InvalidParameter(format!("metrics init: {e}")))?,
    );

    let risk_gate = Arc::new(RiskGate::new(
        config.risk.clone().into(),
        chrono::Utc::now(),
    ));
    // FUTURES only; unused by the SPOT risk path but still needs a value.
    let futures_leverage = venue_config.default_leverage.unwrap_or(1);

    let dispatcher = Arc::new(Dispatcher::new(
        conditional_orders.clone(),
        positions.clone(),
        exchange.clone(),
        risk_gate.clone(),
        metrics.clone(),
        venue,
        futures_leverage,
    ));

    let scheduler_config = SchedulerConfig {
        venue,
        tick_interval: Duration::from_millis(config.conditional_orders.monitoring_interval_ms),
        idle_interval: Duration::from_millis(config.conditional_orders.idle_interval_ms),
        enable_smart_polling: config.conditional_orders.enable_smart_polling,
        max_concurrent_dispatches: 8,
    };

    let scheduler = MonitoringScheduler::new(
        scheduler_config,
        conditional_orders.clone(),
        stop_orders.clone(),
        stop_pairs.clone(),
        trailing_stops.clone(),
        positions.clone(),
        exchange,
        cache,
        trigger_engine,
        dispatcher,
        risk_gate.clone(),
        futures_leverage,
        metrics.clone(),
    );

    Ok(CoreHandle {
        scheduler,
        conditional_orders,
        stop_orders,
        stop_pairs,
        trailing_stops,
        positions,
        risk_gate,
        metrics,
    })
}
