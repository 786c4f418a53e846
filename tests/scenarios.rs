//! End-to-end scheduler scenarios, driven through the real
//! `MonitoringScheduler` against in-memory repositories and a stub
//! exchange. These exercise the tick loop itself, not just the pieces it
//! calls in isolation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use order_trigger_engine::application::dispatcher::Dispatcher;
use order_trigger_engine::application::market_data_cache::MarketDataCache;
use order_trigger_engine::application::risk_gate::{RiskGate, RiskLimits};
use order_trigger_engine::application::scheduler::{MonitoringScheduler, SchedulerConfig};
use order_trigger_engine::application::trigger_engine::TriggerEngine;
use order_trigger_engine::domain::conditional_order::{
    ConditionalOrder, OrderSide, OrderType,
};
use order_trigger_engine::domain::errors::CoreError;
use order_trigger_engine::domain::exchange::{ExchangeCapability, Kline, OrderIntent};
use order_trigger_engine::domain::position::{FuturesPosition, MarginType, PositionSide};
use order_trigger_engine::domain::repositories::{
    ConditionalOrderRepository, PositionRepository, StopOrderRepository, StopPairRepository,
};
use order_trigger_engine::domain::stop_order::{StopOrder, StopOrderKind, StopOrderPair, StopOrderStatus};
use order_trigger_engine::domain::trigger::{Comparator, LeafKind, TriggerCondition, TriggerLeaf, Venue};
use order_trigger_engine::infrastructure::observability::Metrics;
use order_trigger_engine::infrastructure::repositories::{
    InMemoryConditionalOrderRepository, InMemoryPositionRepository, InMemoryStopOrderRepository,
    InMemoryStopPairRepository, InMemoryTrailingStopRepository,
};

/// Sequential price oracle: pops one value per call, then repeats its last
/// value forever. Also counts `place_order` submissions.
struct StubExchange {
    last_price: Mutex<VecDeque<Decimal>>,
    mark_price: Mutex<VecDeque<Decimal>>,
    place_order_calls: AtomicUsize,
}

impl StubExchange {
    fn new(last_price: Vec<Decimal>, mark_price: Vec<Decimal>) -> Self {
        Self {
            last_price: Mutex::new(last_price.into()),
            mark_price: Mutex::new(mark_price.into()),
            place_order_calls: AtomicUsize::new(0),
        }
    }

    fn pop_or_repeat(queue: &Mutex<VecDeque<Decimal>>) -> Decimal {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            *queue.front().unwrap_or(&Decimal::ZERO)
        }
    }
}

#[async_trait]
impl ExchangeCapability for StubExchange {
    async fn get_last_price(&self, _symbol: &str) -> Result<Decimal, CoreError> {
        Ok(Self::pop_or_repeat(&self.last_price))
    }
    async fn get_mark_price(&self, _symbol: &str) -> Result<Decimal, CoreError> {
        Ok(Self::pop_or_repeat(&self.mark_price))
    }
    async fn get_funding_rate(&self, _symbol: &str) -> Result<Decimal, CoreError> {
        Ok(dec!(0))
    }
    async fn get_recent_klines(&self, _symbol: &str, _window: chrono::Duration) -> Result<Vec<Kline>, CoreError> {
        Ok(vec![])
    }
    async fn get_quote_balance(&self, _asset: &str) -> Result<Decimal, CoreError> {
        Ok(dec!(100000))
    }
    async fn place_order(&self, _intent: &OrderIntent) -> Result<String, CoreError> {
        self.place_order_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Uuid::new_v4().to_string())
    }
}

fn generous_risk_gate() -> Arc<RiskGate> {
    Arc::new(RiskGate::new(
        RiskLimits {
            max_orders_per_day: 1000,
            max_orders_per_minute: 1000,
            max_active_orders: 1000,
            min_leverage: 1,
            max_leverage: 125,
            max_order_notional: dec!(1_000_000),
            quote_balance_reserve: dec!(0),
            max_position_value: dec!(1_000_000),
            min_margin_ratio: dec!(0),
            liquidation_buffer: dec!(0),
        },
        Utc::now(),
    ))
}

async fn run_ticks(scheduler: &Arc<MonitoringScheduler>, settle_for: Duration) {
    scheduler.start().await.unwrap();
    tokio::time::sleep(settle_for).await;
    scheduler.stop(Duration::from_secs(2)).await.unwrap();
}

/// S1: SPOT buy-the-dip. First tick sees 49500 (no fire), second sees
/// 48900 (fires). Exactly one order reaches the exchange.
#[tokio::test]
async fn s1_buy_the_dip_fires_exactly_once() {
    let conditional_orders = Arc::new(InMemoryConditionalOrderRepository::new());
    let stop_orders = Arc::new(InMemoryStopOrderRepository::new());
    let stop_pairs = Arc::new(InMemoryStopPairRepository::new());
    let trailing_stops = Arc::new(InMemoryTrailingStopRepository::new());
    let positions = Arc::new(InMemoryPositionRepository::new());

    let order = ConditionalOrder::new(
        Uuid::new_v4().to_string(),
        Venue::Spot,
        "BTCUSDT".into(),
        OrderSide::Buy,
        OrderType::Market,
        dec!(0.001),
        None,
        TriggerCondition::leaf(TriggerLeaf::new(LeafKind::Price, Comparator::Le, dec!(49000), None, None).unwrap()),
        None,
        Utc::now(),
    )
    .unwrap();
    let order_id = order.id.clone();
    conditional_orders.save(order).await.unwrap();

    let exchange = Arc::new(StubExchange::new(vec![dec!(49500), dec!(48900)], vec![]));
    let metrics = Arc::new(Metrics::new().unwrap());
    let risk_gate = generous_risk_gate();
    let dispatcher = Arc::new(Dispatcher::new(
        conditional_orders.clone(),
        positions.clone(),
        exchange.clone(),
        risk_gate.clone(),
        metrics.clone(),
        Venue::Spot,
        10,
    ));

    let scheduler = MonitoringScheduler::new(
        SchedulerConfig {
            venue: Venue::Spot,
            tick_interval: Duration::from_millis(20),
            idle_interval: Duration::from_millis(20),
            enable_smart_polling: false,
            max_concurrent_dispatches: 4,
        },
        conditional_orders.clone(),
        stop_orders,
        stop_pairs,
        trailing_stops,
        positions,
        exchange.clone(),
        Arc::new(MarketDataCache::with_ttl(Duration::from_millis(1))),
        Arc::new(TriggerEngine::new()),
        dispatcher,
        risk_gate,
        10,
        metrics,
    );

    run_ticks(&scheduler, Duration::from_millis(200)).await;

    let order = conditional_orders.find_by_id(&order_id).await.unwrap();
    assert_eq!(order.status, order_trigger_engine::domain::conditional_order::ConditionalOrderStatus::Executed);
    assert!(order.executed_order_id.is_some());
    assert_eq!(exchange.place_order_calls.load(Ordering::SeqCst), 1);
}

/// S5: OCO pair. Price rises straight through the take-profit threshold;
/// the stop-loss never independently fires but is cancelled as the
/// take-profit's sibling.
#[tokio::test]
async fn s5_oco_pair_completes_with_one_trigger_and_one_cancel() {
    let conditional_orders = Arc::new(InMemoryConditionalOrderRepository::new());
    let stop_orders = Arc::new(InMemoryStopOrderRepository::new());
    let stop_pairs = Arc::new(InMemoryStopPairRepository::new());
    let trailing_stops = Arc::new(InMemoryTrailingStopRepository::new());
    let positions = Arc::new(InMemoryPositionRepository::new());

    let now = Utc::now();
    let stop_loss = StopOrder::new("sl".into(), "BTCUSDT".into(), dec!(0.01), dec!(49000), StopOrderKind::StopLoss, now).unwrap();
    let take_profit = StopOrder::new("tp".into(), "BTCUSDT".into(), dec!(0.01), dec!(52000), StopOrderKind::TakeProfit, now).unwrap();
    stop_orders.save(stop_loss).await.unwrap();
    stop_orders.save(take_profit).await.unwrap();
    stop_pairs.save(StopOrderPair::new("pair-1".into(), "sl".into(), "tp".into())).await.unwrap();

    let exchange = Arc::new(StubExchange::new(vec![dec!(52050)], vec![]));
    let metrics = Arc::new(Metrics::new().unwrap());
    let risk_gate = generous_risk_gate();
    let dispatcher = Arc::new(Dispatcher::new(
        conditional_orders.clone(),
        positions.clone(),
        exchange.clone(),
        risk_gate.clone(),
        metrics.clone(),
        Venue::Spot,
        10,
    ));

    let scheduler = MonitoringScheduler::new(
        SchedulerConfig {
            venue: Venue::Spot,
            tick_interval: Duration::from_millis(20),
            idle_interval: Duration::from_millis(20),
            enable_smart_polling: false,
            max_concurrent_dispatches: 4,
        },
        conditional_orders,
        stop_orders.clone(),
        stop_pairs.clone(),
        trailing_stops,
        positions,
        exchange.clone(),
        Arc::new(MarketDataCache::with_ttl(Duration::from_millis(1))),
        Arc::new(TriggerEngine::new()),
        dispatcher,
        risk_gate,
        10,
        metrics,
    );

    run_ticks(&scheduler, Duration::from_millis(100)).await;

    let sl = stop_orders.find_by_id("sl").await.unwrap();
    let tp = stop_orders.find_by_id("tp").await.unwrap();
    assert_eq!(sl.status, StopOrderStatus::Cancelled);
    assert_eq!(tp.status, StopOrderStatus::Triggered);

    let pair = stop_pairs.find_by_child_id("sl").await.unwrap().unwrap();
    assert_eq!(pair.status, order_trigger_engine::domain::stop_order::StopPairStatus::Completed);
    assert_eq!(exchange.place_order_calls.load(Ordering::SeqCst), 1);
}

/// S6: FUTURES unrealized-PnL trigger. PnL at the first mark price (51500)
/// is below the 100 USDT threshold; at the second (61000) it clears it and
/// the conditional order fires exactly once even though the tick loop
/// keeps re-evaluating afterward.
#[tokio::test]
async fn s6_futures_pnl_trigger_fires_once() {
    let conditional_orders = Arc::new(InMemoryConditionalOrderRepository::new());
    let stop_orders = Arc::new(InMemoryStopOrderRepository::new());
    let stop_pairs = Arc::new(InMemoryStopPairRepository::new());
    let trailing_stops = Arc::new(InMemoryTrailingStopRepository::new());
    let positions = Arc::new(InMemoryPositionRepository::new());

    positions
        .upsert(FuturesPosition {
            symbol: "BTCUSDT".into(),
            side: PositionSide::Long,
            amount: dec!(0.01),
            entry_price: dec!(50000),
            mark_price: dec!(50000),
            leverage: 10,
            margin_type: MarginType::Crossed,
            liquidation_price: dec!(45000),
        })
        .await
        .unwrap();

    let order = ConditionalOrder::new(
        Uuid::new_v4().to_string(),
        Venue::Futures,
        "BTCUSDT".into(),
        OrderSide::Sell,
        OrderType::Market,
        dec!(0.01),
        None,
        TriggerCondition::leaf(
            TriggerLeaf::new(LeafKind::UnrealizedPnl, Comparator::Ge, dec!(100), None, None).unwrap(),
        ),
        None,
        Utc::now(),
    )
    .unwrap();
    let order_id = order.id.clone();
    conditional_orders.save(order).await.unwrap();

    let exchange = Arc::new(StubExchange::new(vec![], vec![dec!(51500), dec!(61000)]));
    let metrics = Arc::new(Metrics::new().unwrap());
    let risk_gate = generous_risk_gate();
    let dispatcher = Arc::new(Dispatcher::new(
        conditional_orders.clone(),
        positions.clone(),
        exchange.clone(),
        risk_gate.clone(),
        metrics.clone(),
        Venue::Futures,
        10,
    ));

    let scheduler = MonitoringScheduler::new(
        SchedulerConfig {
            venue: Venue::Futures,
            tick_interval: Duration::from_millis(20),
            idle_interval: Duration::from_millis(20),
            enable_smart_polling: false,
            max_concurrent_dispatches: 4,
        },
        conditional_orders.clone(),
        stop_orders,
        stop_pairs,
        trailing_stops,
        positions,
        exchange.clone(),
        Arc::new(MarketDataCache::with_ttl(Duration::from_millis(1))),
        Arc::new(TriggerEngine::new()),
        dispatcher,
        risk_gate,
        10,
        metrics,
    );

    run_ticks(&scheduler, Duration::from_millis(200)).await;

    let order = conditional_orders.find_by_id(&order_id).await.unwrap();
    assert_eq!(order.status, order_trigger_engine::domain::conditional_order::ConditionalOrderStatus::Executed);
    assert_eq!(exchange.place_order_calls.load(Ordering::SeqCst), 1);
}
