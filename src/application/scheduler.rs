//! Monitoring Scheduler (spec.md §4.8): the heart of the core. One
//! dedicated task per scheduler; per-tick dispatches fan out onto a
//! semaphore-bounded set of concurrent tasks.
//!
//! Lifecycle as an explicit state machine (Stopped/Running/Stopping) per
//! the redesign note in SPEC_FULL.md §9 — the teacher's `OrderThrottler`
//! loop informed the tick-and-retry shape, generalized here to the five
//! store kinds this core monitors.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{watch, Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::conditional_order::ConditionalOrderStatus;
use crate::domain::errors::CoreError;
use crate::domain::exchange::{ExchangeCapability, OrderIntent};
use crate::domain::conditional_order::{OrderSide, OrderType};
use crate::domain::repositories::{
    ConditionalOrderRepository, PositionRepository, StopOrderRepository, StopPairRepository,
    TrailingStopRepository,
};
use crate::domain::stop_order::{StopOrderKind, StopOrderStatus};
use crate::domain::symbol::quote_asset;
use crate::domain::trigger::{MarketSnapshot, SymbolSnapshot, Venue};
use crate::infrastructure::observability::metrics::Metrics;

use super::dispatcher::Dispatcher;
use super::market_data_cache::MarketDataCache;
use super::risk_gate::RiskGate;
use super::trailing_stop_controller;
use super::trigger_engine::TriggerEngine;

const STOPPED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub venue: Venue,
    pub tick_interval: Duration,
    pub idle_interval: Duration,
    pub enable_smart_polling: bool,
    pub max_concurrent_dispatches: usize,
}

pub struct MonitoringScheduler {
    config: SchedulerConfig,
    state: AtomicU8,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
    stop_tx: AsyncMutex<Option<watch::Sender<bool>>>,

    conditional_orders: Arc<dyn ConditionalOrderRepository>,
    stop_orders: Arc<dyn StopOrderRepository>,
    stop_pairs: Arc<dyn StopPairRepository>,
    trailing_stops: Arc<dyn TrailingStopRepository>,
    positions: Arc<dyn PositionRepository>,
    exchange: Arc<dyn ExchangeCapability>,
    cache: Arc<MarketDataCache>,
    trigger_engine: Arc<TriggerEngine>,
    dispatcher: Arc<Dispatcher>,
    risk_gate: Arc<RiskGate>,
    metrics: Arc<Metrics>,
    /// Configured leverage used for FUTURES risk checks on stop/trailing
    /// fires; see `Dispatcher::futures_leverage` for why this isn't read
    /// off the order itself.
    futures_leverage: u32,
}

impl MonitoringScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        conditional_orders: Arc<dyn ConditionalOrderRepository>,
        stop_orders: Arc<dyn StopOrderRepository>,
        stop_pairs: Arc<dyn StopPairRepository>,
        trailing_stops: Arc<dyn TrailingStopRepository>,
        positions: Arc<dyn PositionRepository>,
        exchange: Arc<dyn ExchangeCapability>,
        cache: Arc<MarketDataCache>,
        trigger_engine: Arc<TriggerEngine>,
        dispatcher: Arc<Dispatcher>,
        risk_gate: Arc<RiskGate>,
        futures_leverage: u32,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: AtomicU8::new(STOPPED),
            handle: AsyncMutex::new(None),
            stop_tx: AsyncMutex::new(None),
            conditional_orders,
            stop_orders,
            stop_pairs,
            trailing_stops,
            positions,
            exchange,
            cache,
            trigger_engine,
            dispatcher,
            risk_gate,
            futures_leverage,
            metrics,
        })
    }

    /// Idempotent: starting an already-started scheduler is an error.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoreError> {
        if self
            .state
            .compare_exchange(STOPPED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CoreError::InvalidParameter("scheduler already running".into()));
        }

        let (tx, mut rx) = watch::channel(false);
        *self.stop_tx.lock().await = Some(tx);

        let this = Arc::clone(self);
        let jh = tokio::spawn(async move {
            loop {
                if *rx.borrow() {
                    break;
                }
                let active_count = match this.tick().await {
                    Ok(count) => {
                        this.metrics.record_tick("ok");
                        count
                    }
                    Err(e) => {
                        error!(error = %e, "scheduler tick failed, continuing on next tick");
                        this.metrics.record_tick("panic_recovered");
                        0
                    }
                };
                this.metrics.set_active_orders(active_count);

                let sleep_for = if this.config.enable_smart_polling && active_count == 0 {
                    this.config.idle_interval
                } else {
                    this.config.tick_interval
                };

                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            this.state.store(STOPPED, Ordering::SeqCst);
        });

        *self.handle.lock().await = Some(jh);
        info!("monitoring scheduler started");
        Ok(())
    }

    /// Idempotent: stopping an already-stopped scheduler is an error.
    /// Signals the loop, waits for the in-flight tick and its dispatches
    /// to drain, or aborts once `deadline` passes.
    pub async fn stop(&self, deadline: Duration) -> Result<(), CoreError> {
        if self
            .state
            .compare_exchange(RUNNING, STOPPING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CoreError::InvalidParameter("scheduler not running".into()));
        }

        if let Some(tx) = self.stop_tx.lock().await.take() {
            let _ = tx.send(true);
        }

        if let Some(jh) = self.handle.lock().await.take() {
            if tokio::time::timeout(deadline, jh).await.is_err() {
                warn!("scheduler shutdown deadline exceeded, in-flight dispatches may be abandoned");
            }
        }
        self.state.store(STOPPED, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) != STOPPED
    }

    /// One iteration. Returns the number of orders still active afterwards
    /// so the caller can decide whether to extend the tick interval.
    async fn tick(&self) -> Result<usize, CoreError> {
        let now = Utc::now();

        let mut conditional = self.conditional_orders.list_active().await?;
        for order in &conditional {
            if let Some(window) = &order.time_window {
                if window.has_elapsed(now) {
                    if self
                        .conditional_orders
                        .compare_and_set_status(
                            &order.id,
                            ConditionalOrderStatus::Pending,
                            ConditionalOrderStatus::Cancelled,
                        )
                        .await?
                    {
                        self.trigger_engine.unregister(&order.id);
                        info!(order_id = %order.id, "conditional order cancelled: time window elapsed");
                    }
                }
            }
        }
        conditional.retain(|o| {
            !matches!(
                o.time_window.as_ref().map(|w| w.has_elapsed(now)),
                Some(true)
            )
        });

        // Re-registering an already-known order is a harmless overwrite;
        // this is what picks up orders saved after the scheduler started.
        for order in &conditional {
            self.trigger_engine
                .register(order.id.clone(), order.symbol.clone(), order.condition.clone());
        }

        let stop_orders = self.stop_orders.list_active().await?;
        let trailing_stops = self.trailing_stops.list_active().await?;

        let mut symbols: HashSet<String> = HashSet::new();
        symbols.extend(conditional.iter().map(|o| o.symbol.clone()));
        symbols.extend(stop_orders.iter().map(|o| o.symbol.clone()));
        symbols.extend(trailing_stops.iter().map(|o| o.symbol.clone()));

        let active_total = conditional.len() + stop_orders.len() + trailing_stops.len();
        if symbols.is_empty() {
            return Ok(active_total);
        }

        let snapshot = self.build_snapshot(&symbols, now).await;

        let fired = self.trigger_engine.evaluate(&snapshot);
        if !fired.is_empty() {
            self.dispatch_fired(fired).await;
        }

        for stop_order in stop_orders {
            self.process_stop_order(
                &stop_order.id,
                stop_order.symbol.as_str(),
                stop_order.quantity,
                stop_order.stop_price,
                stop_order.kind,
                &snapshot,
                now,
            )
            .await;
        }

        for mut trailing in trailing_stops {
            let Some(symbol_snapshot) = snapshot.get(&trailing.symbol) else {
                continue;
            };
            let Some(price) = symbol_snapshot.last_price else {
                continue;
            };
            let advance = trailing_stop_controller::advance(&mut trailing, price, now);
            if advance.updated {
                self.trailing_stops.update(trailing.clone()).await?;
            }
            if advance.should_fire {
                self.fire_trailing_stop(trailing, price, now).await;
            }
        }

        Ok(active_total)
    }

    async fn build_snapshot(&self, symbols: &HashSet<String>, now: chrono::DateTime<chrono::Utc>) -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::new(now);
        for symbol in symbols {
            let last_price = self.fetch_cached(symbol, "last_price").await;

            let (mark_price, funding_rate, unrealized_pnl) = if self.config.venue == Venue::Futures {
                let mark_price = self.fetch_cached(symbol, "mark_price").await;
                let funding_rate = self.fetch_cached(symbol, "funding_rate").await;
                let unrealized_pnl = match (mark_price, self.positions.find(symbol).await) {
                    (Some(mark_price), Ok(position)) => {
                        Some((mark_price - position.entry_price) * position.amount)
                    }
                    _ => None,
                };
                (mark_price, funding_rate, unrealized_pnl)
            } else {
                (None, None, None)
            };

            snapshot.insert(
                symbol.clone(),
                SymbolSnapshot {
                    last_price,
                    mark_price,
                    funding_rate,
                    volume: None,
                    unrealized_pnl,
                    margin_ratio: None,
                },
            );
        }
        snapshot
    }

    /// Cache-through fetch for one `(symbol, kind)` market-data field.
    async fn fetch_cached(&self, symbol: &str, kind: &'static str) -> Option<Decimal> {
        if let Some(cached) = self.cache.get(symbol, kind) {
            return Some(cached);
        }
        let fetched = match kind {
            "last_price" => self.exchange.get_last_price(symbol).await,
            "mark_price" => self.exchange.get_mark_price(symbol).await,
            "funding_rate" => self.exchange.get_funding_rate(symbol).await,
            _ => unreachable!("unknown market data kind"),
        };
        match fetched {
            Ok(value) => {
                self.cache.put(symbol, kind, value);
                Some(value)
            }
            Err(e) => {
                warn!(symbol, kind, error = %e, "market data fetch failed this tick");
                None
            }
        }
    }

    async fn dispatch_fired(&self, fired: Vec<String>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_dispatches));
        let mut handles = Vec::with_capacity(fired.len());
        for order_id in fired {
            let dispatcher = Arc::clone(&self.dispatcher);
            let trigger_engine = Arc::clone(&self.trigger_engine);
            let permit = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await;
                match dispatcher.dispatch(&order_id).await {
                    Ok(true) => trigger_engine.unregister(&order_id),
                    Ok(false) => {}
                    Err(e) => error!(order_id, error = %e, "dispatch failed"),
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Runs the same pre-trade pipeline the dispatcher runs, for fires that
    /// don't go through it (stop-loss, take-profit, trailing-stop; spec.md
    /// §1 requires every execution to pass the Risk Gate, not just
    /// conditional orders).
    async fn run_risk_checks(
        &self,
        symbol: &str,
        intent: &OrderIntent,
        price: Decimal,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CoreError> {
        let notional = intent.quantity * price;
        let active = self.conditional_orders.count_active().await.unwrap_or(0);
        self.risk_gate.check_common(active, notional, now)?;

        let quote = quote_asset(symbol).map_err(CoreError::InvalidParameter)?;
        let quote_balance = self.exchange.get_quote_balance(&quote).await?;

        match self.config.venue {
            Venue::Spot => self.risk_gate.check_spot(intent, notional, quote_balance),
            Venue::Futures => {
                let position = self.positions.find(symbol).await.ok();
                self.risk_gate.check_futures(
                    intent,
                    self.futures_leverage,
                    position.as_ref(),
                    price,
                    quote_balance,
                )
            }
        }
    }

    async fn process_stop_order(
        &self,
        id: &str,
        symbol: &str,
        quantity: Decimal,
        stop_price: Decimal,
        kind: StopOrderKind,
        snapshot: &MarketSnapshot,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        let Some(price) = snapshot.get(symbol).and_then(|s| s.last_price) else {
            return;
        };
        let fires = match kind {
            StopOrderKind::StopLoss => price <= stop_price,
            StopOrderKind::TakeProfit => price >= stop_price,
        };
        if !fires {
            return;
        }

        let acquired = match self
            .stop_orders
            .compare_and_set_status(id, StopOrderStatus::Active, StopOrderStatus::Triggered)
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                error!(order_id = id, error = %e, "stop order CAS failed");
                return;
            }
        };
        if !acquired {
            return;
        }

        if let Ok(Some(mut pair)) = self.stop_pairs.find_by_child_id(id).await {
            if let Ok(sibling) = pair.on_child_triggered(id) {
                let sibling = sibling.to_string();
                let _ = self
                    .stop_orders
                    .compare_and_set_status(&sibling, StopOrderStatus::Active, StopOrderStatus::Cancelled)
                    .await;
                let _ = self.stop_pairs.update(pair).await;
            }
        }

        let intent = OrderIntent {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            reduce_only: self.config.venue == Venue::Futures,
        };

        if let Err(e) = self.run_risk_checks(symbol, &intent, price, now).await {
            error!(order_id = id, error = %e, "stop order fired but risk gate rejected it, leaving TRIGGERED");
            self.metrics.record_risk_rejection();
            return;
        }

        if let Err(e) = self.exchange.place_order(&intent).await {
            error!(order_id = id, error = %e, "stop order fired but exchange submission failed");
        } else {
            self.risk_gate.record_call(now);
            self.metrics.record_fire();
        }
    }

    async fn fire_trailing_stop(
        &self,
        mut order: crate::domain::trailing_stop::TrailingStopOrder,
        price: Decimal,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        use crate::domain::trailing_stop::{PositionSide, TrailingStopStatus};

        order.status = TrailingStopStatus::Triggered;
        if let Err(e) = self.trailing_stops.update(order.clone()).await {
            error!(order_id = %order.id, error = %e, "trailing stop update failed");
            return;
        }

        let side = match order.side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        };
        let intent = OrderIntent {
            symbol: order.symbol.clone(),
            side,
            order_type: OrderType::Market,
            quantity: order.quantity,
            limit_price: None,
            reduce_only: self.config.venue == Venue::Futures,
        };

        if let Err(e) = self.run_risk_checks(&order.symbol, &intent, price, now).await {
            error!(order_id = %order.id, error = %e, "trailing stop fired but risk gate rejected it");
            self.metrics.record_risk_rejection();
            return;
        }

        if let Err(e) = self.exchange.place_order(&intent).await {
            error!(order_id = %order.id, error = %e, "trailing stop fired but exchange submission failed");
        } else {
            self.risk_gate.record_call(now);
            self.metrics.record_fire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_constants_are_distinct() {
        assert_ne!(STOPPED, RUNNING);
        assert_ne!(RUNNING, STOPPING);
        assert_ne!(STOPPED, STOPPING);
    }
}
