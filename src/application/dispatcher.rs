//! Execution Dispatcher (spec.md §4.9). The at-most-once firing invariant
//! lives entirely in step 1: a compare-and-swap on the repository is the
//! single commit point, so two racing ticks can both call `dispatch` on the
//! same order and only one will ever reach the exchange.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::conditional_order::ConditionalOrderStatus;
use crate::domain::errors::CoreError;
use crate::domain::exchange::{ExchangeCapability, OrderIntent};
use crate::domain::repositories::{ConditionalOrderRepository, PositionRepository};
use crate::domain::symbol::quote_asset;
use crate::domain::trigger::Venue;
use crate::infrastructure::observability::metrics::Metrics;

use super::risk_gate::RiskGate;

pub struct Dispatcher {
    orders: Arc<dyn ConditionalOrderRepository>,
    positions: Arc<dyn PositionRepository>,
    exchange: Arc<dyn ExchangeCapability>,
    risk_gate: Arc<RiskGate>,
    metrics: Arc<Metrics>,
    venue: Venue,
    /// Configured leverage used for FUTURES risk checks. `ConditionalOrder`
    /// doesn't carry a per-order leverage (spec.md §3 data model), so each
    /// venue's configured default stands in for it here.
    futures_leverage: u32,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn ConditionalOrderRepository>,
        positions: Arc<dyn PositionRepository>,
        exchange: Arc<dyn ExchangeCapability>,
        risk_gate: Arc<RiskGate>,
        metrics: Arc<Metrics>,
        venue: Venue,
        futures_leverage: u32,
    ) -> Self {
        Self {
            orders,
            positions,
            exchange,
            risk_gate,
            metrics,
            venue,
            futures_leverage,
        }
    }

    /// Attempts to fire `order_id`. A `false` return means another task
    /// already owns the transition; this is the normal outcome of a CAS
    /// race (spec.md §8 S2), not an error.
    pub async fn dispatch(&self, order_id: &str) -> Result<bool, CoreError> {
        let acquired = self
            .orders
            .compare_and_set_status(
                order_id,
                ConditionalOrderStatus::Pending,
                ConditionalOrderStatus::Triggered,
            )
            .await?;
        if !acquired {
            info!(order_id, "dispatch: CAS lost, order already claimed");
            return Ok(false);
        }

        let order = self.orders.find_by_id(order_id).await?;
        let now = chrono::Utc::now();

        let reference_price = match order.limit_price {
            Some(price) => price,
            None => match self.venue {
                Venue::Spot => self.exchange.get_last_price(&order.symbol).await?,
                Venue::Futures => self.exchange.get_mark_price(&order.symbol).await?,
            },
        };
        let notional = order.quantity * reference_price;

        let active = self.orders.count_active().await?;
        if let Err(e) = self.risk_gate.check_common(active, notional, now) {
            error!(order_id, error = %e, "dispatch: risk gate rejected order (common checks), leaving TRIGGERED");
            self.metrics.record_risk_rejection();
            return Err(e);
        }

        let intent = OrderIntent {
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            quantity: order.quantity,
            limit_price: order.limit_price,
            reduce_only: false,
        };

        let quote = quote_asset(&order.symbol).map_err(CoreError::InvalidParameter)?;
        let quote_balance = self.exchange.get_quote_balance(&quote).await?;

        match self.venue {
            Venue::Spot => {
                if let Err(e) = self.risk_gate.check_spot(&intent, notional, quote_balance) {
                    error!(order_id, error = %e, "dispatch: risk gate rejected order (spot checks), leaving TRIGGERED");
                    self.metrics.record_risk_rejection();
                    return Err(e);
                }
            }
            Venue::Futures => {
                let position = self.positions.find(&order.symbol).await.ok();
                if let Err(e) = self.risk_gate.check_futures(
                    &intent,
                    self.futures_leverage,
                    position.as_ref(),
                    reference_price,
                    quote_balance,
                ) {
                    error!(order_id, error = %e, "dispatch: risk gate rejected order (futures checks), leaving TRIGGERED");
                    self.metrics.record_risk_rejection();
                    return Err(e);
                }
            }
        }

        match self.exchange.place_order(&intent).await {
            Ok(exchange_order_id) => {
                self.risk_gate.record_call(now);
                let swapped = self
                    .orders
                    .compare_and_set_status(
                        order_id,
                        ConditionalOrderStatus::Triggered,
                        ConditionalOrderStatus::Executed,
                    )
                    .await?;
                if swapped {
                    self.orders.record_execution(order_id, exchange_order_id).await?;
                    self.metrics.record_fire();
                    info!(order_id, "dispatch: order executed");
                } else {
                    warn!(order_id, "dispatch: order executed but status was no longer TRIGGERED");
                }
                Ok(true)
            }
            Err(e) => {
                // Left in TRIGGERED: the scheduler will not retry it
                // automatically (spec.md §9 open question on dispatcher
                // failure recovery).
                error!(order_id, error = %e, "dispatch: exchange submission failed, order stuck in TRIGGERED");
                Err(e)
            }
        }
    }
}
