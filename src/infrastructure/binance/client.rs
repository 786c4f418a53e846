//! Binance exchange capability (spec.md §4.3, §6.1): spot and USDT-margined
//! futures behind the same `ExchangeCapability` trait. Grounded on the
//! teacher's `BinanceExecutionService` (HMAC signing, circuit breaker
//! wrapping, query-string construction), rebuilt against the narrower
//! oracle interface this core needs rather than the teacher's full
//! order/portfolio/stream surface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::application::rate_limiter::RateLimiter;
use crate::domain::conditional_order::{OrderSide, OrderType};
use crate::domain::errors::CoreError;
use crate::domain::exchange::{ExchangeCapability, Kline, OrderIntent};
use crate::domain::symbol::denormalize_symbol;
use crate::domain::trigger::Venue;
use crate::infrastructure::core::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::infrastructure::core::http_client_factory::{build_url_with_query, HttpClientFactory};
use crate::infrastructure::transport::{RetryPolicy, RetryTransport};

use super::common::{sign, validate_base_url};

pub struct BinanceExchange {
    venue: Venue,
    api_key: String,
    api_secret: String,
    base_url: String,
    transport: RetryTransport,
    rate_limiter: RateLimiter,
    circuit_breaker: Arc<CircuitBreaker>,
    /// Last timestamp sent, to satisfy the monotonic-timestamp requirement
    /// (spec.md §6.1) even if two calls race on the system clock.
    last_timestamp_ms: std::sync::atomic::AtomicI64,
}

impl BinanceExchange {
    pub fn new(
        venue: Venue,
        api_key: String,
        api_secret: String,
        base_url: String,
        max_calls_per_minute: u32,
    ) -> Result<Self, CoreError> {
        validate_base_url(&base_url)?;
        let client = HttpClientFactory::create_client();
        Ok(Self {
            venue,
            api_key,
            api_secret,
            base_url,
            transport: RetryTransport::new(client, RetryPolicy::default()),
            rate_limiter: RateLimiter::new(max_calls_per_minute),
            circuit_breaker: Arc::new(CircuitBreaker::new(
                "binance_exchange",
                5,
                3,
                Duration::from_secs(60),
            )),
            last_timestamp_ms: std::sync::atomic::AtomicI64::new(0),
        })
    }

    fn next_timestamp_ms(&self) -> i64 {
        use std::sync::atomic::Ordering;
        let now = Utc::now().timestamp_millis();
        let prev = self.last_timestamp_ms.fetch_max(now, Ordering::SeqCst);
        prev.max(now)
    }

    fn order_endpoint(&self) -> &'static str {
        match self.venue {
            Venue::Spot => "/api/v3/order",
            Venue::Futures => "/fapi/v1/order",
        }
    }

    fn price_endpoint(&self) -> &'static str {
        match self.venue {
            Venue::Spot => "/api/v3/ticker/price",
            Venue::Futures => "/fapi/v1/ticker/price",
        }
    }

    fn mark_price_endpoint(&self) -> &'static str {
        "/fapi/v1/premiumIndex"
    }

    fn klines_endpoint(&self) -> &'static str {
        match self.venue {
            Venue::Spot => "/api/v3/klines",
            Venue::Futures => "/fapi/v1/klines",
        }
    }

    fn balance_endpoint(&self) -> &'static str {
        match self.venue {
            Venue::Spot => "/api/v3/account",
            Venue::Futures => "/fapi/v2/balance",
        }
    }

    async fn signed_get(&self, path: &str, mut params: Vec<(String, String)>) -> Result<Vec<u8>, CoreError> {
        params.push(("timestamp".into(), self.next_timestamp_ms().to_string()));
        let query_string: String = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = sign(&self.api_secret, &query_string);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query_string, signature);

        let result = self
            .circuit_breaker
            .call(self.transport.do_with_retry(
                Method::GET,
                &url,
                &[("X-MBX-APIKEY", self.api_key.clone())],
                &self.rate_limiter,
            ))
            .await;
        unwrap_circuit(result)
    }

    async fn public_get(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<u8>, CoreError> {
        let url = build_url_with_query(&format!("{}{}", self.base_url, path), params);
        let result = self
            .circuit_breaker
            .call(self.transport.do_with_retry(Method::GET, &url, &[], &self.rate_limiter))
            .await;
        unwrap_circuit(result)
    }
}

fn unwrap_circuit(result: Result<Vec<u8>, CircuitBreakerError<CoreError>>) -> Result<Vec<u8>, CoreError> {
    result.map_err(|e| match e {
        CircuitBreakerError::Open(msg) => CoreError::Network(format!("circuit breaker open: {msg}")),
        CircuitBreakerError::Inner(inner) => inner,
    })
}

#[derive(Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Deserialize)]
struct PremiumIndex {
    #[serde(rename = "markPrice")]
    mark_price: String,
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
}

#[derive(Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    #[allow(dead_code)] serde_json::Value,
    #[allow(dead_code)] serde_json::Value,
    #[allow(dead_code)] serde_json::Value,
    #[allow(dead_code)] serde_json::Value,
    #[allow(dead_code)] serde_json::Value,
);

fn parse_decimal(s: &str) -> Result<Decimal, CoreError> {
    s.parse().map_err(|_| CoreError::InvalidParameter(format!("unparsable decimal: {s}")))
}

#[async_trait]
impl ExchangeCapability for BinanceExchange {
    async fn get_last_price(&self, symbol: &str) -> Result<Decimal, CoreError> {
        let api_symbol = denormalize_symbol(symbol);
        let bytes = self
            .public_get(self.price_endpoint(), &[("symbol", api_symbol)])
            .await?;
        let ticker: TickerPrice = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::Network(format!("decode ticker price: {e}")))?;
        parse_decimal(&ticker.price)
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, CoreError> {
        let api_symbol = denormalize_symbol(symbol);
        let bytes = self
            .public_get(self.mark_price_endpoint(), &[("symbol", api_symbol)])
            .await?;
        let premium: PremiumIndex = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::Network(format!("decode premium index: {e}")))?;
        parse_decimal(&premium.mark_price)
    }

    async fn get_funding_rate(&self, symbol: &str) -> Result<Decimal, CoreError> {
        let api_symbol = denormalize_symbol(symbol);
        let bytes = self
            .public_get(self.mark_price_endpoint(), &[("symbol", api_symbol)])
            .await?;
        let premium: PremiumIndex = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::Network(format!("decode premium index: {e}")))?;
        parse_decimal(&premium.last_funding_rate)
    }

    async fn get_recent_klines(&self, symbol: &str, window: chrono::Duration) -> Result<Vec<Kline>, CoreError> {
        let api_symbol = denormalize_symbol(symbol);
        let bytes = self
            .public_get(
                self.klines_endpoint(),
                &[
                    ("symbol", api_symbol),
                    ("interval", "1m".to_string()),
                    ("limit", window.num_minutes().max(1).to_string()),
                ],
            )
            .await?;
        let raw: Vec<RawKline> = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::Network(format!("decode klines: {e}")))?;
        raw.into_iter()
            .map(|k| {
                Ok(Kline {
                    open_time: DateTime::from_timestamp_millis(k.0)
                        .ok_or_else(|| CoreError::Network("invalid kline open_time".into()))?,
                    close_time: DateTime::from_timestamp_millis(k.6)
                        .ok_or_else(|| CoreError::Network("invalid kline close_time".into()))?,
                    base_volume: parse_decimal(&k.5)?,
                })
            })
            .collect()
    }

    async fn get_quote_balance(&self, asset: &str) -> Result<Decimal, CoreError> {
        match self.venue {
            Venue::Spot => {
                #[derive(Deserialize)]
                struct Balance {
                    asset: String,
                    free: String,
                }
                #[derive(Deserialize)]
                struct Account {
                    balances: Vec<Balance>,
                }
                let bytes = self.signed_get(self.balance_endpoint(), vec![]).await?;
                let account: Account = serde_json::from_slice(&bytes)
                    .map_err(|e| CoreError::Network(format!("decode account: {e}")))?;
                account
                    .balances
                    .into_iter()
                    .find(|b| b.asset == asset)
                    .map(|b| parse_decimal(&b.free))
                    .unwrap_or(Ok(Decimal::ZERO))
            }
            Venue::Futures => {
                #[derive(Deserialize)]
                struct FuturesBalance {
                    asset: String,
                    balance: String,
                }
                let bytes = self.signed_get(self.balance_endpoint(), vec![]).await?;
                let balances: Vec<FuturesBalance> = serde_json::from_slice(&bytes)
                    .map_err(|e| CoreError::Network(format!("decode futures balance: {e}")))?;
                balances
                    .into_iter()
                    .find(|b| b.asset == asset)
                    .map(|b| parse_decimal(&b.balance))
                    .unwrap_or(Ok(Decimal::ZERO))
            }
        }
    }

    async fn place_order(&self, intent: &OrderIntent) -> Result<String, CoreError> {
        let api_symbol = denormalize_symbol(&intent.symbol);
        let side = match intent.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let order_type = match intent.order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        };

        let mut params = vec![
            ("symbol".to_string(), api_symbol),
            ("side".to_string(), side.to_string()),
            ("type".to_string(), order_type.to_string()),
            ("quantity".to_string(), intent.quantity.to_string()),
        ];
        if let Some(limit_price) = intent.limit_price {
            params.push(("price".to_string(), limit_price.to_string()));
            params.push(("timeInForce".to_string(), "GTC".to_string()));
        }
        if self.venue == Venue::Futures && intent.reduce_only {
            params.push(("reduceOnly".to_string(), "true".to_string()));
        }

        let bytes = self.signed_post(self.order_endpoint(), params).await?;

        #[derive(Deserialize)]
        struct OrderResponse {
            #[serde(rename = "orderId")]
            order_id: i64,
        }
        let response: OrderResponse = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::Network(format!("decode order response: {e}")))?;
        info!(order_id = response.order_id, symbol = %intent.symbol, "order placed on exchange");
        Ok(response.order_id.to_string())
    }
}

impl BinanceExchange {
    async fn signed_post(&self, path: &str, mut params: Vec<(String, String)>) -> Result<Vec<u8>, CoreError> {
        params.push(("timestamp".into(), self.next_timestamp_ms().to_string()));
        let query_string: String = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = sign(&self.api_secret, &query_string);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query_string, signature);

        let result = self
            .circuit_breaker
            .call(self.transport.do_with_retry(
                Method::POST,
                &url,
                &[("X-MBX-APIKEY", self.api_key.clone())],
                &self.rate_limiter,
            ))
            .await;
        unwrap_circuit(result)
    }
}
