//! Configuration schema (spec.md §6.3): YAML with `${VAR}` substitution
//! from the process environment, resolved once at startup into `CoreConfig`.
//! Kept out of `domain`/`application` per the redesign note in
//! SPEC_FULL.md §9 — construction is an infrastructure concern, the core
//! only ever sees the resolved values.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::application::risk_gate::RiskLimits;
use crate::domain::position::MarginType;
use crate::infrastructure::core::mask_secret;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginTypeConfig {
    Crossed,
    Isolated,
}

impl From<MarginTypeConfig> for MarginType {
    fn from(value: MarginTypeConfig) -> Self {
        match value {
            MarginTypeConfig::Crossed => MarginType::Crossed,
            MarginTypeConfig::Isolated => MarginType::Isolated,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct VenueConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    #[serde(default)]
    pub testnet: bool,
    /// FUTURES only.
    pub default_leverage: Option<u32>,
    /// FUTURES only.
    pub default_margin_type: Option<MarginTypeConfig>,
}

/// Masks `api_key`/`api_secret` so a stray `{:?}` on the resolved config
/// never puts a full credential in a log line.
impl std::fmt::Debug for VenueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("api_secret", &mask_secret(&self.api_secret))
            .field("base_url", &self.base_url)
            .field("testnet", &self.testnet)
            .field("default_leverage", &self.default_leverage)
            .field("default_margin_type", &self.default_margin_type)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    pub max_orders_per_day: u32,
    pub max_orders_per_minute: u32,
    pub max_active_orders: usize,
    pub min_leverage: u32,
    pub max_leverage: u32,
    /// Both venues: rejects an order whose quantity * reference price
    /// exceeds this notional.
    pub max_order_notional: rust_decimal::Decimal,
    /// SPOT only: a BUY may not leave less than this much quote balance.
    pub quote_balance_reserve: rust_decimal::Decimal,
    /// FUTURES only: rejects a fill that would leave the position worth
    /// more than this, measured at mark price.
    pub max_position_value: rust_decimal::Decimal,
    /// FUTURES only: rejects a fill that would leave quote-balance /
    /// post-trade-position-value below this ratio.
    pub min_margin_ratio: rust_decimal::Decimal,
    /// FUTURES only: rejects a fill whose entry price sits closer to the
    /// position's liquidation price than this fraction, e.g. `0.05` requires
    /// entry_price >= liquidation_price * 1.05 for a long.
    pub liquidation_buffer: rust_decimal::Decimal,
}

impl From<RiskConfig> for RiskLimits {
    fn from(value: RiskConfig) -> Self {
        RiskLimits {
            max_orders_per_day: value.max_orders_per_day,
            max_orders_per_minute: value.max_orders_per_minute,
            max_active_orders: value.max_active_orders,
            min_leverage: value.min_leverage,
            max_leverage: value.max_leverage,
            max_order_notional: value.max_order_notional,
            quote_balance_reserve: value.quote_balance_reserve,
            max_position_value: value.max_position_value,
            min_margin_ratio: value.min_margin_ratio,
            liquidation_buffer: value.liquidation_buffer,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionalOrdersConfig {
    pub monitoring_interval_ms: u64,
    pub max_active_orders: usize,
    pub trigger_execution_timeout_ms: u64,
    #[serde(default)]
    pub enable_smart_polling: bool,
    /// Used only when `enable_smart_polling` is true and nothing is active.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
}

fn default_idle_interval_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopLossConfig {
    pub default_trail_percent: rust_decimal::Decimal,
    pub min_trail_percent: rust_decimal::Decimal,
    pub max_trail_percent: rust_decimal::Decimal,
    pub update_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    pub file: Option<String>,
    pub rotation: Option<String>,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    pub spot: VenueConfig,
    pub futures: VenueConfig,
    pub risk: RiskConfig,
    pub retry: RetryConfig,
    pub conditional_orders: ConditionalOrdersConfig,
    pub stop_loss: StopLossConfig,
    pub logging: LoggingConfig,
}

impl CoreConfig {
    /// Reads `path`, substitutes `${VAR}` references against the process
    /// environment, and parses the result as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let resolved = substitute_env_vars(&raw)
            .with_context(|| format!("resolving ${{VAR}} references in {}", path.display()))?;
        let config: CoreConfig =
            serde_yaml::from_str(&resolved).context("parsing config YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.retry.backoff_multiplier <= 1.0 {
            bail!("retry.backoff_multiplier must be > 1.0");
        }
        if let Some(leverage) = self.futures.default_leverage {
            if !(1..=125).contains(&leverage) {
                bail!("futures.default_leverage must be in [1, 125]");
            }
        }
        Ok(())
    }
}

/// Replaces every `${VAR}` occurrence with the value of the environment
/// variable `VAR`. Unset variables are an error rather than silently
/// substituted with an empty string, since a missing API key should fail
/// startup, not produce a blank credential.
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            bail!("unterminated ${{VAR}} reference");
        };
        let var_name = &after[..end];
        let value = std::env::var(var_name)
            .with_context(|| format!("environment variable {var_name} is not set"))?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_config_debug_masks_credentials() {
        let venue = VenueConfig {
            api_key: "AKIA1234567890ABCDEF".into(),
            api_secret: "s3cr3t-value-do-not-print".into(),
            base_url: "https://api.binance.com".into(),
            testnet: false,
            default_leverage: None,
            default_margin_type: None,
        };
        let debug = format!("{venue:?}");
        assert!(!debug.contains("AKIA1234567890ABCDEF"));
        assert!(!debug.contains("s3cr3t-value-do-not-print"));
        assert!(debug.contains("AKIA"));
    }

    #[test]
    fn substitutes_known_env_var() {
        std::env::set_var("CONFIG_TEST_VAR", "secret-value");
        let resolved = substitute_env_vars("api_secret: ${CONFIG_TEST_VAR}").unwrap();
        assert_eq!(resolved, "api_secret: secret-value");
        std::env::remove_var("CONFIG_TEST_VAR");
    }

    #[test]
    fn unset_env_var_is_an_error() {
        std::env::remove_var("CONFIG_TEST_MISSING");
        assert!(substitute_env_vars("${CONFIG_TEST_MISSING}").is_err());
    }

    #[test]
    fn unterminated_reference_is_an_error() {
        assert!(substitute_env_vars("${OOPS").is_err());
    }

    #[test]
    fn rejects_backoff_multiplier_not_greater_than_one() {
        std::env::set_var("CFG_API_KEY", "k");
        std::env::set_var("CFG_API_SECRET", "s");
        let yaml = r#"
spot:
  api_key: ${CFG_API_KEY}
  api_secret: ${CFG_API_SECRET}
  base_url: https://api.binance.com
futures:
  api_key: ${CFG_API_KEY}
  api_secret: ${CFG_API_SECRET}
  base_url: https://fapi.binance.com
  default_leverage: 10
  default_margin_type: crossed
risk:
  max_orders_per_day: 100
  max_orders_per_minute: 10
  max_active_orders: 50
  min_leverage: 1
  max_leverage: 125
  max_order_notional: "50000"
  quote_balance_reserve: "100"
  max_position_value: "100000"
  min_margin_ratio: "0.05"
  liquidation_buffer: "0.05"
retry:
  backoff_multiplier: 1.0
conditional_orders:
  monitoring_interval_ms: 1000
  max_active_orders: 50
  trigger_execution_timeout_ms: 5000
  enable_smart_polling: true
stop_loss:
  default_trail_percent: "2"
  min_trail_percent: "0.5"
  max_trail_percent: "10"
  update_interval_ms: 1000
logging:
  file: null
  rotation: null
"#;
        let dir = std::env::temp_dir().join(format!("core-config-test-{}", std::process::id()));
        std::fs::write(&dir, yaml).unwrap();
        let err = CoreConfig::load(&dir).unwrap_err();
        assert!(err.to_string().contains("backoff_multiplier"));
        std::fs::remove_file(&dir).ok();
        std::env::remove_var("CFG_API_KEY");
        std::env::remove_var("CFG_API_SECRET");
    }
}
