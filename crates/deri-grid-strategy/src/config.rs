/*
[INPUT]:  YAML configuration file path.
[OUTPUT]: Validated strategy parameters.
[POS]:    Configuration layer - loaded once at startup.
[UPDATE]: When adding strategy parameters or validation rules.
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Strategy parameters, loaded from a YAML file at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Instrument to quote, e.g. "USDC_USDT".
    pub symbol: String,

    /// Settlement currency for balance reporting.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Size of every grid order, in base units.
    #[serde(with = "rust_decimal::serde::str")]
    pub position_size: Decimal,

    /// Number of buy levels below mid.
    #[serde(default = "default_levels")]
    pub num_buy_levels: u32,

    /// Number of sell levels above mid.
    #[serde(default = "default_levels")]
    pub num_sell_levels: u32,

    /// Price distance between adjacent levels.
    #[serde(with = "rust_decimal::serde::str")]
    pub step_size: Decimal,

    /// Seconds between polling cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Pause between per-order status requests, in milliseconds.
    #[serde(default = "default_order_check_delay_ms")]
    pub order_check_delay_ms: u64,

    /// Path of the resting-order snapshot file.
    #[serde(default = "default_order_log")]
    pub order_log: PathBuf,

    /// Directory for rolling log files. Stdout only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Pin mid to a constant instead of deriving it from the ticker.
    /// Useful for stable pairs that should always grid around parity.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub fixed_mid_price: Option<Decimal>,
}

fn default_currency() -> String {
    "USDT".to_string()
}

fn default_levels() -> u32 {
    5
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_order_check_delay_ms() -> u64 {
    1000
}

fn default_order_log() -> PathBuf {
    PathBuf::from("orders.json")
}

impl GridConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: GridConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            bail!("symbol must not be empty");
        }
        if self.position_size <= Decimal::ZERO {
            bail!("position_size must be positive, got {}", self.position_size);
        }
        if self.step_size <= Decimal::ZERO {
            bail!("step_size must be positive, got {}", self.step_size);
        }
        if self.num_buy_levels == 0 && self.num_sell_levels == 0 {
            bail!("at least one grid level is required");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }
        if let Some(mid) = self.fixed_mid_price {
            if mid <= Decimal::ZERO {
                bail!("fixed_mid_price must be positive, got {mid}");
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn order_check_delay(&self) -> Duration {
        Duration::from_millis(self.order_check_delay_ms)
    }
}
