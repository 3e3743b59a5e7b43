//! Application configuration loading and validation.
//!
//! Configuration comes from a TOML file (`config.toml` by default). Secrets
//! never live in the file: anything sensitive is read from the environment
//! at startup. Validation failures are surfaced loudly before any window
//! opens - they are the only errors allowed to terminate the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::domain::Asset;
use crate::engine::{MachineConfig, RunnerConfig};
use crate::error::{ConfigError, Result};
use crate::risk::RiskLimits;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which assets to track and how their windows are paced.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Asset symbols, e.g. `["btc", "eth"]`.
    pub assets: Vec<String>,
    /// Fixed window duration of the tracked markets.
    #[serde(default = "default_window_duration_secs")]
    pub window_duration_secs: u64,
    /// Backoff when nothing is listed for an asset.
    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,
    /// How long to wait for a venue resolution after the close.
    #[serde(default = "default_settle_grace_secs")]
    pub settle_grace_secs: u64,
}

const fn default_window_duration_secs() -> u64 {
    300
}

const fn default_retry_secs() -> u64 {
    15
}

const fn default_settle_grace_secs() -> u64 {
    5
}

/// Divergence detection thresholds. Defaults apply to every asset; the
/// `overrides` table adjusts individual assets.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Absolute edge (price units) that opens a divergence episode.
    #[serde(default = "default_soft_edge")]
    pub soft_edge: f64,
    /// Peak absolute edge required before executing.
    #[serde(default = "default_hard_edge")]
    pub hard_edge: f64,
    /// Minimum time the edge must hold above the soft threshold.
    #[serde(default = "default_min_sustained_ms")]
    pub min_sustained_ms: u64,
    /// Spot tick older than this marks the feed down.
    #[serde(default = "default_price_stale_secs")]
    pub price_stale_secs: u64,
    /// Vol snapshot older than this suspends detection.
    #[serde(default = "default_vol_stale_secs")]
    pub vol_stale_secs: u64,
    /// Allowed deviation of the YES+NO mid sum from 1.0.
    #[serde(default = "default_pair_sum_band")]
    pub pair_sum_band: f64,
    /// No execution this close to expiry.
    #[serde(default = "default_late_window_guard_secs")]
    pub late_window_guard_secs: u64,
    /// Order submission/fill confirmation deadline.
    #[serde(default = "default_order_deadline_secs")]
    pub order_deadline_secs: u64,
    /// Per-asset threshold overrides keyed by symbol.
    #[serde(default)]
    pub overrides: HashMap<String, AssetOverride>,
}

/// Per-asset overrides for the detection thresholds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetOverride {
    pub soft_edge: Option<f64>,
    pub hard_edge: Option<f64>,
    pub min_sustained_ms: Option<u64>,
}

fn default_soft_edge() -> f64 {
    0.05
}

fn default_hard_edge() -> f64 {
    0.08
}

const fn default_min_sustained_ms() -> u64 {
    3_000
}

const fn default_price_stale_secs() -> u64 {
    10
}

const fn default_vol_stale_secs() -> u64 {
    120
}

fn default_pair_sum_band() -> f64 {
    0.10
}

const fn default_late_window_guard_secs() -> u64 {
    15
}

const fn default_order_deadline_secs() -> u64 {
    10
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            soft_edge: default_soft_edge(),
            hard_edge: default_hard_edge(),
            min_sustained_ms: default_min_sustained_ms(),
            price_stale_secs: default_price_stale_secs(),
            vol_stale_secs: default_vol_stale_secs(),
            pair_sum_band: default_pair_sum_band(),
            late_window_guard_secs: default_late_window_guard_secs(),
            order_deadline_secs: default_order_deadline_secs(),
            overrides: HashMap::new(),
        }
    }
}

/// Risk ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Deposited seed bankroll in dollars.
    #[serde(default = "default_seed_usd")]
    pub seed_usd: Decimal,
    /// Ceiling on cumulative daily loss in dollars.
    #[serde(default = "default_daily_cap_usd")]
    pub daily_cap_usd: Decimal,
    /// Maximum concurrently open positions across all assets.
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    /// Fraction of balance used as the base position size.
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
}

fn default_seed_usd() -> Decimal {
    Decimal::from(1000)
}

fn default_daily_cap_usd() -> Decimal {
    Decimal::from(200)
}

const fn default_max_open_positions() -> usize {
    3
}

fn default_max_position_pct() -> f64 {
    0.01
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            seed_usd: default_seed_usd(),
            daily_cap_usd: default_daily_cap_usd(),
            max_open_positions: default_max_open_positions(),
            max_position_pct: default_max_position_pct(),
        }
    }
}

/// Market data source selection.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    /// `"sim"` is the only built-in source; production feeds plug in
    /// through the `MarketStream` port.
    #[serde(default = "default_feed_source")]
    pub source: String,
    #[serde(default)]
    pub sim: SimFeedConfig,
}

fn default_feed_source() -> String {
    "sim".to_string()
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            source: default_feed_source(),
            sim: SimFeedConfig::default(),
        }
    }
}

/// Parameters for the simulated market stream.
#[derive(Debug, Clone, Deserialize)]
pub struct SimFeedConfig {
    /// Spot tick cadence.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Constant annualized implied vol reported by the sim vol source.
    #[serde(default = "default_sim_vol")]
    pub implied_vol: f64,
    /// Random-walk step size in basis points per tick.
    #[serde(default = "default_walk_bps")]
    pub walk_bps_per_tick: f64,
    /// Quoted spread of the sim venue books.
    #[serde(default = "default_sim_spread")]
    pub spread: f64,
    /// Starting spot per asset; unlisted assets start at 100.
    #[serde(default)]
    pub start_prices: HashMap<String, f64>,
}

const fn default_tick_interval_ms() -> u64 {
    200
}

fn default_sim_vol() -> f64 {
    0.55
}

fn default_walk_bps() -> f64 {
    2.0
}

fn default_sim_spread() -> f64 {
    0.02
}

impl Default for SimFeedConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            implied_vol: default_sim_vol(),
            walk_bps_per_tick: default_walk_bps(),
            spread: default_sim_spread(),
            start_prices: HashMap::new(),
        }
    }
}

/// Order gateway selection and the dry-run switch.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// `"paper"` is the only built-in gateway; live venue clients plug in
    /// through the `OrderGateway` port.
    #[serde(default = "default_gateway")]
    pub gateway: String,
    /// Signals only: no orders are placed.
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

fn default_gateway() -> String {
    "paper".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            gateway: default_gateway(),
            dry_run: default_true(),
        }
    }
}

/// Where the status file and journals live.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let config: Self = toml::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.discovery.assets.is_empty() {
            return Err(ConfigError::MissingField {
                field: "discovery.assets",
            }
            .into());
        }
        if self.strategy.soft_edge <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "strategy.soft_edge",
                reason: "must be positive".to_string(),
            }
            .into());
        }
        if self.strategy.hard_edge < self.strategy.soft_edge {
            return Err(ConfigError::InvalidValue {
                field: "strategy.hard_edge",
                reason: "must be >= soft_edge".to_string(),
            }
            .into());
        }
        if self.risk.daily_cap_usd <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "risk.daily_cap_usd",
                reason: "must be positive".to_string(),
            }
            .into());
        }
        if self.feeds.source != "sim" {
            return Err(ConfigError::InvalidValue {
                field: "feeds.source",
                reason: format!("unknown source '{}'", self.feeds.source),
            }
            .into());
        }
        if self.execution.gateway != "paper" {
            return Err(ConfigError::InvalidValue {
                field: "execution.gateway",
                reason: format!("unknown gateway '{}'", self.execution.gateway),
            }
            .into());
        }
        Ok(())
    }

    /// Detection config for one asset, with per-asset overrides applied.
    #[must_use]
    pub fn machine_config(&self, asset: &Asset) -> MachineConfig {
        let s = &self.strategy;
        let ov = s.overrides.get(asset.as_str());
        MachineConfig {
            soft_edge: ov.and_then(|o| o.soft_edge).unwrap_or(s.soft_edge),
            hard_edge: ov.and_then(|o| o.hard_edge).unwrap_or(s.hard_edge),
            min_sustained_ms: ov
                .and_then(|o| o.min_sustained_ms)
                .unwrap_or(s.min_sustained_ms),
            price_stale_secs: s.price_stale_secs,
            vol_stale_secs: s.vol_stale_secs,
            pair_sum_band: s.pair_sum_band,
            late_window_guard_secs: s.late_window_guard_secs,
            dry_run: self.execution.dry_run,
        }
    }

    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            order_deadline_secs: self.strategy.order_deadline_secs,
            discovery_retry_secs: self.discovery.retry_secs,
            settle_grace_secs: self.discovery.settle_grace_secs,
        }
    }

    #[must_use]
    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            daily_cap_limit: self.risk.daily_cap_usd,
            max_open_positions: self.risk.max_open_positions,
            max_position_pct: self.risk.max_position_pct,
        }
    }

    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.logging.level));

        match self.logging.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}
