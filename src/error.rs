use rust_decimal::Decimal;
use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

/// Market data feed errors.
///
/// Feed errors are recovered locally: detection for the affected asset is
/// suspended until the feed is healthy again. They never terminate the
/// process.
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    #[error("spot feed stale for {asset}: last tick {age_ms}ms ago")]
    StaleTick { asset: String, age_ms: u64 },

    #[error("volatility stale for {asset}: last update {age_ms}ms ago")]
    StaleVol { asset: String, age_ms: u64 },

    #[error("no volatility observed yet for {asset}")]
    MissingVol { asset: String },

    #[error("feed disconnected: {0}")]
    Disconnected(String),
}

/// Venue-side errors around order submission and the order book.
#[derive(Error, Debug)]
pub enum VenueError {
    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("order unfilled after {deadline_secs}s deadline")]
    FillTimeout { deadline_secs: u64 },

    #[error("no usable book for market {market_id}")]
    NoBook { market_id: String },

    #[error("book desync for market {market_id}: {reason}")]
    BookDesync { market_id: String, reason: String },

    #[error("submission failed: {0}")]
    SubmissionFailed(String),
}

/// Risk ledger denials.
///
/// A denial is an ordinary outcome, not a fault: the divergence episode stays
/// open and may re-request budget on a later tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskError {
    #[error("daily loss cap would be exceeded: at risk {at_risk} of cap {cap}")]
    DailyCapExceeded { at_risk: Decimal, cap: Decimal },

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("max open positions reached: {current} >= {limit}")]
    PositionLimitReached { current: usize, limit: usize },
}

/// Fair-value model input errors.
///
/// Fatal only to the single computation cycle: the affected tick is skipped
/// and previous state is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("volatility snapshot too old: {age_ms}ms > {bound_ms}ms")]
    StaleVolatility { age_ms: u64, bound_ms: u64 },

    #[error("non-positive spot price")]
    InvalidSpot,

    #[error("non-positive open price")]
    InvalidOpenPrice,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
