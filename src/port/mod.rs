//! Ports for the external collaborators.
//!
//! The engine core never talks to an exchange, volatility source, venue, or
//! listing API directly. Each collaborator is a trait here; production
//! adapters live outside this crate's scope and the `adapter::sim` module
//! provides in-process implementations for dry-run and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::domain::{Asset, MarketBook, MarketId, Side, Tick, TradeId, VolSnapshot, WindowSpec};
use crate::error::{Error, VenueError};

/// Events delivered by a market data stream.
///
/// Spot ticks, volatility refreshes, and venue book updates are independent,
/// unsynchronized sources; the stream multiplexes whatever arrives first.
#[derive(Debug, Clone)]
pub enum MarketEvent {
    /// Normalized spot tick, already de-duplicated and monotonic per asset.
    SpotTick(Tick),
    /// Implied-volatility refresh for one asset.
    VolUpdate(VolSnapshot),
    /// Venue order book update for one market.
    BookUpdate {
        market_id: MarketId,
        book: MarketBook,
    },
    /// A feed came (back) up.
    Connected { feed: String },
    /// A feed dropped; the engine suspends detection until it returns.
    Disconnected { feed: String, reason: String },
}

/// Real-time market data stream.
///
/// Implementations own connection management and protocol parsing for their
/// sources; the engine only sees [`MarketEvent`]s.
#[async_trait]
pub trait MarketStream: Send {
    /// Connect to the underlying sources.
    async fn connect(&mut self) -> Result<(), Error>;

    /// Restrict venue book updates to the given markets.
    ///
    /// Called whenever a window opens or closes; superseded subscriptions
    /// are dropped by the implementation.
    async fn subscribe(&mut self, market_ids: &[MarketId]) -> Result<(), Error>;

    /// Receive the next event. Returns `None` when the stream is closed
    /// for good.
    async fn next_event(&mut self) -> Option<MarketEvent>;

    /// Source name for logging.
    fn name(&self) -> &'static str;
}

/// Outcome of a resolved market window, reported by the venue.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub market_id: MarketId,
    pub winning_side: Side,
    pub resolved_at: DateTime<Utc>,
}

/// Resolves the active (or next) fixed-duration market per asset.
#[async_trait]
pub trait MarketDiscovery: Send + Sync {
    /// The next window for `asset` opening at or after `not_before`.
    ///
    /// Returns `None` when the venue currently lists nothing for the asset;
    /// the caller retries after a backoff.
    async fn next_window(
        &self,
        asset: &Asset,
        not_before: DateTime<Utc>,
    ) -> Result<Option<WindowSpec>, Error>;

    /// Venue-reported resolution for an expired window, if available yet.
    async fn resolution(&self, market_id: &MarketId) -> Result<Option<Resolution>, Error>;
}

/// An order to submit on the mispriced side of a window.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub trade_id: TradeId,
    pub market_id: MarketId,
    pub side: Side,
    /// Limit price in the side's own price space (0..1).
    pub price: f64,
    /// Shares to buy.
    pub size: f64,
}

/// Asynchronous order lifecycle notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderUpdate {
    Accepted {
        trade_id: TradeId,
        venue_order_id: String,
    },
    Filled {
        trade_id: TradeId,
        price: f64,
        size: f64,
        at: DateTime<Utc>,
    },
    Rejected {
        trade_id: TradeId,
        reason: String,
    },
}

impl OrderUpdate {
    #[must_use]
    pub fn trade_id(&self) -> &TradeId {
        match self {
            Self::Accepted { trade_id, .. }
            | Self::Filled { trade_id, .. }
            | Self::Rejected { trade_id, .. } => trade_id,
        }
    }
}

/// Order submission client for the venue.
///
/// Submission is fire-and-forget: `submit` returns once the order is handed
/// to the venue client, and acceptance/fill/rejection arrive later on the
/// `updates` channel. In-flight orders cannot be cancelled; the engine waits
/// for confirmation or its own deadline.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn submit(
        &self,
        order: OrderRequest,
        updates: mpsc::Sender<OrderUpdate>,
    ) -> Result<(), VenueError>;

    /// Gateway name for logging.
    fn name(&self) -> &'static str;
}
