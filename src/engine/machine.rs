//! Per-asset window state machine.
//!
//! Owns the lifecycle of a single active market window: open capture,
//! continuous edge computation, divergence detection with sustained-duration
//! debounce, execution trigger, fill tracking, and settlement.
//!
//! The machine is synchronous and free of I/O. Callers feed it market data
//! and order/expiry events with explicit timestamps; it returns the lifecycle
//! events to emit and, when an execution triggers, the order to submit. This
//! keeps every transition testable with synthetic inputs.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    Asset, DivergenceEpisode, MarketBook, MarketWindow, QuoteSnapshot, Side, Tick, Trade,
    VolSnapshot, WindowSpec, WindowState,
};
use crate::model;
use crate::port::{OrderRequest, OrderUpdate, Resolution};
use crate::risk::{to_money, Reservation, RiskLedger};
use crate::service::event::EngineEvent;
use crate::service::status::WindowStatus;

/// Detection and execution parameters for one asset's machine.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Soft threshold: absolute edge that opens a divergence episode.
    pub soft_edge: f64,
    /// Hard threshold: peak absolute edge required to execute.
    pub hard_edge: f64,
    /// Minimum time the edge must stay above the soft threshold.
    pub min_sustained_ms: u64,
    /// Spot tick older than this marks the feed down.
    pub price_stale_secs: u64,
    /// Vol snapshot older than this suspends fair-value computation.
    pub vol_stale_secs: u64,
    /// Allowed deviation of `yes_mid + no_mid` from 1.0.
    pub pair_sum_band: f64,
    /// No execution may trigger closer to expiry than this.
    pub late_window_guard_secs: u64,
    /// Signals only: reservations are exercised then released, no orders.
    pub dry_run: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            soft_edge: 0.05,
            hard_edge: 0.08,
            min_sustained_ms: 3_000,
            price_stale_secs: 10,
            vol_stale_secs: 120,
            pair_sum_band: 0.10,
            late_window_guard_secs: 15,
            dry_run: true,
        }
    }
}

/// Result of feeding one input into the machine.
#[derive(Debug, Default)]
pub struct Update {
    pub events: Vec<EngineEvent>,
    /// Order to submit, when an execution triggered this cycle.
    pub order: Option<OrderRequest>,
    /// Trade finalized this cycle, already applied to the ledger.
    pub settled: Option<Trade>,
}

impl Update {
    fn event(mut self, event: EngineEvent) -> Self {
        self.events.push(event);
        self
    }
}

pub struct WindowMachine {
    asset: Asset,
    cfg: MachineConfig,
    ledger: Arc<RiskLedger>,
    state: WindowState,
    window: Option<MarketWindow>,
    episode: Option<DivergenceEpisode>,
    trade: Option<Trade>,
    reservation: Option<Reservation>,
    last_quote: Option<QuoteSnapshot>,
    /// False while any input feed is stale or down; blocks new episodes.
    detection_enabled: bool,
}

impl WindowMachine {
    #[must_use]
    pub fn new(asset: Asset, cfg: MachineConfig, ledger: Arc<RiskLedger>) -> Self {
        Self {
            asset,
            cfg,
            ledger,
            state: WindowState::Idle,
            window: None,
            episode: None,
            trade: None,
            reservation: None,
            last_quote: None,
            detection_enabled: true,
        }
    }

    #[must_use]
    pub fn state(&self) -> WindowState {
        self.state
    }

    #[must_use]
    pub fn window(&self) -> Option<&MarketWindow> {
        self.window.as_ref()
    }

    #[must_use]
    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    /// Open a new window, capturing the current spot as the strike.
    ///
    /// A missing or non-positive spot skips the window: the machine stays
    /// idle and the caller moves on to the next one.
    pub fn open_window(&mut self, spec: WindowSpec, spot: Option<&Tick>, now: DateTime<Utc>) -> Update {
        debug_assert_eq!(self.state, WindowState::Idle);
        let Some(tick) = spot else {
            return Update::default();
        };
        if tick.price <= 0.0 || tick.is_stale(now, self.cfg.price_stale_secs) {
            return Update::default();
        }

        let window = MarketWindow::open(spec, tick.price, now);
        let event = EngineEvent::WindowOpened {
            asset: self.asset.clone(),
            market_id: window.market_id.clone(),
            open_price: window.open_price,
            at: now,
        };
        self.window = Some(window);
        self.state = WindowState::Monitoring;
        self.last_quote = None;

        Update::default().event(event)
    }

    /// Recompute the quote and run divergence detection on fresh market data.
    ///
    /// Processes one fused observation: the latest tick, vol snapshot, and
    /// book for this asset's window. Superseded inputs must not be queued by
    /// the caller.
    pub fn on_market_data(
        &mut self,
        tick: Option<&Tick>,
        vol: Option<&VolSnapshot>,
        book: Option<&MarketBook>,
        now: DateTime<Utc>,
    ) -> Update {
        let mut update = Update::default();

        if !matches!(
            self.state,
            WindowState::Monitoring
                | WindowState::Divergence
                | WindowState::Executing
                | WindowState::Filled
        ) {
            return update;
        }

        // Feed health gates detection, never open risk.
        let Some(tick) = tick else {
            self.suspend_detection(&mut update, "spot", 0, now);
            return update;
        };
        if tick.is_stale(now, self.cfg.price_stale_secs) {
            let age = tick.age(now).num_milliseconds().max(0) as u64;
            self.suspend_detection(&mut update, "spot", age, now);
            return update;
        }
        let Some(vol) = vol else {
            self.suspend_detection(&mut update, "vol", 0, now);
            return update;
        };
        if vol.is_stale(now, self.cfg.vol_stale_secs) {
            let age = (now - vol.observed_at).num_milliseconds().max(0) as u64;
            self.suspend_detection(&mut update, "vol", age, now);
            return update;
        }
        self.detection_enabled = true;

        let (open_price, market_id, time_remaining) = match self.window.as_ref() {
            Some(w) => (w.open_price, w.market_id.clone(), w.time_remaining_secs(now)),
            None => return update,
        };

        // Model errors are fatal to this cycle only: skip, keep state.
        let fair = match model::fair_value(tick.price, open_price, vol.implied_vol, time_remaining)
        {
            Ok(fv) => fv,
            Err(_) => return update,
        };

        let Some(book) = book else {
            self.decay_episode(&mut update, now);
            return update;
        };
        if !book.is_coherent(self.cfg.pair_sum_band) {
            // Thin or desynced book: unobservable edge breaks episode continuity.
            self.decay_episode(&mut update, now);
            return update;
        }

        let move_pct = (tick.price - open_price) / open_price;
        let quote = QuoteSnapshot::assemble(move_pct, fair.yes, fair.no, book);
        self.last_quote = Some(quote);

        if !matches!(
            self.state,
            WindowState::Monitoring | WindowState::Divergence
        ) {
            // Position in flight or held: quotes only feed the status surface.
            return update;
        }

        if quote.max_abs_edge() <= self.cfg.soft_edge {
            self.decay_episode(&mut update, now);
            return update;
        }

        let side = quote.dominant_side();
        let edge = quote.edge(side);
        self.track_episode(&mut update, side, edge, now);

        let graduated = self.episode.as_ref().is_some_and(|ep| {
            ep.is_sustained(now, self.cfg.min_sustained_ms)
                && ep.best_edge_seen >= self.cfg.hard_edge
        });
        if !graduated {
            return update;
        }

        if time_remaining <= self.cfg.late_window_guard_secs as f64 {
            return update;
        }

        let ask = match side {
            Side::Yes => book.yes.best_ask,
            Side::No => book.no.best_ask,
        };
        if ask <= 0.0 || ask >= 1.0 {
            return update;
        }

        let size_usd = self.ledger.position_size(edge);
        let shares = size_usd / ask;
        if shares <= 0.0 {
            return update;
        }

        let trade = Trade::submitted(
            market_id.clone(),
            self.asset.clone(),
            side,
            ask,
            shares,
            edge,
            now,
        );

        match self
            .ledger
            .try_reserve(&trade.id, to_money(trade.notional()), now)
        {
            Ok(reservation) => {
                update.events.push(EngineEvent::Executing {
                    asset: self.asset.clone(),
                    market_id: trade.market_id.clone(),
                    side,
                    price: ask,
                    size: shares,
                    edge,
                    dry_run: self.cfg.dry_run,
                    at: now,
                });

                if self.cfg.dry_run {
                    // Signals only: hand the budget straight back and keep
                    // watching. The episode is consumed so one divergence
                    // produces one signal.
                    self.ledger.release(reservation);
                    self.episode = None;
                    self.state = WindowState::Monitoring;
                } else {
                    update.order = Some(OrderRequest {
                        trade_id: trade.id.clone(),
                        market_id: trade.market_id.clone(),
                        side,
                        price: ask,
                        size: shares,
                    });
                    self.reservation = Some(reservation);
                    self.trade = Some(trade);
                    self.episode = None;
                    self.state = WindowState::Executing;
                }
            }
            Err(denial) => {
                // Episode stays open; the machine re-requests on later ticks.
                update.events.push(EngineEvent::RiskDenied {
                    asset: self.asset.clone(),
                    market_id,
                    reason: denial.to_string(),
                    at: now,
                });
            }
        }

        update
    }

    /// Apply an asynchronous order notification from the venue gateway.
    pub fn on_order_update(&mut self, notice: OrderUpdate, now: DateTime<Utc>) -> Update {
        let mut update = Update::default();
        if self.state != WindowState::Executing {
            return update;
        }
        let Some(trade) = self.trade.as_mut() else {
            return update;
        };

        match notice {
            OrderUpdate::Accepted { .. } => {}
            OrderUpdate::Filled {
                price, size, at, ..
            } => {
                // Partial fills shrink the position; the remainder is not chased.
                if size > 0.0 && size < trade.size {
                    trade.size = size;
                }
                trade.mark_filled(price, at);
                self.state = WindowState::Filled;
                update.events.push(EngineEvent::Filled {
                    asset: self.asset.clone(),
                    market_id: trade.market_id.clone(),
                    side: trade.side,
                    price,
                    size: trade.size,
                    latency_ms: trade.fill_latency_ms().unwrap_or(0),
                    at: now,
                });
            }
            OrderUpdate::Rejected { reason, .. } => {
                update.events.push(EngineEvent::VenueError {
                    asset: self.asset.clone(),
                    market_id: trade.market_id.clone(),
                    reason,
                    at: now,
                });
                self.settle_void(&mut update, now);
            }
        }

        update
    }

    /// The order deadline elapsed without a fill confirmation.
    pub fn on_order_deadline(&mut self, deadline_secs: u64, now: DateTime<Utc>) -> Update {
        let mut update = Update::default();
        if self.state != WindowState::Executing {
            return update;
        }
        if let Some(trade) = self.trade.as_ref() {
            update.events.push(EngineEvent::VenueError {
                asset: self.asset.clone(),
                market_id: trade.market_id.clone(),
                reason: format!("order unfilled after {deadline_secs}s deadline"),
                at: now,
            });
        }
        self.settle_void(&mut update, now);
        update
    }

    /// The window reached its close timestamp (or an explicit resolution
    /// arrived). Settles any held position and ends the window.
    pub fn on_expiry(
        &mut self,
        resolution: Option<&Resolution>,
        final_spot: Option<f64>,
        now: DateTime<Utc>,
    ) -> Update {
        let mut update = Update::default();
        let Some(window) = self.window.as_ref() else {
            return update;
        };
        let market_id = window.market_id.clone();
        let open_price = window.open_price;

        if self.episode.is_some() {
            self.decay_episode(&mut update, now);
        }

        match self.state {
            WindowState::Executing => {
                // Unfilled at the close: no position was established.
                update.events.push(EngineEvent::VenueError {
                    asset: self.asset.clone(),
                    market_id: market_id.clone(),
                    reason: "window expired with order unfilled".to_string(),
                    at: now,
                });
                self.settle_void(&mut update, now);
            }
            WindowState::Filled => {
                let winning = resolution.map(|r| r.winning_side).unwrap_or_else(|| {
                    // No venue resolution by the close: classify from the
                    // market's own settlement condition. A dead-flat tie
                    // resolves NO, matching the venue's "strictly above" rule.
                    match final_spot {
                        Some(spot) if spot > open_price => Side::Yes,
                        _ => Side::No,
                    }
                });
                let trade = self.trade.as_mut().expect("trade present while filled");
                let exit = if trade.side == winning { 1.0 } else { 0.0 };
                trade.settle(exit);
                let trade = self.trade.take().expect("trade present while filled");
                self.ledger.settle(&trade, now);
                self.release_reservation();

                let event = if trade.pnl.unwrap_or(0.0) >= 0.0 {
                    EngineEvent::Converged {
                        trade: trade.clone(),
                        at: now,
                    }
                } else {
                    EngineEvent::Adverse {
                        trade: trade.clone(),
                        at: now,
                    }
                };
                update.events.push(event);
                update.settled = Some(trade);
                self.state = WindowState::Settled;
            }
            _ => {
                self.state = WindowState::Settled;
            }
        }

        if let (Some(window), Some(spot)) = (self.window.as_ref(), final_spot) {
            update.events.push(EngineEvent::WindowClosed {
                asset: self.asset.clone(),
                market_id: window.market_id.clone(),
                move_pct: window.move_pct(spot),
                at: now,
            });
        }

        update
    }

    /// Return to idle after settlement, ready for the next discovery cycle.
    pub fn reset(&mut self) {
        debug_assert_eq!(self.state, WindowState::Settled);
        self.window = None;
        self.episode = None;
        self.trade = None;
        self.last_quote = None;
        self.release_reservation();
        self.state = WindowState::Idle;
    }

    /// Snapshot for the status file; `None` while idle.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> Option<WindowStatus> {
        let window = self.window.as_ref()?;
        let quote = self.last_quote;
        Some(WindowStatus {
            asset: self.asset.to_string(),
            market_id: window.market_id.to_string(),
            state: self.state.to_string(),
            open_price: window.open_price,
            current_move_pct: quote.map_or(0.0, |q| q.current_move_pct),
            time_remaining_sec: window.time_remaining_secs(now),
            fair_yes: quote.map_or(0.0, |q| q.fair_yes),
            fair_no: quote.map_or(0.0, |q| q.fair_no),
            clob_yes_mid: quote.map_or(0.0, |q| q.clob_yes_mid),
            clob_no_mid: quote.map_or(0.0, |q| q.clob_no_mid),
            edge_yes: quote.map_or(0.0, |q| q.edge_yes),
            edge_no: quote.map_or(0.0, |q| q.edge_no),
            divergence_open: self.episode.is_some(),
            divergence_since: self
                .episode
                .as_ref()
                .map(|ep| ep.opened_at.timestamp_millis() as f64 / 1000.0),
        })
    }

    fn track_episode(&mut self, update: &mut Update, side: Side, edge: f64, now: DateTime<Utc>) {
        match self.episode.as_ref().map(|ep| ep.side == side) {
            Some(true) => {
                if let Some(ep) = self.episode.as_mut() {
                    ep.extend(edge);
                }
            }
            Some(false) => {
                // The mispricing flipped sides: the old episode's continuity
                // is broken, a fresh one starts timing from now.
                self.decay_episode(update, now);
                self.start_episode(update, side, edge, now);
            }
            None => self.start_episode(update, side, edge, now),
        }
    }

    fn start_episode(&mut self, update: &mut Update, side: Side, edge: f64, now: DateTime<Utc>) {
        let market_id = self
            .window
            .as_ref()
            .map(|w| w.market_id.clone())
            .expect("window present while monitoring");
        self.episode = Some(DivergenceEpisode::open(side, edge, now));
        self.state = WindowState::Divergence;
        update.events.push(EngineEvent::DivergenceOpened {
            asset: self.asset.clone(),
            market_id,
            side,
            edge,
            at: now,
        });
    }

    fn decay_episode(&mut self, update: &mut Update, now: DateTime<Utc>) {
        if let Some(ep) = self.episode.take() {
            let market_id = self
                .window
                .as_ref()
                .map(|w| w.market_id.clone())
                .unwrap_or_else(|| "unknown".into());
            update.events.push(EngineEvent::DivergenceDecayed {
                asset: self.asset.clone(),
                market_id,
                side: ep.side,
                peak_edge: ep.best_edge_seen,
                duration_ms: ep.duration(now).num_milliseconds().max(0) as u64,
                at: now,
            });
            if self.state == WindowState::Divergence {
                self.state = WindowState::Monitoring;
            }
        }
    }

    fn suspend_detection(
        &mut self,
        update: &mut Update,
        feed: &str,
        age_ms: u64,
        now: DateTime<Utc>,
    ) {
        self.decay_episode(update, now);
        if self.detection_enabled {
            self.detection_enabled = false;
            update.events.push(EngineEvent::FeedStale {
                asset: self.asset.clone(),
                feed: feed.to_string(),
                age_ms,
                at: now,
            });
        }
    }

    /// Settle with zero realized size: rejected or never-filled order.
    fn settle_void(&mut self, update: &mut Update, now: DateTime<Utc>) {
        if let Some(mut trade) = self.trade.take() {
            trade.void();
            self.ledger.settle(&trade, now);
            update.events.push(EngineEvent::Adverse {
                trade: trade.clone(),
                at: now,
            });
            update.settled = Some(trade);
        }
        self.release_reservation();
        self.state = WindowState::Settled;
    }

    fn release_reservation(&mut self) {
        if let Some(reservation) = self.reservation.take() {
            self.ledger.release(reservation);
        }
    }
}
