//! Simulation adapters: a random-walk market stream, clock-aligned window
//! discovery, and a paper order gateway.
//!
//! The sim venue is a deliberately sleepy quoter: its books sit at a 0.50
//! mid regardless of spot, so any sustained spot move produces exactly the
//! divergences the engine is built to detect.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use crate::config::SimFeedConfig;
use crate::domain::{Asset, MarketBook, MarketId, SideBook, Tick, VolSnapshot, WindowSpec};
use crate::error::{Error, VenueError};
use crate::port::{
    MarketDiscovery, MarketEvent, MarketStream, OrderGateway, OrderRequest, OrderUpdate,
    Resolution,
};

const DEFAULT_START_PRICE: f64 = 100.0;
/// Vol refreshes once per this many spot ticks.
const VOL_REFRESH_EVERY: u64 = 25;

/// Random-walk spot feed plus sleepy venue books, multiplexed into one
/// stream.
pub struct SimMarketStream {
    cfg: SimFeedConfig,
    assets: Vec<Asset>,
    prices: HashMap<Asset, f64>,
    subscribed: Vec<MarketId>,
    queue: VecDeque<MarketEvent>,
    rng: StdRng,
    ticks: u64,
    connected: bool,
}

impl SimMarketStream {
    #[must_use]
    pub fn new(cfg: SimFeedConfig, assets: Vec<Asset>) -> Self {
        let prices = assets
            .iter()
            .map(|asset| {
                let start = cfg
                    .start_prices
                    .get(asset.as_str())
                    .copied()
                    .unwrap_or(DEFAULT_START_PRICE);
                (asset.clone(), start)
            })
            .collect();
        Self {
            cfg,
            assets,
            prices,
            subscribed: Vec::new(),
            queue: VecDeque::new(),
            rng: StdRng::from_entropy(),
            ticks: 0,
            connected: false,
        }
    }

    /// Deterministic stream for tests.
    #[must_use]
    pub fn with_seed(cfg: SimFeedConfig, assets: Vec<Asset>, seed: u64) -> Self {
        let mut stream = Self::new(cfg, assets);
        stream.rng = StdRng::seed_from_u64(seed);
        stream
    }

    fn refill_queue(&mut self) {
        let now = Utc::now();
        self.ticks += 1;

        for asset in &self.assets {
            let price = self.prices.get_mut(asset).expect("price seeded per asset");
            let step = self.rng.gen_range(-1.0..=1.0) * self.cfg.walk_bps_per_tick / 10_000.0;
            *price *= 1.0 + step;

            self.queue.push_back(MarketEvent::SpotTick(Tick {
                asset: asset.clone(),
                price: *price,
                observed_at: now,
                source_latency_ms: self.rng.gen_range(1..20),
            }));

            if self.ticks % VOL_REFRESH_EVERY == 1 {
                self.queue.push_back(MarketEvent::VolUpdate(VolSnapshot {
                    asset: asset.clone(),
                    implied_vol: self.cfg.implied_vol,
                    observed_at: now,
                }));
            }
        }

        let half_spread = self.cfg.spread / 2.0;
        let side = SideBook::from_touch(0.5 - half_spread, 0.5 + half_spread);
        for market_id in &self.subscribed {
            self.queue.push_back(MarketEvent::BookUpdate {
                market_id: market_id.clone(),
                book: MarketBook::new(side, side, now),
            });
        }
    }
}

#[async_trait]
impl MarketStream for SimMarketStream {
    async fn connect(&mut self) -> Result<(), Error> {
        self.connected = true;
        self.queue.push_back(MarketEvent::Connected {
            feed: "sim".to_string(),
        });
        Ok(())
    }

    async fn subscribe(&mut self, market_ids: &[MarketId]) -> Result<(), Error> {
        self.subscribed = market_ids.to_vec();
        Ok(())
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        if !self.connected {
            return None;
        }
        if self.queue.is_empty() {
            sleep(Duration::from_millis(self.cfg.tick_interval_ms)).await;
            self.refill_queue();
        }
        self.queue.pop_front()
    }

    fn name(&self) -> &'static str {
        "sim"
    }
}

/// Clock-aligned fixed-duration window discovery.
///
/// Window boundaries fall on multiples of the duration, the way short-term
/// up/down listings roll on the venue.
pub struct SimDiscovery {
    window_duration_secs: u64,
}

impl SimDiscovery {
    #[must_use]
    pub fn new(window_duration_secs: u64) -> Self {
        Self {
            window_duration_secs,
        }
    }
}

#[async_trait]
impl MarketDiscovery for SimDiscovery {
    async fn next_window(
        &self,
        asset: &Asset,
        not_before: DateTime<Utc>,
    ) -> Result<Option<WindowSpec>, Error> {
        // First boundary at or after not_before, so back-to-back windows
        // chain without skipping the one that opens exactly at the previous
        // close.
        let dur = self.window_duration_secs as i64;
        let ts = not_before.timestamp();
        let start = ts.div_euclid(dur) * dur + if ts % dur == 0 { 0 } else { dur };
        let opens_at = DateTime::<Utc>::from_timestamp(start, 0).unwrap_or_else(Utc::now);

        Ok(Some(WindowSpec {
            asset: asset.clone(),
            market_id: MarketId::from(format!(
                "{}-updown-{}s-{}",
                asset,
                self.window_duration_secs,
                start
            )),
            opens_at,
            duration_secs: self.window_duration_secs,
        }))
    }

    async fn resolution(&self, _market_id: &MarketId) -> Result<Option<Resolution>, Error> {
        // The sim venue never publishes resolutions; the engine classifies
        // from the final observed spot.
        Ok(None)
    }
}

/// Paper order gateway: accepts everything and fills at the limit price
/// after a short latency. Rejection mode exercises the adverse paths.
pub struct PaperGateway {
    fill_latency_ms: u64,
    reject_all: AtomicBool,
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new(50)
    }
}

impl PaperGateway {
    #[must_use]
    pub fn new(fill_latency_ms: u64) -> Self {
        Self {
            fill_latency_ms,
            reject_all: AtomicBool::new(false),
        }
    }

    /// Make every subsequent submission bounce, for adverse-path tests.
    pub fn set_reject_all(&self, reject: bool) {
        self.reject_all.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn submit(
        &self,
        order: OrderRequest,
        updates: mpsc::Sender<OrderUpdate>,
    ) -> Result<(), VenueError> {
        let latency = Duration::from_millis(self.fill_latency_ms);
        let reject = self.reject_all.load(Ordering::SeqCst);

        tokio::spawn(async move {
            sleep(latency).await;
            if reject {
                let _ = updates
                    .send(OrderUpdate::Rejected {
                        trade_id: order.trade_id,
                        reason: "paper gateway rejection".to_string(),
                    })
                    .await;
                return;
            }
            let _ = updates
                .send(OrderUpdate::Accepted {
                    trade_id: order.trade_id.clone(),
                    venue_order_id: format!("paper-{}", order.trade_id),
                })
                .await;
            let _ = updates
                .send(OrderUpdate::Filled {
                    trade_id: order.trade_id,
                    price: order.price,
                    size: order.size,
                    at: Utc::now(),
                })
                .await;
        });

        Ok(())
    }

    fn name(&self) -> &'static str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, TradeId};

    #[tokio::test]
    async fn stream_yields_ticks_for_all_assets() {
        let assets = vec![Asset::from("btc"), Asset::from("eth")];
        let mut stream = SimMarketStream::with_seed(SimFeedConfig::default(), assets, 7);
        stream.connect().await.unwrap();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..16 {
            match stream.next_event().await {
                Some(MarketEvent::SpotTick(tick)) => {
                    assert!(tick.price > 0.0);
                    seen.insert(tick.asset.clone());
                }
                Some(_) => {}
                None => panic!("stream closed unexpectedly"),
            }
        }
        assert!(seen.contains(&Asset::from("btc")));
        assert!(seen.contains(&Asset::from("eth")));
    }

    #[tokio::test]
    async fn subscribed_markets_get_books() {
        let mut stream = SimMarketStream::with_seed(
            SimFeedConfig {
                tick_interval_ms: 1,
                ..SimFeedConfig::default()
            },
            vec![Asset::from("btc")],
            7,
        );
        stream.connect().await.unwrap();
        stream
            .subscribe(&[MarketId::from("btc-updown-300s-0")])
            .await
            .unwrap();

        let mut saw_book = false;
        for _ in 0..12 {
            if let Some(MarketEvent::BookUpdate { book, .. }) = stream.next_event().await {
                assert!((book.pair_sum() - 1.0).abs() < 1e-9);
                saw_book = true;
                break;
            }
        }
        assert!(saw_book);
    }

    #[tokio::test]
    async fn discovery_windows_align_to_duration() {
        let discovery = SimDiscovery::new(300);
        let not_before = DateTime::<Utc>::from_timestamp(1_700_000_123, 0).unwrap();
        let spec = discovery
            .next_window(&Asset::from("btc"), not_before)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(spec.opens_at.timestamp() % 300, 0);
        assert!(spec.opens_at > not_before);
        assert_eq!(spec.duration_secs, 300);
        assert!(spec.market_id.as_str().starts_with("btc-updown-300s-"));
    }

    #[tokio::test]
    async fn paper_gateway_accepts_then_fills() {
        let gateway = PaperGateway::new(1);
        let (tx, mut rx) = mpsc::channel(8);
        let order = OrderRequest {
            trade_id: TradeId::new(),
            market_id: MarketId::from("m"),
            side: Side::Yes,
            price: 0.51,
            size: 40.0,
        };
        gateway.submit(order.clone(), tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, OrderUpdate::Accepted { .. }));
        let second = rx.recv().await.unwrap();
        match second {
            OrderUpdate::Filled { price, size, .. } => {
                assert_eq!(price, 0.51);
                assert_eq!(size, 40.0);
            }
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn paper_gateway_rejection_mode() {
        let gateway = PaperGateway::new(1);
        gateway.set_reject_all(true);
        let (tx, mut rx) = mpsc::channel(8);
        let order = OrderRequest {
            trade_id: TradeId::new(),
            market_id: MarketId::from("m"),
            side: Side::No,
            price: 0.51,
            size: 40.0,
        };
        gateway.submit(order, tx).await.unwrap();

        let update = rx.recv().await.unwrap();
        assert!(matches!(update, OrderUpdate::Rejected { .. }));
    }
}
