//! Process-wide risk ledger.
//!
//! Tracks balance, deposited seed, session/day/lifetime P&L, and enforces the
//! daily loss cap. All mutation goes through one `parking_lot::Mutex`, which
//! makes `try_reserve` the single serialization point across every asset
//! state machine: concurrent reservation attempts cannot jointly overshoot
//! the cap, because in-flight reservations count as at-risk until they are
//! settled or released.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{Trade, TradeId};
use crate::error::RiskError;

/// Lossless-enough conversion from engine floats into ledger money.
pub fn to_money(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or_default()
}

/// Risk limits applied by the ledger.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    /// Ceiling on cumulative daily loss (plus at-risk reservations).
    pub daily_cap_limit: Decimal,
    /// Maximum number of concurrently open positions across all assets.
    pub max_open_positions: usize,
    /// Fraction of balance used as the base position size.
    pub max_position_pct: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            daily_cap_limit: Decimal::from(200),
            max_open_positions: 3,
            max_position_pct: 0.01,
        }
    }
}

/// Budget grant returned by [`RiskLedger::try_reserve`].
///
/// The holder must hand it back through `settle` (trade finalized) or
/// `release` (order rejected or never placed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    trade_id: TradeId,
    amount: Decimal,
}

impl Reservation {
    #[must_use]
    pub fn trade_id(&self) -> &TradeId {
        &self.trade_id
    }

    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

/// Read-only view of the ledger for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub balance: Decimal,
    pub seed: Decimal,
    pub session_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub total_pnl: Decimal,
    pub daily_cap_limit: Decimal,
    /// Loss component of daily P&L plus at-risk reservations, as a fraction
    /// of the cap (0.0 .. 1.0+).
    pub daily_cap_used_pct: f64,
    pub open_positions: usize,
}

struct LedgerInner {
    balance: Decimal,
    seed: Decimal,
    session_pnl: Decimal,
    daily_pnl: Decimal,
    total_pnl: Decimal,
    reserved: Decimal,
    reservations: HashMap<TradeId, Decimal>,
    settled: HashSet<TradeId>,
    day: NaiveDate,
}

/// The shared ledger. Cheap to clone behind an `Arc`.
pub struct RiskLedger {
    limits: RiskLimits,
    inner: Mutex<LedgerInner>,
}

impl RiskLedger {
    /// Create a ledger seeded with the deposited bankroll.
    #[must_use]
    pub fn new(seed: Decimal, limits: RiskLimits, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            inner: Mutex::new(LedgerInner {
                balance: seed,
                seed,
                session_pnl: Decimal::ZERO,
                daily_pnl: Decimal::ZERO,
                total_pnl: Decimal::ZERO,
                reserved: Decimal::ZERO,
                reservations: HashMap::new(),
                settled: HashSet::new(),
                day: now.date_naive(),
            }),
        }
    }

    /// Atomically reserve budget for a trade with the given expected risk
    /// (full order notional - a binary position can go to zero).
    ///
    /// Denial is an ordinary outcome: the caller's divergence episode stays
    /// open and may re-request on a later tick.
    pub fn try_reserve(
        &self,
        trade_id: &TradeId,
        expected_risk: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Reservation, RiskError> {
        let mut inner = self.inner.lock();
        roll_day(&mut inner, now);

        let open = inner.reservations.len();
        if open >= self.limits.max_open_positions {
            return Err(RiskError::PositionLimitReached {
                current: open,
                limit: self.limits.max_open_positions,
            });
        }

        let available = inner.balance - inner.reserved;
        if expected_risk > available {
            return Err(RiskError::InsufficientBalance {
                needed: expected_risk,
                available,
            });
        }

        let loss_so_far = (-inner.daily_pnl).max(Decimal::ZERO);
        let at_risk = loss_so_far + inner.reserved + expected_risk;
        if at_risk > self.limits.daily_cap_limit {
            return Err(RiskError::DailyCapExceeded {
                at_risk,
                cap: self.limits.daily_cap_limit,
            });
        }

        inner.reserved += expected_risk;
        inner.reservations.insert(trade_id.clone(), expected_risk);

        Ok(Reservation {
            trade_id: trade_id.clone(),
            amount: expected_risk,
        })
    }

    /// Return a grant unused: order rejected, expired unfilled, or dry-run.
    pub fn release(&self, reservation: Reservation) {
        let mut inner = self.inner.lock();
        if let Some(amount) = inner.reservations.remove(&reservation.trade_id) {
            inner.reserved -= amount;
        }
    }

    /// Apply a finalized trade's P&L. Idempotent per trade id: a second call
    /// with the same id changes nothing.
    pub fn settle(&self, trade: &Trade, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        roll_day(&mut inner, now);

        if !inner.settled.insert(trade.id.clone()) {
            return;
        }
        if let Some(amount) = inner.reservations.remove(&trade.id) {
            inner.reserved -= amount;
        }

        let pnl = to_money(trade.pnl.unwrap_or(0.0));
        inner.balance += pnl;
        inner.session_pnl += pnl;
        inner.daily_pnl += pnl;
        inner.total_pnl += pnl;
    }

    /// Current ledger view for the status file.
    pub fn snapshot(&self, now: DateTime<Utc>) -> LedgerSnapshot {
        let mut inner = self.inner.lock();
        roll_day(&mut inner, now);

        let loss_so_far = (-inner.daily_pnl).max(Decimal::ZERO);
        let used = loss_so_far + inner.reserved;
        let used_pct = if self.limits.daily_cap_limit > Decimal::ZERO {
            (used / self.limits.daily_cap_limit).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };

        LedgerSnapshot {
            balance: inner.balance,
            seed: inner.seed,
            session_pnl: inner.session_pnl,
            daily_pnl: inner.daily_pnl,
            total_pnl: inner.total_pnl,
            daily_cap_limit: self.limits.daily_cap_limit,
            daily_cap_used_pct: used_pct,
            open_positions: inner.reservations.len(),
        }
    }

    /// Dollar size for a new position, scaled up for larger edges.
    ///
    /// Base is `balance * max_position_pct`, multiplied by `edge / 0.003`
    /// capped at 3x, and never more than 2% of balance.
    pub fn position_size(&self, edge: f64) -> f64 {
        let balance = self
            .inner
            .lock()
            .balance
            .to_f64()
            .unwrap_or(0.0)
            .max(0.0);
        let base = balance * self.limits.max_position_pct;
        let edge_mult = (edge.abs() / 0.003).min(3.0);
        (base * edge_mult).min(balance * 0.02)
    }
}

fn roll_day(inner: &mut LedgerInner, now: DateTime<Utc>) {
    let today = now.date_naive();
    if today != inner.day {
        inner.daily_pnl = Decimal::ZERO;
        inner.day = today;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, MarketId, Side};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn ledger(cap: Decimal) -> RiskLedger {
        RiskLedger::new(
            dec!(1000),
            RiskLimits {
                daily_cap_limit: cap,
                max_open_positions: 10,
                max_position_pct: 0.01,
            },
            Utc::now(),
        )
    }

    fn settled_trade(pnl: f64) -> Trade {
        let mut t = Trade::submitted(
            MarketId::from("m"),
            Asset::from("btc"),
            Side::Yes,
            0.5,
            100.0,
            0.08,
            Utc::now(),
        );
        t.settle(0.5 + pnl / 100.0);
        t
    }

    #[test]
    fn reserve_within_cap_is_granted() {
        let l = ledger(dec!(200));
        let id = TradeId::new();
        assert!(l.try_reserve(&id, dec!(20), Utc::now()).is_ok());
    }

    #[test]
    fn reserve_denied_near_cap() {
        // daily_pnl = -190 of a 200 cap; a further $20 at risk must be denied
        let l = ledger(dec!(200));
        l.settle(&settled_trade(-190.0), Utc::now());

        let denied = l.try_reserve(&TradeId::new(), dec!(20), Utc::now());
        assert!(matches!(denied, Err(RiskError::DailyCapExceeded { .. })));

        // A smaller request that fits under the cap still goes through
        assert!(l.try_reserve(&TradeId::new(), dec!(9), Utc::now()).is_ok());
    }

    #[test]
    fn in_flight_reservations_count_against_cap() {
        let l = ledger(dec!(100));
        let a = l.try_reserve(&TradeId::new(), dec!(60), Utc::now());
        assert!(a.is_ok());
        let b = l.try_reserve(&TradeId::new(), dec!(60), Utc::now());
        assert!(matches!(b, Err(RiskError::DailyCapExceeded { .. })));
    }

    #[test]
    fn release_frees_budget() {
        let l = ledger(dec!(100));
        let res = l.try_reserve(&TradeId::new(), dec!(90), Utc::now()).unwrap();
        assert!(l.try_reserve(&TradeId::new(), dec!(90), Utc::now()).is_err());
        l.release(res);
        assert!(l.try_reserve(&TradeId::new(), dec!(90), Utc::now()).is_ok());
    }

    #[test]
    fn settle_is_idempotent_per_trade_id() {
        let l = ledger(dec!(200));
        let t = settled_trade(-25.0);
        l.settle(&t, Utc::now());
        let first = l.snapshot(Utc::now());
        l.settle(&t, Utc::now());
        let second = l.snapshot(Utc::now());

        assert_eq!(first.balance, second.balance);
        assert_eq!(first.daily_pnl, second.daily_pnl);
        assert_eq!(first.total_pnl, second.total_pnl);
        assert_eq!(first.balance, dec!(975));
    }

    #[test]
    fn settle_applies_pnl_to_all_figures() {
        let l = ledger(dec!(200));
        l.settle(&settled_trade(44.0), Utc::now());
        let snap = l.snapshot(Utc::now());
        assert_eq!(snap.balance, dec!(1044));
        assert_eq!(snap.session_pnl, dec!(44));
        assert_eq!(snap.daily_pnl, dec!(44));
        assert_eq!(snap.total_pnl, dec!(44));
    }

    #[test]
    fn daily_figures_reset_on_utc_rollover() {
        let now = Utc::now();
        let l = ledger(dec!(200));
        l.settle(&settled_trade(-50.0), now);
        assert_eq!(l.snapshot(now).daily_pnl, dec!(-50));

        let tomorrow = now + Duration::days(1);
        let snap = l.snapshot(tomorrow);
        assert_eq!(snap.daily_pnl, Decimal::ZERO);
        // Session and lifetime figures survive the rollover
        assert_eq!(snap.session_pnl, dec!(-50));
        assert_eq!(snap.total_pnl, dec!(-50));
    }

    #[test]
    fn position_limit_is_enforced() {
        let l = RiskLedger::new(
            dec!(1000),
            RiskLimits {
                daily_cap_limit: dec!(500),
                max_open_positions: 1,
                max_position_pct: 0.01,
            },
            Utc::now(),
        );
        assert!(l.try_reserve(&TradeId::new(), dec!(10), Utc::now()).is_ok());
        let second = l.try_reserve(&TradeId::new(), dec!(10), Utc::now());
        assert!(matches!(second, Err(RiskError::PositionLimitReached { .. })));
    }

    #[test]
    fn insufficient_balance_is_denied() {
        let l = RiskLedger::new(dec!(10), RiskLimits::default(), Utc::now());
        let denied = l.try_reserve(&TradeId::new(), dec!(20), Utc::now());
        assert!(matches!(denied, Err(RiskError::InsufficientBalance { .. })));
    }

    #[test]
    fn position_size_scales_with_edge_and_caps() {
        let l = ledger(dec!(200));
        // balance 1000, pct 0.01 -> base $10
        let small = l.position_size(0.003);
        let large = l.position_size(0.009);
        let huge = l.position_size(0.5);
        assert!((small - 10.0).abs() < 1e-9);
        assert!((large - 20.0).abs() < 1e-9, "2% balance cap, got {large}");
        assert!((huge - 20.0).abs() < 1e-9);
    }
}
