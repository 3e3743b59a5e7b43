//! Tests for the risk ledger under concurrent reservation pressure.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Barrier;
use windvane::domain::{Asset, MarketId, Side, Trade, TradeId};
use windvane::risk::{RiskLedger, RiskLimits};

fn ledger(cap: Decimal, max_positions: usize) -> Arc<RiskLedger> {
    Arc::new(RiskLedger::new(
        dec!(1000),
        RiskLimits {
            daily_cap_limit: cap,
            max_open_positions: max_positions,
            max_position_pct: 0.01,
        },
        Utc::now(),
    ))
}

fn losing_trade(loss: f64) -> Trade {
    let mut t = Trade::submitted(
        MarketId::from("m"),
        Asset::from("btc"),
        Side::Yes,
        0.5,
        loss / 0.5,
        0.08,
        Utc::now(),
    );
    t.settle(0.0);
    t
}

/// Concurrent reservations from many simulated assets must never jointly
/// push the at-risk total past the daily cap.
#[tokio::test]
async fn concurrent_reservations_cannot_overshoot_daily_cap() {
    const TASKS: usize = 8;
    // Cap of $100 with $60 requests: at most one grant is arithmetically
    // possible, no matter how the tasks interleave.
    let ledger = ledger(dec!(100), TASKS);
    let barrier = Arc::new(Barrier::new(TASKS));

    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let ledger = Arc::clone(&ledger);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            ledger
                .try_reserve(&TradeId::new(), dec!(60), Utc::now())
                .is_ok()
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }

    assert_eq!(granted, 1, "exactly one $60 grant fits under a $100 cap");

    let snap = ledger.snapshot(Utc::now());
    assert!(
        snap.daily_cap_used_pct <= 1.0,
        "cap usage {} exceeds 100%",
        snap.daily_cap_used_pct
    );
}

/// The spec scenario: $200 cap, daily P&L at -$190, a $20 request is denied.
#[tokio::test]
async fn reservation_denied_when_cap_nearly_exhausted() {
    let ledger = ledger(dec!(200), 8);
    ledger.settle(&losing_trade(190.0), Utc::now());

    let snap = ledger.snapshot(Utc::now());
    assert_eq!(snap.daily_pnl, dec!(-190));
    assert!((snap.daily_cap_used_pct - 0.95).abs() < 1e-9);

    let denied = ledger.try_reserve(&TradeId::new(), dec!(20), Utc::now());
    assert!(denied.is_err());
}

/// Settling the same trade twice moves the ledger only once.
#[tokio::test]
async fn settlement_is_idempotent() {
    let ledger = ledger(dec!(200), 8);
    let trade = losing_trade(40.0);

    ledger.settle(&trade, Utc::now());
    let after_first = ledger.snapshot(Utc::now());
    ledger.settle(&trade, Utc::now());
    let after_second = ledger.snapshot(Utc::now());

    assert_eq!(after_first.balance, after_second.balance);
    assert_eq!(after_first.daily_pnl, after_second.daily_pnl);
    assert_eq!(after_first.total_pnl, after_second.total_pnl);
    assert_eq!(after_first.balance.to_f64().unwrap(), 960.0);
}

/// A released reservation frees its budget for other assets.
#[tokio::test]
async fn release_returns_budget_to_the_pool() {
    let ledger = ledger(dec!(100), 8);

    let held = ledger
        .try_reserve(&TradeId::new(), dec!(80), Utc::now())
        .unwrap();
    assert!(ledger
        .try_reserve(&TradeId::new(), dec!(40), Utc::now())
        .is_err());

    ledger.release(held);
    assert!(ledger
        .try_reserve(&TradeId::new(), dec!(40), Utc::now())
        .is_ok());
}
