//! Windvane - divergence detection and execution for short-window binary
//! outcome markets.
//!
//! The engine fuses an exchange spot feed, an implied-volatility source, and
//! a venue order book into a fair-value estimate per tracked asset, detects
//! sustained mispricing against the venue mid, executes on the mispriced
//! side, and settles at window expiry under a shared daily loss cap.
//!
//! # Architecture
//!
//! One state machine per tracked asset, each on its own update loop:
//!
//! - **[`engine::WindowMachine`]** - window lifecycle: open capture, edge
//!   computation, divergence debounce, execution trigger, settlement
//! - **[`model`]** - cash-or-nothing binary fair value
//! - **[`risk::RiskLedger`]** - the only shared-mutable resource; serialized
//!   budget reservation against the daily loss cap
//! - **[`service`]** - lifecycle events, alert/trade journals, and the
//!   status file the external dashboard polls
//! - **[`port`]** - traits for the external collaborators (feeds, discovery,
//!   order gateway); **[`adapter::sim`]** provides in-process
//!   implementations for dry-run and tests
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with per-asset threshold overrides
//! - [`domain`] - windows, ticks, books, quotes, episodes, trades
//! - [`error`] - error taxonomy: config, feed, venue, risk, model
//! - [`app`] - channel wiring and task orchestration

pub mod adapter;
pub mod app;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod model;
pub mod port;
pub mod risk;
pub mod service;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
