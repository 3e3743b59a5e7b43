//! Adapter implementations of the external-collaborator ports.
//!
//! Production exchange, volatility, venue, and discovery clients live
//! outside this crate; the `sim` adapters here drive the engine end-to-end
//! in dry-run mode and under test.

pub mod sim;

pub use sim::{PaperGateway, SimDiscovery, SimMarketStream};
