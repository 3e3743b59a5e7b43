//! Venue-agnostic domain types for the divergence engine.

mod book;
mod episode;
mod id;
mod quote;
mod tick;
mod trade;
mod window;

pub use book::{MarketBook, SideBook};
pub use episode::DivergenceEpisode;
pub use id::{Asset, MarketId, TradeId};
pub use quote::{QuoteSnapshot, Side};
pub use tick::{Tick, VolSnapshot};
pub use trade::{Outcome, Trade};
pub use window::{MarketWindow, WindowSpec, WindowState};
