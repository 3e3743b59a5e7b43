//! Venue order book tops for the YES and NO sides of a binary market.
//!
//! The engine only needs the touch: best bid, best ask, and the derived mid
//! for each side. Depth and full ladders stay inside the venue book client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Best bid/ask and mid for a single side (YES or NO) of a market.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SideBook {
    pub best_bid: f64,
    pub best_ask: f64,
    pub mid: f64,
}

impl SideBook {
    /// Build a side book from the touch, deriving the mid.
    #[must_use]
    pub fn from_touch(best_bid: f64, best_ask: f64) -> Self {
        let mid = if best_bid > 0.0 && best_ask > 0.0 {
            (best_bid + best_ask) / 2.0
        } else {
            0.0
        };
        Self {
            best_bid,
            best_ask,
            mid,
        }
    }

    /// True when both sides of the touch carry a usable quote.
    #[must_use]
    pub fn is_quoted(&self) -> bool {
        self.best_bid > 0.0 && self.best_ask > 0.0 && self.best_bid < self.best_ask
    }
}

/// Order book state for one binary market: YES side and NO side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketBook {
    pub yes: SideBook,
    pub no: SideBook,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MarketBook {
    #[must_use]
    pub fn new(yes: SideBook, no: SideBook, updated_at: DateTime<Utc>) -> Self {
        Self {
            yes,
            no,
            updated_at: Some(updated_at),
        }
    }

    /// Sum of the YES and NO mids.
    ///
    /// In a healthy market this sits near 1.0; a large deviation means a thin
    /// or desynced book and the cycle must be skipped.
    #[must_use]
    pub fn pair_sum(&self) -> f64 {
        self.yes.mid + self.no.mid
    }

    /// True when both sides are quoted and the pair sum stays within
    /// `band` of 1.0.
    #[must_use]
    pub fn is_coherent(&self, band: f64) -> bool {
        self.yes.is_quoted() && self.no.is_quoted() && (self.pair_sum() - 1.0).abs() <= band
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_derived_from_touch() {
        let side = SideBook::from_touch(0.48, 0.52);
        assert!((side.mid - 0.50).abs() < 1e-12);
        assert!(side.is_quoted());
    }

    #[test]
    fn empty_touch_has_no_mid() {
        let side = SideBook::from_touch(0.0, 0.52);
        assert_eq!(side.mid, 0.0);
        assert!(!side.is_quoted());
    }

    #[test]
    fn crossed_touch_is_not_quoted() {
        let side = SideBook::from_touch(0.55, 0.52);
        assert!(!side.is_quoted());
    }

    #[test]
    fn coherent_book_within_band() {
        let book = MarketBook::new(
            SideBook::from_touch(0.48, 0.52),
            SideBook::from_touch(0.46, 0.50),
            Utc::now(),
        );
        // pair sum = 0.50 + 0.48 = 0.98
        assert!(book.is_coherent(0.10));
        assert!(!book.is_coherent(0.01));
    }

    #[test]
    fn one_sided_book_is_incoherent() {
        let book = MarketBook::new(
            SideBook::from_touch(0.48, 0.52),
            SideBook::default(),
            Utc::now(),
        );
        assert!(!book.is_coherent(0.10));
    }
}
