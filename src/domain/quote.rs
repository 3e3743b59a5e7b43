//! Derived quote state: fair value vs. venue mid, per side.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::book::MarketBook;

/// Which side of the binary market a signal or trade targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// Snapshot of model vs. market, recomputed on every tick. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub current_move_pct: f64,
    pub fair_yes: f64,
    pub fair_no: f64,
    pub clob_yes_mid: f64,
    pub clob_no_mid: f64,
    /// Signed, in price units: `fair_yes - clob_yes_mid`.
    pub edge_yes: f64,
    pub edge_no: f64,
}

impl QuoteSnapshot {
    /// Assemble a snapshot from the fair pair and the venue book.
    #[must_use]
    pub fn assemble(move_pct: f64, fair_yes: f64, fair_no: f64, book: &MarketBook) -> Self {
        Self {
            current_move_pct: move_pct,
            fair_yes,
            fair_no,
            clob_yes_mid: book.yes.mid,
            clob_no_mid: book.no.mid,
            edge_yes: fair_yes - book.yes.mid,
            edge_no: fair_no - book.no.mid,
        }
    }

    /// The side with the larger absolute edge; exact ties resolve to YES
    /// deterministically for reproducibility.
    #[must_use]
    pub fn dominant_side(&self) -> Side {
        if self.edge_no.abs() > self.edge_yes.abs() {
            Side::No
        } else {
            Side::Yes
        }
    }

    /// Absolute edge on the given side.
    #[must_use]
    pub fn edge(&self, side: Side) -> f64 {
        match side {
            Side::Yes => self.edge_yes,
            Side::No => self.edge_no,
        }
    }

    /// Largest absolute edge across both sides.
    #[must_use]
    pub fn max_abs_edge(&self) -> f64 {
        self.edge_yes.abs().max(self.edge_no.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::book::SideBook;
    use chrono::Utc;

    fn book(yes_mid: f64, no_mid: f64) -> MarketBook {
        MarketBook::new(
            SideBook::from_touch(yes_mid - 0.01, yes_mid + 0.01),
            SideBook::from_touch(no_mid - 0.01, no_mid + 0.01),
            Utc::now(),
        )
    }

    #[test]
    fn edges_are_signed() {
        let q = QuoteSnapshot::assemble(0.003, 0.62, 0.38, &book(0.50, 0.50));
        assert!((q.edge_yes - 0.12).abs() < 1e-9);
        assert!((q.edge_no + 0.12).abs() < 1e-9);
    }

    #[test]
    fn dominant_side_picks_larger_abs_edge() {
        let q = QuoteSnapshot::assemble(0.0, 0.55, 0.45, &book(0.50, 0.60));
        // edge_yes = 0.05, edge_no = -0.15
        assert_eq!(q.dominant_side(), Side::No);
        assert!((q.max_abs_edge() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn exact_tie_prefers_yes() {
        let q = QuoteSnapshot::assemble(0.0, 0.60, 0.40, &book(0.50, 0.50));
        // edge_yes = 0.10, edge_no = -0.10
        assert_eq!(q.dominant_side(), Side::Yes);
    }
}
