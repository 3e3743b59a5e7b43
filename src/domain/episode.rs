//! Divergence episodes: the debounce object behind "sustained mispricing".
//!
//! An episode exists only while the edge has been continuously above the soft
//! threshold. It either decays (edge falls back below threshold before the
//! sustained-duration requirement) or graduates into an execution.

use chrono::{DateTime, Duration, Utc};

use super::quote::Side;

#[derive(Debug, Clone, PartialEq)]
pub struct DivergenceEpisode {
    pub side: Side,
    pub opened_at: DateTime<Utc>,
    pub best_edge_seen: f64,
}

impl DivergenceEpisode {
    /// Open a new episode at `now` with the initially observed edge.
    #[must_use]
    pub fn open(side: Side, edge: f64, now: DateTime<Utc>) -> Self {
        Self {
            side,
            opened_at: now,
            best_edge_seen: edge.abs(),
        }
    }

    /// Record another above-threshold observation, tracking the peak.
    pub fn extend(&mut self, edge: f64) {
        let edge = edge.abs();
        if edge > self.best_edge_seen {
            self.best_edge_seen = edge;
        }
    }

    /// How long the edge has been continuously above threshold.
    #[must_use]
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        now - self.opened_at
    }

    /// True once the episode has lasted at least `min_sustained_ms`.
    #[must_use]
    pub fn is_sustained(&self, now: DateTime<Utc>, min_sustained_ms: u64) -> bool {
        self.duration(now) >= Duration::milliseconds(min_sustained_ms as i64)
    }
}
