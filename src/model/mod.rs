//! Cash-or-nothing binary fair value.
//!
//! Converts spot move, implied volatility, and time remaining into a YES/NO
//! fair probability pair:
//!
//! ```text
//! d2 = (ln(spot/open) - 0.5·sigma²·T) / (sigma·sqrt(T))
//! fair_yes = Phi(d2),  fair_no = 1 - fair_yes
//! ```
//!
//! with `T` the time remaining in years. Degenerate inputs (`T <= 0` or
//! `sigma <= 0`) return the limit price instead of dividing by zero.

use crate::error::ModelError;

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// Fair probability pair for a binary market. `yes + no == 1` by construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairValue {
    pub yes: f64,
    pub no: f64,
}

impl FairValue {
    fn from_yes(yes: f64) -> Self {
        Self { yes, no: 1.0 - yes }
    }
}

/// Price the YES/NO pair for a window with strike `open_price`.
///
/// `time_remaining_secs` may be fractional; negative values are treated as
/// expired and return the degenerate limit. Volatility staleness is the
/// caller's responsibility - this function only sees the scalar.
pub fn fair_value(
    spot: f64,
    open_price: f64,
    implied_vol: f64,
    time_remaining_secs: f64,
) -> Result<FairValue, ModelError> {
    if spot <= 0.0 || !spot.is_finite() {
        return Err(ModelError::InvalidSpot);
    }
    if open_price <= 0.0 || !open_price.is_finite() {
        return Err(ModelError::InvalidOpenPrice);
    }

    let t_years = time_remaining_secs / SECONDS_PER_YEAR;

    if t_years <= 0.0 || implied_vol <= 0.0 {
        return Ok(FairValue::from_yes(degenerate_yes(spot, open_price)));
    }

    let vol_sqrt_t = implied_vol * t_years.sqrt();
    let d2 = ((spot / open_price).ln() - 0.5 * implied_vol * implied_vol * t_years) / vol_sqrt_t;

    Ok(FairValue::from_yes(norm_cdf(d2)))
}

/// Limit price when time or volatility has run out: the outcome is decided
/// by where spot sits relative to the strike.
fn degenerate_yes(spot: f64, open_price: f64) -> f64 {
    if spot > open_price {
        1.0
    } else if spot < open_price {
        0.0
    } else {
        0.5
    }
}

/// Standard normal CDF via the error function.
fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz and Stegun error function approximation (7.1.26).
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}
