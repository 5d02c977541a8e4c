//! Covered-interest-parity formulas.
//!
//! Shared verbatim by the live monitor and the backtester so both price a
//! quote identically. Tenors are annualised on an ACT/360 basis.

use crate::error::{EngineError, EngineResult};
use crate::models::{BacktestConfig, ForwardMode, ForwardPair, RateQuote};

/// Money-market day-count denominator.
pub const DAY_COUNT_BASIS: f64 = 360.0;

/// Basis points per unit.
pub const BPS: f64 = 10_000.0;

/// Tenor as a year fraction.
pub fn year_fraction(tenor_days: i64) -> f64 {
    tenor_days as f64 / DAY_COUNT_BASIS
}

/// `F = S * (1 + r_dom*T) / (1 + r_for*T)`.
pub fn theoretical_forward(quote: &RateQuote) -> EngineResult<f64> {
    if !(quote.spot > 0.0 && quote.spot.is_finite()) {
        return Err(EngineError::invalid_input(format!(
            "spot must be positive, got {}",
            quote.spot
        )));
    }
    if quote.tenor_days <= 0 {
        return Err(EngineError::invalid_input(format!(
            "tenor_days must be positive, got {}",
            quote.tenor_days
        )));
    }

    let t = year_fraction(quote.tenor_days);
    let denominator = 1.0 + quote.r_for * t;
    if denominator == 0.0 {
        return Err(EngineError::invalid_input(format!(
            "degenerate foreign rate {} for {}d tenor",
            quote.r_for, quote.tenor_days
        )));
    }

    let forward = quote.spot * (1.0 + quote.r_dom * t) / denominator;
    if !(forward > 0.0 && forward.is_finite()) {
        return Err(EngineError::invalid_input(format!(
            "rate differential (r_dom={}, r_for={}) yields non-positive forward {}",
            quote.r_dom, quote.r_for, forward
        )));
    }
    Ok(forward)
}

pub fn observed_forward_manual(theo: f64, offset_bps: f64) -> f64 {
    theo * (1.0 + offset_bps / BPS)
}

pub fn observed_forward_swap_points(spot: f64, swap_pts: f64, tenor_days: i64) -> f64 {
    spot + swap_pts * year_fraction(tenor_days)
}

/// `(observed - theo) / theo` in basis points.
pub fn deviation_bps(observed: f64, theo: f64) -> EngineResult<f64> {
    if theo == 0.0 {
        return Err(EngineError::DivisionByZero {
            context: "deviation_bps",
        });
    }
    Ok((observed - theo) / theo * BPS)
}

/// Prices both forward legs for a quote under the configured mode.
pub fn forward_pair(quote: &RateQuote, config: &BacktestConfig) -> EngineResult<ForwardPair> {
    let theoretical = theoretical_forward(quote)?;
    let observed = match config.mode {
        ForwardMode::Manual => observed_forward_manual(theoretical, config.offset_bps),
        ForwardMode::SwapPoints => {
            let pts = quote.swap_pts.unwrap_or(config.swap_pts);
            observed_forward_swap_points(quote.spot, pts, quote.tenor_days)
        }
    };
    ForwardPair::new(theoretical, observed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_theoretical_forward_reference_point() {
        let quote = RateQuote::new(1.1000, 30, 0.05, 0.03);
        let theo = theoretical_forward(&quote).unwrap();
        assert!(close(theo, 1.10183, 1e-5), "theo = {}", theo);
    }

    #[test]
    fn test_manual_offset_and_deviation() {
        let quote = RateQuote::new(1.1000, 30, 0.05, 0.03);
        let theo = theoretical_forward(&quote).unwrap();
        let obs = observed_forward_manual(theo, 15.0);
        assert!(close(obs, 1.10348, 1e-5), "obs = {}", obs);
        let dev = deviation_bps(obs, theo).unwrap();
        assert!(close(dev, 15.0, 1e-9), "dev = {}", dev);
    }

    #[test]
    fn test_swap_points_forward() {
        let fwd = observed_forward_swap_points(1.2, 0.036, 30);
        assert!(close(fwd, 1.203, 1e-12));
    }

    #[test]
    fn test_identity_deviation_is_zero() {
        for theo in [0.0001, 0.9, 1.16910, 150.25] {
            assert_eq!(deviation_bps(theo, theo).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_deviation_rejects_zero_theoretical() {
        assert!(matches!(
            deviation_bps(1.0, 0.0),
            Err(EngineError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_invalid_quotes_rejected() {
        let bad_spot = RateQuote::new(0.0, 30, 0.05, 0.03);
        assert!(matches!(
            theoretical_forward(&bad_spot),
            Err(EngineError::InvalidInput { .. })
        ));

        let bad_tenor = RateQuote::new(1.1, 0, 0.05, 0.03);
        assert!(matches!(
            theoretical_forward(&bad_tenor),
            Err(EngineError::InvalidInput { .. })
        ));

        // 1 + r_for * 360/360 == 0
        let degenerate = RateQuote::new(1.1, 360, 0.05, -1.0);
        assert!(matches!(
            theoretical_forward(&degenerate),
            Err(EngineError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_forward_positive_when_foreign_rate_above_bound() {
        for tenor in [1_i64, 30, 90, 365] {
            let t = year_fraction(tenor);
            for r_for in [-1.0 / t + 1e-3, -0.5, 0.0, 0.03, 0.25] {
                for r_dom in [-0.01, 0.0, 0.05, 0.2] {
                    let quote = RateQuote::new(1.25, tenor, r_dom, r_for);
                    let theo = theoretical_forward(&quote).unwrap();
                    assert!(theo > 0.0, "tenor={} r_for={} r_dom={}", tenor, r_for, r_dom);
                }
            }
        }
    }

    #[test]
    fn test_forward_pair_modes() {
        let quote = RateQuote::new(1.1, 30, 0.05, 0.03);
        let mut cfg = BacktestConfig {
            offset_bps: 15.0,
            ..Default::default()
        };
        let manual = forward_pair(&quote, &cfg).unwrap();
        assert!(close(manual.observed, 1.10348, 1e-5));

        cfg.mode = ForwardMode::SwapPoints;
        cfg.swap_pts = 0.012;
        let pair = forward_pair(&quote, &cfg).unwrap();
        assert!(close(pair.observed, 1.101, 1e-12));

        // bar-level swap points win over the configured constant
        let quoted = quote.clone().with_swap_points(0.024);
        let pair = forward_pair(&quoted, &cfg).unwrap();
        assert!(close(pair.observed, 1.102, 1e-12));
    }

    #[test]
    fn test_forward_pair_rejects_negative_observed() {
        let quote = RateQuote::new(1.1, 30, 0.05, 0.03);
        let cfg = BacktestConfig {
            mode: ForwardMode::SwapPoints,
            swap_pts: -100.0,
            ..Default::default()
        };
        assert!(matches!(
            forward_pair(&quote, &cfg),
            Err(EngineError::InvalidInput { .. })
        ));
    }
}
