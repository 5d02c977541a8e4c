//! Deviation → trading action.
//!
//! Thresholds are symmetric and strict: a deviation sitting exactly on
//! `±threshold_bps` is not a signal, so a quote hovering at the boundary
//! cannot flip-flop between actions.

use crate::error::{EngineError, EngineResult};
use crate::models::{BacktestConfig, RateQuote, Signal, TickEvaluation};
use crate::rate_math::{deviation_bps, forward_pair};

pub fn classify(dev_bps: f64, threshold_bps: f64) -> EngineResult<Signal> {
    if !(threshold_bps >= 0.0) {
        return Err(EngineError::invalid_config(format!(
            "threshold_bps must be >= 0, got {}",
            threshold_bps
        )));
    }

    let signal = if dev_bps > threshold_bps {
        Signal::Sell
    } else if dev_bps < -threshold_bps {
        Signal::Buy
    } else {
        Signal::None
    };
    Ok(signal)
}

/// Prices a quote and classifies its deviation. Shared by the live monitor
/// and the backtester.
pub fn evaluate_tick(quote: &RateQuote, config: &BacktestConfig) -> EngineResult<TickEvaluation> {
    let forward = forward_pair(quote, config)?;
    let dev_bps = deviation_bps(forward.observed, forward.theoretical)?;
    let signal = classify(dev_bps, config.threshold_bps)?;
    Ok(TickEvaluation {
        quote: quote.clone(),
        forward,
        dev_bps,
        signal,
    })
}

/// Whether the alert collaborator should be invoked for this signal.
pub fn should_alert(signal: Signal) -> bool {
    signal.is_actionable()
}
