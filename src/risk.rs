//! Risk reducers
//!
//! Pure folds over P&L and deviation sequences. The same reducer serves the
//! simulator (paths within one bar) and the backtester (bars within a run).

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::models::DeviationSample;

pub const DEFAULT_VAR_CONFIDENCE: f64 = 0.95;

/// Aggregate statistics over an ordered P&L sequence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PnlSummary {
    pub count: usize,
    pub total_pnl: f64,
    /// Fraction of entries with strictly positive P&L.
    pub win_rate: f64,
    pub avg_pnl: f64,
    pub max_drawdown: f64,
}

/// Running peak-to-trough tracker over a cumulative P&L curve. The peak is
/// taken from the first recorded equity point, so a loss on the first entry
/// is not a drawdown.
#[derive(Debug, Clone, Default)]
pub struct DrawdownTracker {
    equity: f64,
    peak: Option<f64>,
    max_drawdown: f64,
}

impl DrawdownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one P&L increment and returns the new cumulative equity.
    pub fn record(&mut self, pnl: f64) -> f64 {
        self.equity += pnl;
        let peak = match self.peak {
            Some(peak) if peak >= self.equity => peak,
            _ => self.equity,
        };
        self.peak = Some(peak);
        let drawdown = peak - self.equity;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }
        self.equity
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    /// Distance below the running peak; 0 before anything is recorded.
    pub fn current_drawdown(&self) -> f64 {
        self.peak.map_or(0.0, |peak| peak - self.equity)
    }
}

/// Reduces a P&L sequence in its given order.
pub fn summarize<I>(pnls: I) -> PnlSummary
where
    I: IntoIterator<Item = f64>,
{
    let mut tracker = DrawdownTracker::new();
    let mut count = 0usize;
    let mut wins = 0usize;

    for pnl in pnls {
        count += 1;
        if pnl > 0.0 {
            wins += 1;
        }
        tracker.record(pnl);
    }

    if count == 0 {
        return PnlSummary::default();
    }

    let total_pnl = tracker.equity();
    PnlSummary {
        count,
        total_pnl,
        win_rate: wins as f64 / count as f64,
        avg_pnl: total_pnl / count as f64,
        max_drawdown: tracker.max_drawdown(),
    }
}

/// Historical-simulation VaR and CVaR, reported as positive losses.
///
/// Returns `(0.0, 0.0)` for an empty sample.
pub fn historical_var(pnls: &[f64], confidence: f64) -> (f64, f64) {
    if pnls.is_empty() {
        return (0.0, 0.0);
    }
    let confidence = confidence.clamp(0.5, 0.999);

    let mut sorted: Vec<f64> = pnls.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let index = (((1.0 - confidence) * sorted.len() as f64) as usize).min(sorted.len() - 1);
    let var = -sorted[index];

    let tail = &sorted[..=index];
    let cvar = -(tail.iter().sum::<f64>() / tail.len() as f64);
    (var, cvar)
}

/// Descriptive statistics of the live deviation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationStats {
    pub count: usize,
    pub latest_bps: f64,
    pub mean_bps: f64,
    pub std_dev_bps: f64,
    pub min_bps: f64,
    pub max_bps: f64,
}

pub fn deviation_stats<'a, I>(samples: I) -> Option<DeviationStats>
where
    I: IntoIterator<Item = &'a DeviationSample>,
{
    let devs: Vec<f64> = samples.into_iter().map(|s| s.dev_bps).collect();
    let latest_bps = *devs.last()?;

    let std_dev_bps = if devs.len() > 1 {
        devs.iter().std_dev()
    } else {
        0.0
    };

    Some(DeviationStats {
        count: devs.len(),
        latest_bps,
        mean_bps: devs.iter().mean(),
        std_dev_bps,
        min_bps: devs.iter().copied().fold(f64::INFINITY, f64::min),
        max_bps: devs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}
