use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::rate_math::BPS;

/// Market inputs for one evaluation (a refresh tick or a historical bar).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub spot: f64,
    pub tenor_days: i64,
    pub r_dom: f64,
    pub r_for: f64,
    /// Market-quoted swap points for this bar, preferred over the configured
    /// constant in swap-points mode.
    #[serde(default)]
    pub swap_pts: Option<f64>,
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

impl RateQuote {
    pub fn new(spot: f64, tenor_days: i64, r_dom: f64, r_for: f64) -> Self {
        Self {
            spot,
            tenor_days,
            r_dom,
            r_for,
            swap_pts: None,
            as_of: None,
        }
    }

    pub fn with_swap_points(mut self, swap_pts: f64) -> Self {
        self.swap_pts = Some(swap_pts);
        self
    }

    pub fn with_timestamp(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// Same market state priced at a different tenor.
    pub fn retenor(&self, tenor_days: i64) -> Self {
        Self {
            tenor_days,
            ..self.clone()
        }
    }
}

/// Theoretical (CIP) and observed forward for one quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwardPair {
    pub theoretical: f64,
    pub observed: f64,
}

impl ForwardPair {
    pub fn new(theoretical: f64, observed: f64) -> EngineResult<Self> {
        if !(theoretical > 0.0 && theoretical.is_finite()) {
            return Err(EngineError::invalid_input(format!(
                "theoretical forward must be positive, got {}",
                theoretical
            )));
        }
        if !(observed > 0.0 && observed.is_finite()) {
            return Err(EngineError::invalid_input(format!(
                "observed forward must be positive, got {}",
                observed
            )));
        }
        Ok(Self {
            theoretical,
            observed,
        })
    }
}

/// One entry of the live deviation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationSample {
    pub timestamp: DateTime<Utc>,
    pub dev_bps: f64,
    pub observed_forward: f64,
}

/// Trading action for a deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Forward is cheap: buy forward / sell spot.
    Buy,
    /// Forward is rich: sell forward / buy spot.
    Sell,
    None,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::None => "none",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Signal::Buy => "Cheap → Buy forward",
            Signal::Sell => "Rich → Sell forward",
            Signal::None => "No arbitrage",
        }
    }

    /// Position sign applied to `(spot_T - observed)`.
    pub fn direction(&self) -> f64 {
        match self {
            Signal::Buy => 1.0,
            Signal::Sell => -1.0,
            Signal::None => 0.0,
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, Signal::None)
    }
}

impl std::ops::Neg for Signal {
    type Output = Signal;

    fn neg(self) -> Signal {
        match self {
            Signal::Buy => Signal::Sell,
            Signal::Sell => Signal::Buy,
            Signal::None => Signal::None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the observed forward is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardMode {
    /// Theoretical forward shifted by `offset_bps`.
    #[default]
    Manual,
    /// Spot plus annualised swap points.
    SwapPoints,
}

/// How a backtest bar is marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PnlModel {
    /// Mean capped P&L over simulated terminal spots.
    #[default]
    MonteCarlo,
    /// Exit at the spot observed `tenor_days` bars later.
    Realized,
}

/// One simulated outcome of holding the forward to maturity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PnLPath {
    pub path_id: usize,
    pub terminal_spot: f64,
    pub raw_pnl: f64,
    pub capped_pnl: f64,
}

/// Strategy parameters. Fully determines a backtest run and is the point
/// type of the optimizer's search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub threshold_bps: f64,
    pub mode: ForwardMode,
    pub offset_bps: f64,
    pub swap_pts: f64,
    pub spread_bps: f64,
    /// Absolute P&L cap per trade, in account currency.
    pub stop_loss: f64,
    pub tenor_days: i64,
    pub notional: f64,
    pub num_paths: usize,
    /// Annualised volatility of the terminal spot shock.
    pub shock_vol: f64,
    pub seed: Option<u64>,
    pub pnl_model: PnlModel,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            threshold_bps: 1.0,
            mode: ForwardMode::Manual,
            offset_bps: 0.0,
            swap_pts: 0.0,
            spread_bps: 0.5,
            stop_loss: 500.0,
            tenor_days: 30,
            notional: 1_000_000.0,
            num_paths: 500,
            shock_vol: 0.05,
            seed: None,
            pnl_model: PnlModel::MonteCarlo,
        }
    }
}

impl BacktestConfig {
    /// Stop-loss expressed in bps of notional, as the dashboard quotes it.
    pub fn stop_loss_from_bps(stop_loss_bps: f64, notional: f64) -> f64 {
        stop_loss_bps / BPS * notional
    }

    /// Spread cost charged per trade.
    pub fn trade_cost(&self) -> f64 {
        self.spread_bps / BPS * self.notional
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.threshold_bps >= 0.0) {
            return Err(EngineError::invalid_config(format!(
                "threshold_bps must be >= 0, got {}",
                self.threshold_bps
            )));
        }
        if self.num_paths == 0 {
            return Err(EngineError::invalid_config("num_paths must be > 0"));
        }
        if !(self.notional > 0.0 && self.notional.is_finite()) {
            return Err(EngineError::invalid_config(format!(
                "notional must be > 0, got {}",
                self.notional
            )));
        }
        if self.tenor_days <= 0 {
            return Err(EngineError::invalid_config(format!(
                "tenor_days must be > 0, got {}",
                self.tenor_days
            )));
        }
        if !(self.stop_loss >= 0.0) {
            return Err(EngineError::invalid_config(format!(
                "stop_loss must be >= 0, got {}",
                self.stop_loss
            )));
        }
        if !(self.spread_bps >= 0.0) {
            return Err(EngineError::invalid_config(format!(
                "spread_bps must be >= 0, got {}",
                self.spread_bps
            )));
        }
        if !(self.shock_vol >= 0.0 && self.shock_vol.is_finite()) {
            return Err(EngineError::invalid_config(format!(
                "shock_vol must be finite and >= 0, got {}",
                self.shock_vol
            )));
        }
        if !self.offset_bps.is_finite() || !self.swap_pts.is_finite() {
            return Err(EngineError::invalid_config(
                "offset_bps and swap_pts must be finite",
            ));
        }
        Ok(())
    }
}

/// Aggregate outcome of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub total_pnl: f64,
    pub win_rate: f64,
    pub avg_pnl: f64,
    /// Largest peak-to-trough decline of the cumulative P&L curve.
    pub max_drawdown: f64,
    pub num_bars: usize,
    pub num_trades: usize,
    /// 95% historical VaR of per-bar P&L (positive = loss).
    pub var_95: f64,
    pub cvar_95: f64,
    pub equity_curve: Vec<f64>,
    pub config: BacktestConfig,
}

/// Output of a single live or replayed evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickEvaluation {
    pub quote: RateQuote,
    pub forward: ForwardPair,
    pub dev_bps: f64,
    pub signal: Signal,
}

/// Payload handed to the alert-delivery collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub pair: String,
    pub signal: Signal,
    pub dev_bps: f64,
    pub threshold_bps: f64,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn message(&self) -> String {
        format!(
            "Arb alert: {} {:+.2}bps → {}",
            self.pair,
            self.dev_bps,
            self.signal.description()
        )
    }
}
