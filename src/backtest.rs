//! Backtest Runner
//!
//! Replays the pricing → signal → P&L pipeline over an ordered series of
//! quotes and reduces the per-bar P&L into a [`BacktestResult`].
//!
//! # Bar marking
//!
//! - [`PnlModel::MonteCarlo`]: the bar's P&L is the mean capped P&L of the
//!   simulator's paths for that bar.
//! - [`PnlModel::Realized`]: the trade exits at the spot observed
//!   `tenor_days` bars later, with losses floored at `-stop_loss`; bars with
//!   no exit bar are dropped.
//!
//! # Determinism
//!
//! With `config.seed` set the run is reproducible bit for bit; without it each
//! run draws fresh Monte Carlo noise.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::models::{BacktestConfig, BacktestResult, PnlModel, RateQuote, TickEvaluation};
use crate::risk::{historical_var, summarize, DEFAULT_VAR_CONFIDENCE};
use crate::signal::evaluate_tick;
use crate::simulator::PnLSimulator;

// =============================================================================
// RUN CONTROL
// =============================================================================

/// Cooperative cancellation flag shared between a caller and running work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Interruption policy checked between bars.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: Option<CancelToken>,
    deadline: Option<(Instant, Duration)>,
}

impl RunControl {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Starts the clock now.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.deadline = Some((Instant::now() + budget, budget));
        self
    }

    pub fn check(&self) -> EngineResult<()> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
        }
        if let Some((deadline, budget)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(EngineError::DeadlineExceeded {
                    budget_ms: budget.as_millis() as u64,
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// RUNNER
// =============================================================================

#[derive(Debug, Clone)]
pub struct BacktestRunner {
    config: BacktestConfig,
    simulator: PnLSimulator,
}

impl BacktestRunner {
    pub fn new(config: BacktestConfig) -> EngineResult<Self> {
        let simulator = PnLSimulator::new(&config)?;
        Ok(Self { config, simulator })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn run(&self, series: &[RateQuote]) -> EngineResult<BacktestResult> {
        self.run_controlled(series, &RunControl::unbounded())
    }

    pub fn run_controlled(
        &self,
        series: &[RateQuote],
        control: &RunControl,
    ) -> EngineResult<BacktestResult> {
        let mut rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        self.run_with_rng(series, &mut rng, control)
    }

    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        series: &[RateQuote],
        rng: &mut R,
        control: &RunControl,
    ) -> EngineResult<BacktestResult> {
        if series.is_empty() {
            return Err(EngineError::EmptySeries);
        }

        debug!(
            bars = series.len(),
            model = ?self.config.pnl_model,
            threshold_bps = self.config.threshold_bps,
            "Starting backtest"
        );

        let mut bar_pnls = Vec::with_capacity(series.len());
        let mut num_trades = 0usize;

        for (index, quote) in series.iter().enumerate() {
            control.check()?;

            let eval = self.evaluate_bar(quote)?;
            let pnl = match self.config.pnl_model {
                PnlModel::MonteCarlo => self.monte_carlo_bar(&eval, rng)?,
                PnlModel::Realized => {
                    let exit_index = index + self.config.tenor_days as usize;
                    match series.get(exit_index) {
                        Some(exit) => self.realized_bar(&eval, exit.spot),
                        None => break,
                    }
                }
            };

            if eval.signal.is_actionable() {
                num_trades += 1;
            }
            bar_pnls.push(pnl);
        }

        let result = self.reduce(bar_pnls, num_trades);
        info!(
            bars = result.num_bars,
            trades = result.num_trades,
            total_pnl = result.total_pnl,
            win_rate = result.win_rate,
            max_drawdown = result.max_drawdown,
            "Backtest complete"
        );
        Ok(result)
    }

    fn evaluate_bar(&self, quote: &RateQuote) -> EngineResult<TickEvaluation> {
        let quote = quote.retenor(self.config.tenor_days);
        evaluate_tick(&quote, &self.config)
    }

    fn monte_carlo_bar<R: Rng + ?Sized>(
        &self,
        eval: &TickEvaluation,
        rng: &mut R,
    ) -> EngineResult<f64> {
        let paths = self.simulator.simulate(eval, rng)?;
        Ok(summarize(paths.map(|p| p.capped_pnl)).avg_pnl)
    }

    fn realized_bar(&self, eval: &TickEvaluation, exit_spot: f64) -> f64 {
        if !eval.signal.is_actionable() {
            return 0.0;
        }
        let raw = eval.signal.direction() * (exit_spot - eval.forward.observed)
            * self.config.notional
            - self.config.trade_cost();
        // Realized exits only floor the loss; gains run.
        raw.max(-self.config.stop_loss)
    }

    fn reduce(&self, bar_pnls: Vec<f64>, num_trades: usize) -> BacktestResult {
        let summary = summarize(bar_pnls.iter().copied());
        let (var_95, cvar_95) = historical_var(&bar_pnls, DEFAULT_VAR_CONFIDENCE);

        let equity_curve = bar_pnls
            .iter()
            .scan(0.0, |equity, pnl| {
                *equity += pnl;
                Some(*equity)
            })
            .collect();

        BacktestResult {
            total_pnl: summary.total_pnl,
            win_rate: summary.win_rate,
            avg_pnl: summary.avg_pnl,
            max_drawdown: summary.max_drawdown,
            num_bars: summary.count,
            num_trades,
            var_95,
            cvar_95,
            equity_curve,
            config: self.config.clone(),
        }
    }
}
