//! Parameter Sweep Optimizer
//!
//! Exhaustive grid search over [`BacktestConfig`] fields.
//!
//! # Design Principles
//!
//! 1. **Lazy grid**: cells are decoded from their index on demand, so a large
//!    grid never materialises its Cartesian product.
//! 2. **Independent cells**: each cell builds its own runner and RNG; nothing
//!    is shared between cells, so rayon may evaluate them in any order.
//! 3. **Bounded cells**: a per-configuration budget and a global cancel token
//!    are checked between bars; interrupted cells are reported, not fatal.
//! 4. **Stable ranking**: `total_pnl` desc, then `max_drawdown` asc, then
//!    enumeration order.

use anyhow::{bail, Context};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::backtest::{BacktestRunner, CancelToken, RunControl};
use crate::error::{EngineError, EngineResult};
use crate::models::{BacktestConfig, BacktestResult, RateQuote};

// =============================================================================
// SWEEP PARAMETERS
// =============================================================================

/// A sweepable [`BacktestConfig`] field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepParam {
    ThresholdBps,
    OffsetBps,
    SwapPts,
    SpreadBps,
    StopLoss,
    TenorDays,
    Notional,
    NumPaths,
    ShockVol,
}

impl SweepParam {
    pub const ALL: [SweepParam; 9] = [
        SweepParam::ThresholdBps,
        SweepParam::OffsetBps,
        SweepParam::SwapPts,
        SweepParam::SpreadBps,
        SweepParam::StopLoss,
        SweepParam::TenorDays,
        SweepParam::Notional,
        SweepParam::NumPaths,
        SweepParam::ShockVol,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SweepParam::ThresholdBps => "threshold_bps",
            SweepParam::OffsetBps => "offset_bps",
            SweepParam::SwapPts => "swap_pts",
            SweepParam::SpreadBps => "spread_bps",
            SweepParam::StopLoss => "stop_loss",
            SweepParam::TenorDays => "tenor_days",
            SweepParam::Notional => "notional",
            SweepParam::NumPaths => "num_paths",
            SweepParam::ShockVol => "shock_vol",
        }
    }

    /// Writes `value` into the matching config field. Integer fields require
    /// a positive whole number.
    pub fn apply(&self, cfg: &mut BacktestConfig, value: f64) -> EngineResult<()> {
        match self {
            SweepParam::ThresholdBps => cfg.threshold_bps = value,
            SweepParam::OffsetBps => cfg.offset_bps = value,
            SweepParam::SwapPts => cfg.swap_pts = value,
            SweepParam::SpreadBps => cfg.spread_bps = value,
            SweepParam::StopLoss => cfg.stop_loss = value,
            SweepParam::Notional => cfg.notional = value,
            SweepParam::ShockVol => cfg.shock_vol = value,
            SweepParam::TenorDays => cfg.tenor_days = positive_whole(self, value)? as i64,
            SweepParam::NumPaths => cfg.num_paths = positive_whole(self, value)? as usize,
        }
        Ok(())
    }
}

fn positive_whole(param: &SweepParam, value: f64) -> EngineResult<u64> {
    if value.is_finite() && value >= 1.0 && value.fract() == 0.0 {
        Ok(value as u64)
    } else {
        Err(EngineError::invalid_config(format!(
            "{} must be a positive whole number, got {}",
            param.as_str(),
            value
        )))
    }
}

impl FromStr for SweepParam {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SweepParam::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| EngineError::invalid_config(format!("unknown sweep parameter '{}'", s)))
    }
}

impl std::fmt::Display for SweepParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PARAMETER GRID
// =============================================================================

/// One axis of the sweep: a parameter and its candidate values, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    pub name: SweepParam,
    pub values: Vec<f64>,
}

/// Ordered axes whose Cartesian product is the search space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    #[serde(default)]
    axes: Vec<GridAxis>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an axis by parameter name.
    pub fn axis(self, name: &str, values: Vec<f64>) -> EngineResult<Self> {
        let param = name.parse::<SweepParam>()?;
        self.with_axis(param, values)
    }

    /// Appends an axis. Fails on a repeated parameter or when the grid would
    /// have more cells than `usize` can index.
    pub fn with_axis(mut self, name: SweepParam, values: Vec<f64>) -> EngineResult<Self> {
        if self.axes.iter().any(|a| a.name == name) {
            return Err(EngineError::invalid_config(format!(
                "duplicate sweep axis '{}'",
                name
            )));
        }
        self.axes.push(GridAxis { name, values });
        self.len()?;
        Ok(self)
    }

    pub fn from_pairs<I, S>(pairs: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: AsRef<str>,
    {
        pairs
            .into_iter()
            .try_fold(Self::new(), |grid, (name, values)| grid.axis(name.as_ref(), values))
    }

    /// The threshold / stop-loss / spread grid of the reference research
    /// notebook, with stop-losses of 2, 5 and 10 bps on a 1M notional.
    pub fn reference() -> Self {
        Self {
            axes: vec![
                GridAxis {
                    name: SweepParam::ThresholdBps,
                    values: vec![0.5, 1.0, 2.0, 3.0],
                },
                GridAxis {
                    name: SweepParam::StopLoss,
                    values: vec![200.0, 500.0, 1_000.0],
                },
                GridAxis {
                    name: SweepParam::SpreadBps,
                    values: vec![0.1, 0.5, 1.0],
                },
            ],
        }
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let grid: Self = toml::from_str(raw).context("Failed to parse sweep grid")?;
        let mut seen = HashSet::new();
        for axis in &grid.axes {
            if !seen.insert(axis.name) {
                bail!("duplicate sweep axis '{}'", axis.name);
            }
        }
        grid.len()?;
        Ok(grid)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sweep grid {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    /// Number of cells. A grid with no axes has one cell (the base config);
    /// any empty axis empties the whole grid. A product past `usize::MAX` is
    /// `InvalidConfig`.
    pub fn len(&self) -> EngineResult<usize> {
        self.axes.iter().try_fold(1usize, |acc, axis| {
            acc.checked_mul(axis.values.len()).ok_or_else(|| {
                EngineError::invalid_config(format!(
                    "sweep grid overflows at axis '{}' ({} values)",
                    axis.name,
                    axis.values.len()
                ))
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.len(), Ok(0))
    }

    /// Decodes cell `index` in mixed radix, last axis varying fastest.
    /// `None` when out of range or the grid size is not representable.
    pub fn combination(&self, index: usize) -> Option<Vec<(SweepParam, f64)>> {
        if index >= self.len().ok()? {
            return None;
        }
        let mut remainder = index;
        let mut combo = Vec::with_capacity(self.axes.len());
        for axis in self.axes.iter().rev() {
            let n = axis.values.len();
            combo.push((axis.name, axis.values[remainder % n]));
            remainder /= n;
        }
        combo.reverse();
        Some(combo)
    }

    pub fn iter(&self) -> EngineResult<GridIter<'_>> {
        Ok(GridIter {
            grid: self,
            next: 0,
            len: self.len()?,
        })
    }

    /// `base` with cell `index`'s overrides applied.
    pub fn config_for(&self, base: &BacktestConfig, index: usize) -> EngineResult<BacktestConfig> {
        let combo = self.combination(index).ok_or_else(|| {
            EngineError::invalid_config(format!("grid cell {} out of range", index))
        })?;
        let mut cfg = base.clone();
        for (param, value) in combo {
            param.apply(&mut cfg, value)?;
        }
        Ok(cfg)
    }
}

/// Lazy iterator over grid cells in enumeration order.
pub struct GridIter<'a> {
    grid: &'a ParamGrid,
    next: usize,
    len: usize,
}

impl<'a> Iterator for GridIter<'a> {
    type Item = Vec<(SweepParam, f64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len {
            return None;
        }
        let combo = self.grid.combination(self.next);
        self.next += 1;
        combo
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.next;
        (remaining, Some(remaining))
    }
}

// =============================================================================
// SWEEP
// =============================================================================

#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Budget per configuration; cells over budget are skipped.
    pub per_config_timeout: Option<Duration>,
    pub cancel: CancelToken,
    pub parallel: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            per_config_timeout: None,
            cancel: CancelToken::new(),
            parallel: true,
        }
    }
}

/// A grid cell that was interrupted rather than evaluated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedCell {
    pub index: usize,
    pub overrides: Vec<(SweepParam, f64)>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Ranked best first.
    pub results: Vec<BacktestResult>,
    pub skipped: Vec<SkippedCell>,
}

impl SweepReport {
    pub fn top(&self, n: usize) -> &[BacktestResult] {
        &self.results[..n.min(self.results.len())]
    }
}

/// Sorts best first. Stable, so equal keys keep enumeration order.
pub fn rank(results: &mut [BacktestResult]) {
    results.sort_by(|a, b| {
        b.total_pnl
            .total_cmp(&a.total_pnl)
            .then(a.max_drawdown.total_cmp(&b.max_drawdown))
    });
}

#[derive(Debug, Clone)]
pub struct Optimizer {
    base: BacktestConfig,
}

impl Optimizer {
    /// `base` supplies every field the grid does not override, including the
    /// seed: a seeded base gives every cell the same random draws.
    pub fn new(base: BacktestConfig) -> Self {
        Self { base }
    }

    pub fn sweep(
        &self,
        grid: &ParamGrid,
        series: &[RateQuote],
    ) -> EngineResult<Vec<BacktestResult>> {
        Ok(self.sweep_with(grid, series, &SweepOptions::default())?.results)
    }

    pub fn sweep_with(
        &self,
        grid: &ParamGrid,
        series: &[RateQuote],
        options: &SweepOptions,
    ) -> EngineResult<SweepReport> {
        let cells = grid.len()?;
        if cells == 0 {
            info!("Sweep grid is empty, nothing to evaluate");
            return Ok(SweepReport::default());
        }
        if series.is_empty() {
            return Err(EngineError::EmptySeries);
        }

        info!(
            cells,
            bars = series.len(),
            parallel = options.parallel,
            "Starting parameter sweep"
        );

        let evaluate = |index: usize| (index, self.run_cell(grid, index, series, options));
        let outcomes: Vec<(usize, EngineResult<BacktestResult>)> = if options.parallel {
            (0..cells).into_par_iter().map(evaluate).collect()
        } else {
            (0..cells).map(evaluate).collect()
        };

        let mut report = SweepReport::default();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(result) => report.results.push(result),
                Err(err) if err.is_interruption() => {
                    let overrides = grid.combination(index).unwrap_or_default();
                    warn!(index, error = %err, "Sweep cell skipped");
                    report.skipped.push(SkippedCell {
                        index,
                        overrides,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        rank(&mut report.results);
        if let Some(best) = report.results.first() {
            info!(
                evaluated = report.results.len(),
                skipped = report.skipped.len(),
                best_total_pnl = best.total_pnl,
                best_threshold_bps = best.config.threshold_bps,
                "Sweep complete"
            );
        }
        Ok(report)
    }

    fn run_cell(
        &self,
        grid: &ParamGrid,
        index: usize,
        series: &[RateQuote],
        options: &SweepOptions,
    ) -> EngineResult<BacktestResult> {
        if options.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let config = grid.config_for(&self.base, index)?;
        let runner = BacktestRunner::new(config)?;

        let mut control = RunControl::unbounded().with_cancel(options.cancel.clone());
        if let Some(budget) = options.per_config_timeout {
            control = control.with_budget(budget);
        }
        runner.run_controlled(series, &control)
    }
}
