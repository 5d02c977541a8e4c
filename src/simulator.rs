//! Monte Carlo P&L of holding the forward to maturity.
//!
//! Single-step model: `spot_T = spot * exp(shock)` with
//! `shock ~ N(0, shock_vol * sqrt(T))`. Paths are independent and the random
//! source is always injected, so a fixed seed reproduces a run exactly.
//!
//! Aggregate statistics are not computed here; feed the paths into
//! [`crate::risk::summarize`].

use rand::distributions::Distribution;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use statrs::distribution::Normal;

use crate::error::{EngineError, EngineResult};
use crate::models::{BacktestConfig, PnLPath, Signal, TickEvaluation};
use crate::rate_math::year_fraction;

#[derive(Debug, Clone)]
pub struct PnLSimulator {
    num_paths: usize,
    notional: f64,
    cost: f64,
    stop_loss: f64,
    shock_vol: f64,
}

/// Per-evaluation inputs shared by every path.
#[derive(Debug, Clone)]
struct PathPricer {
    spot: f64,
    observed: f64,
    direction: f64,
    traded: bool,
    notional: f64,
    cost: f64,
    stop_loss: f64,
    /// `None` when the shock has zero variance.
    shock: Option<Normal>,
}

impl PathPricer {
    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match &self.shock {
            Some(normal) => normal.sample(rng),
            None => 0.0,
        }
    }

    fn price(&self, path_id: usize, shock: f64) -> PnLPath {
        let terminal_spot = self.spot * shock.exp();
        if !self.traded {
            return PnLPath {
                path_id,
                terminal_spot,
                raw_pnl: 0.0,
                capped_pnl: 0.0,
            };
        }
        let raw_pnl =
            self.direction * (terminal_spot - self.observed) * self.notional - self.cost;
        PnLPath {
            path_id,
            terminal_spot,
            raw_pnl,
            capped_pnl: raw_pnl.clamp(-self.stop_loss, self.stop_loss),
        }
    }
}

impl PnLSimulator {
    pub fn new(config: &BacktestConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            num_paths: config.num_paths,
            notional: config.notional,
            cost: config.trade_cost(),
            stop_loss: config.stop_loss,
            shock_vol: config.shock_vol,
        })
    }

    pub fn num_paths(&self) -> usize {
        self.num_paths
    }

    fn pricer(&self, eval: &TickEvaluation) -> EngineResult<PathPricer> {
        let sigma = self.shock_vol * year_fraction(eval.quote.tenor_days).sqrt();
        let shock = if sigma > 0.0 {
            let normal = Normal::new(0.0, sigma).map_err(|e| {
                EngineError::invalid_config(format!("shock distribution (sigma={}): {}", sigma, e))
            })?;
            Some(normal)
        } else {
            None
        };

        Ok(PathPricer {
            spot: eval.quote.spot,
            observed: eval.forward.observed,
            direction: eval.signal.direction(),
            traded: eval.signal != Signal::None,
            notional: self.notional,
            cost: self.cost,
            stop_loss: self.stop_loss,
            shock,
        })
    }

    /// Lazily draws exactly `num_paths` paths from `rng`.
    pub fn simulate<'r, R: Rng + ?Sized>(
        &self,
        eval: &TickEvaluation,
        rng: &'r mut R,
    ) -> EngineResult<PathIter<'r, R>> {
        Ok(PathIter {
            pricer: self.pricer(eval)?,
            rng,
            next_id: 0,
            num_paths: self.num_paths,
        })
    }

    /// Parallel variant: path `i` uses ChaCha stream `i` of `seed`, so the
    /// output does not depend on thread scheduling.
    pub fn simulate_par(&self, eval: &TickEvaluation, seed: u64) -> EngineResult<Vec<PnLPath>> {
        let pricer = self.pricer(eval)?;
        let paths = (0..self.num_paths)
            .into_par_iter()
            .map(|path_id| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(path_id as u64);
                let shock = pricer.draw(&mut rng);
                pricer.price(path_id, shock)
            })
            .collect();
        Ok(paths)
    }
}

/// Finite iterator over simulated paths.
pub struct PathIter<'r, R: Rng + ?Sized> {
    pricer: PathPricer,
    rng: &'r mut R,
    next_id: usize,
    num_paths: usize,
}

impl<'r, R: Rng + ?Sized> Iterator for PathIter<'r, R> {
    type Item = PnLPath;

    fn next(&mut self) -> Option<PnLPath> {
        if self.next_id >= self.num_paths {
            return None;
        }
        let path_id = self.next_id;
        self.next_id += 1;
        let shock = self.pricer.draw(&mut *self.rng);
        Some(self.pricer.price(path_id, shock))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.num_paths - self.next_id;
        (remaining, Some(remaining))
    }
}

impl<'r, R: Rng + ?Sized> ExactSizeIterator for PathIter<'r, R> {}
