//! Synthetic market data.
//!
//! A seeded stand-in for the broker feed: spot follows a multiplicative
//! uniform walk and each bar carries swap points whose implied forward sits a
//! random few bps away from parity. Used for offline backtests and to drive
//! the live loop without network access.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::live::RateFeed;
use crate::models::RateQuote;
use crate::rate_math::{theoretical_forward, year_fraction, BPS};

/// 2024-01-01T00:00:00Z
const SYNTHETIC_EPOCH_SECS: i64 = 1_704_067_200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSpec {
    pub start_spot: f64,
    pub bars: usize,
    /// Max absolute relative spot move per bar.
    pub daily_shock: f64,
    pub r_dom: f64,
    pub r_for: f64,
    pub tenor_days: i64,
    /// Max absolute deviation of the quoted forward from parity.
    pub swap_noise_bps: f64,
    pub start: DateTime<Utc>,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            start_spot: 1.10,
            bars: 250,
            daily_shock: 0.005,
            r_dom: 0.025,
            r_for: 0.005,
            tenor_days: 30,
            swap_noise_bps: 5.0,
            start: Utc
                .timestamp_opt(SYNTHETIC_EPOCH_SECS, 0)
                .single()
                .unwrap_or_default(),
        }
    }
}

impl SyntheticSpec {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.start_spot > 0.0 && self.start_spot.is_finite()) {
            return Err(EngineError::invalid_config(format!(
                "start_spot must be positive, got {}",
                self.start_spot
            )));
        }
        if !(0.0..1.0).contains(&self.daily_shock) {
            return Err(EngineError::invalid_config(format!(
                "daily_shock must be in [0, 1), got {}",
                self.daily_shock
            )));
        }
        if !(self.swap_noise_bps >= 0.0 && self.swap_noise_bps.is_finite()) {
            return Err(EngineError::invalid_config(format!(
                "swap_noise_bps must be >= 0, got {}",
                self.swap_noise_bps
            )));
        }
        if self.tenor_days <= 0 {
            return Err(EngineError::invalid_config(format!(
                "tenor_days must be > 0, got {}",
                self.tenor_days
            )));
        }
        Ok(())
    }
}

/// The random process behind both [`generate`] and [`SyntheticFeed`].
#[derive(Debug, Clone)]
struct QuoteProcess {
    spec: SyntheticSpec,
    rng: ChaCha8Rng,
    spot: f64,
    bar: i64,
}

impl QuoteProcess {
    fn new(spec: SyntheticSpec, seed: u64) -> EngineResult<Self> {
        spec.validate()?;
        Ok(Self {
            spot: spec.start_spot,
            rng: ChaCha8Rng::seed_from_u64(seed),
            bar: 0,
            spec,
        })
    }

    fn next_quote(&mut self) -> EngineResult<RateQuote> {
        let spec = &self.spec;
        if self.bar > 0 {
            let shock = self.rng.gen_range(-spec.daily_shock..=spec.daily_shock);
            self.spot *= 1.0 + shock;
        }

        let quote = RateQuote::new(self.spot, spec.tenor_days, spec.r_dom, spec.r_for)
            .with_timestamp(spec.start + Duration::days(self.bar));
        let theo = theoretical_forward(&quote)?;
        let noise = self
            .rng
            .gen_range(-spec.swap_noise_bps..=spec.swap_noise_bps);
        let quoted_forward = theo * (1.0 + noise / BPS);
        let swap_pts = (quoted_forward - self.spot) / year_fraction(spec.tenor_days);

        self.bar += 1;
        Ok(quote.with_swap_points(swap_pts))
    }
}

/// `spec.bars` daily quotes, reproducible from `seed`.
pub fn generate(spec: &SyntheticSpec, seed: u64) -> EngineResult<Vec<RateQuote>> {
    let mut process = QuoteProcess::new(spec.clone(), seed)?;
    (0..spec.bars).map(|_| process.next_quote()).collect()
}

/// Unbounded [`RateFeed`] over the same process as [`generate`].
#[derive(Debug, Clone)]
pub struct SyntheticFeed {
    process: QuoteProcess,
}

impl SyntheticFeed {
    pub fn new(spec: SyntheticSpec, seed: u64) -> EngineResult<Self> {
        Ok(Self {
            process: QuoteProcess::new(spec, seed)?,
        })
    }
}

#[async_trait]
impl RateFeed for SyntheticFeed {
    async fn next_quote(&mut self) -> Result<RateQuote, EngineError> {
        self.process
            .next_quote()
            .map_err(|e| EngineError::upstream(format!("synthetic feed: {}", e)))
    }
}
