//! FX Arb Backend Library
//!
//! Covered-interest-parity deviation engine: forward pricing, signal
//! generation, Monte Carlo P&L, backtesting and parameter sweeps, plus the
//! live refresh loop that drives them from a rate feed.

pub mod backtest;
pub mod config;
pub mod error;
pub mod history;
pub mod live;
pub mod models;
pub mod optimizer;
pub mod rate_math;
pub mod risk;
pub mod signal;
pub mod simulator;
pub mod synthetic;


pub use backtest::{BacktestRunner, CancelToken, RunControl};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use history::{HistoryBuffer, SharedHistory};
pub use live::{AlertSink, LiveMonitor, LogAlertSink, RateFeed};
pub use models::{
    Alert, BacktestConfig, BacktestResult, DeviationSample, ForwardMode, ForwardPair, PnLPath,
    PnlModel, RateQuote, Signal, TickEvaluation,
};
pub use optimizer::{Optimizer, ParamGrid, SweepOptions, SweepParam, SweepReport};
pub use signal::evaluate_tick;
pub use simulator::PnLSimulator;
