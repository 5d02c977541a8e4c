//! Integration tests for the deviation engine
//!
//! Exercise the public library surface end to end (pricing → signal →
//! backtest → sweep) and the `fxarb` binary against temporary config files.

use std::fs;
use std::process::Command;

use fxarb_backend::config::EngineConfig;
use fxarb_backend::models::{
    BacktestConfig, BacktestResult, ForwardMode, PnlModel, RateQuote, Signal,
};
use fxarb_backend::optimizer::{Optimizer, ParamGrid};
use fxarb_backend::synthetic::{generate, SyntheticSpec};
use fxarb_backend::{evaluate_tick, BacktestRunner, DeviationSample, EngineError, HistoryBuffer};

fn fxarb() -> Command {
    Command::new(env!("CARGO_BIN_EXE_fxarb"))
}

fn reference_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.market.r_dom = 0.05;
    cfg.market.r_for = 0.03;
    cfg.strategy.offset_bps = 15.0;
    cfg.strategy.threshold_bps = 5.0;
    cfg.strategy.num_paths = 50;
    cfg.strategy.seed = Some(7);
    cfg
}

// =============================================================================
// LIBRARY
// =============================================================================

#[test]
fn test_reference_quote_end_to_end() {
    let cfg = reference_config();
    let eval = evaluate_tick(&cfg.quote(1.1000), &cfg.strategy).unwrap();
    assert!((eval.forward.theoretical - 1.10183).abs() < 1e-5);
    assert!((eval.forward.observed - 1.10348).abs() < 1e-5);
    assert!((eval.dev_bps - 15.0).abs() < 1e-6);
    assert_eq!(eval.signal, Signal::Sell);
}

#[test]
fn test_history_window_tracks_live_ticks() {
    let cfg = reference_config();
    let mut history = HistoryBuffer::default();
    for i in 0..60 {
        let eval = evaluate_tick(&cfg.quote(1.1 + i as f64 * 1e-4), &cfg.strategy).unwrap();
        history.push(DeviationSample {
            timestamp: chrono::Utc::now(),
            dev_bps: eval.dev_bps,
            observed_forward: eval.forward.observed,
        });
    }
    assert_eq!(history.len(), 50);
    let forwards = history.forward_series();
    assert!(forwards.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_synthetic_backtest_in_swap_points_mode() {
    let series = generate(&SyntheticSpec::default(), 3).unwrap();
    let config = BacktestConfig {
        mode: ForwardMode::SwapPoints,
        threshold_bps: 2.0,
        num_paths: 100,
        seed: Some(3),
        ..Default::default()
    };
    let result = BacktestRunner::new(config.clone()).unwrap().run(&series).unwrap();
    assert_eq!(result.num_bars, series.len());
    assert_eq!(result.equity_curve.len(), series.len());
    assert!(result.num_trades > 0);
    assert!((0.0..=1.0).contains(&result.win_rate));
    assert!(result.max_drawdown >= 0.0);
    let last = *result.equity_curve.last().unwrap();
    assert!((last - result.total_pnl).abs() < 1e-6);

    let realized = BacktestRunner::new(BacktestConfig {
        pnl_model: PnlModel::Realized,
        ..config
    })
    .unwrap()
    .run(&series)
    .unwrap();
    assert_eq!(realized.num_bars, series.len() - 30);
}

#[test]
fn test_sweep_over_synthetic_series() {
    let spec = SyntheticSpec {
        bars: 60,
        ..Default::default()
    };
    let series = generate(&spec, 11).unwrap();
    let base = BacktestConfig {
        mode: ForwardMode::SwapPoints,
        num_paths: 30,
        seed: Some(11),
        ..Default::default()
    };
    let results = Optimizer::new(base)
        .sweep(&ParamGrid::reference(), &series)
        .unwrap();
    assert_eq!(results.len(), 36);
    assert!(results
        .windows(2)
        .all(|w| w[0].total_pnl >= w[1].total_pnl));

    let empty = ParamGrid::new().axis("threshold_bps", vec![]).unwrap();
    assert!(Optimizer::new(BacktestConfig::default())
        .sweep(&empty, &series)
        .unwrap()
        .is_empty());
}

#[test]
fn test_empty_series_rejected() {
    let runner = BacktestRunner::new(BacktestConfig::default()).unwrap();
    assert_eq!(runner.run(&[]), Err(EngineError::EmptySeries));
}

// =============================================================================
// CONFIG FILES
// =============================================================================

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fxarb.toml");

    let cfg = reference_config();
    cfg.save(&path).unwrap();
    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, cfg);
}

#[test]
fn test_invalid_config_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[strategy]\nnum_paths = 0\n").unwrap();
    assert!(EngineConfig::load(&path).is_err());
    assert!(EngineConfig::load(dir.path().join("missing.toml")).is_err());
}

// =============================================================================
// BINARY
// =============================================================================

#[test]
fn test_cli_evaluate_reports_signal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fxarb.toml");
    reference_config().save(&path).unwrap();

    let output = fxarb()
        .arg("--config")
        .arg(&path)
        .args(["evaluate", "--spot", "1.1"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1.10183"));
    assert!(stdout.contains("+15.00 bps"));
    assert!(stdout.contains("Rich → Sell forward"));
}

#[test]
fn test_cli_backtest_json() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("fxarb.toml");
    reference_config().save(&config_path).unwrap();

    let series: Vec<RateQuote> = (0..20)
        .map(|i| RateQuote::new(1.1 + i as f64 * 1e-4, 30, 0.05, 0.03))
        .collect();
    let series_path = dir.path().join("series.json");
    fs::write(&series_path, serde_json::to_string(&series).unwrap()).unwrap();

    let output = fxarb()
        .arg("--config")
        .arg(&config_path)
        .args(["backtest", "--json", "--series"])
        .arg(&series_path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let result: BacktestResult = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result.num_bars, 20);
    assert_eq!(result.num_trades, 20);
    assert_eq!(result.config.threshold_bps, 5.0);
}

#[test]
fn test_cli_rejects_negative_threshold() {
    let output = fxarb()
        .env_remove("FXARB_CONFIG")
        .args(["--threshold-bps=-1", "evaluate", "--spot", "1.1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
