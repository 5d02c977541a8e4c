//! fxarb: covered-interest-parity monitor, backtester and optimizer.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fxarb_backend::backtest::{BacktestRunner, CancelToken};
use fxarb_backend::config::EngineConfig;
use fxarb_backend::live::{LiveMonitor, LogAlertSink};
use fxarb_backend::models::{BacktestResult, PnlModel, RateQuote};
use fxarb_backend::optimizer::{Optimizer, ParamGrid, SweepOptions};
use fxarb_backend::risk::{deviation_stats, historical_var, summarize, DEFAULT_VAR_CONFIDENCE};
use fxarb_backend::signal::evaluate_tick;
use fxarb_backend::simulator::PnLSimulator;
use fxarb_backend::synthetic::{generate, SyntheticFeed, SyntheticSpec};

#[derive(Parser, Debug)]
#[command(name = "fxarb")]
#[command(about = "FX forward CIP deviation monitor, backtester and optimizer")]
struct Args {
    /// Engine config (TOML). Falls back to defaults when absent.
    #[arg(long, env = "FXARB_CONFIG")]
    config: Option<PathBuf>,

    /// Override the strategy entry threshold (bps)
    #[arg(long)]
    threshold_bps: Option<f64>,

    /// Override the manual forward offset (bps)
    #[arg(long)]
    offset_bps: Option<f64>,

    /// Override the RNG seed
    #[arg(long, env = "FXARB_SEED")]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Price one quote and classify its deviation
    Evaluate {
        #[arg(long)]
        spot: f64,
    },

    /// Monte Carlo P&L for one quote
    Simulate {
        #[arg(long)]
        spot: f64,
    },

    /// Replay a series (JSON array of quotes) or a synthetic one
    Backtest {
        #[arg(long)]
        series: Option<PathBuf>,

        #[arg(long, default_value = "250")]
        bars: usize,

        /// Exit at the realized spot instead of Monte Carlo marking
        #[arg(long, default_value = "false")]
        realized: bool,

        /// Print the full result as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Grid search over strategy parameters
    Sweep {
        /// Grid file (TOML `[[axes]]`); the reference grid when absent
        #[arg(long)]
        grid: Option<PathBuf>,

        #[arg(long)]
        series: Option<PathBuf>,

        #[arg(long, default_value = "250")]
        bars: usize,

        #[arg(long, default_value = "10")]
        top: usize,

        /// Per-configuration budget in ms (0 = unbounded)
        #[arg(long, env = "FXARB_SWEEP_TIMEOUT_MS", default_value = "0")]
        timeout_ms: u64,
    },

    /// Run the refresh loop against the synthetic feed
    Watch {
        /// Stop after N ticks (0 = until Ctrl-C)
        #[arg(long, default_value = "0")]
        ticks: u64,

        /// Override the configured poll interval
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("fxarb_backend=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::from_env(),
    };
    if let Some(t) = args.threshold_bps {
        config.strategy.threshold_bps = t;
    }
    if let Some(o) = args.offset_bps {
        config.strategy.offset_bps = o;
    }
    if args.seed.is_some() {
        config.strategy.seed = args.seed;
    }
    config.strategy.validate()?;

    match args.command {
        Commands::Evaluate { spot } => evaluate(&config, spot)?,
        Commands::Simulate { spot } => simulate(&config, spot)?,
        Commands::Backtest {
            series,
            bars,
            realized,
            json,
        } => {
            if realized {
                config.strategy.pnl_model = PnlModel::Realized;
            }
            let series = load_or_generate(&config, series.as_deref(), bars)?;
            let result = BacktestRunner::new(config.strategy.clone())?.run(&series)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result("Backtest", &result);
            }
        }
        Commands::Sweep {
            grid,
            series,
            bars,
            top,
            timeout_ms,
        } => sweep(&config, grid.as_deref(), series.as_deref(), bars, top, timeout_ms)?,
        Commands::Watch { ticks, interval_ms } => watch(&config, ticks, interval_ms).await?,
    }

    Ok(())
}

fn evaluate(config: &EngineConfig, spot: f64) -> Result<()> {
    let eval = evaluate_tick(&config.quote(spot), &config.strategy)?;
    println!("Pair:          {}", config.market.pair);
    println!("Spot:          {:.5}", spot);
    println!("Theoretical:   {:.5}", eval.forward.theoretical);
    println!("Observed:      {:.5}", eval.forward.observed);
    println!("Deviation:     {:+.2} bps", eval.dev_bps);
    println!("Signal:        {}", eval.signal.description());
    Ok(())
}

fn simulate(config: &EngineConfig, spot: f64) -> Result<()> {
    let eval = evaluate_tick(&config.quote(spot), &config.strategy)?;
    let simulator = PnLSimulator::new(&config.strategy)?;
    let paths = match config.strategy.seed {
        Some(seed) => simulator.simulate_par(&eval, seed)?,
        None => {
            let mut rng = ChaCha8Rng::from_entropy();
            simulator.simulate(&eval, &mut rng)?.collect()
        }
    };

    let pnls: Vec<f64> = paths.iter().map(|p| p.capped_pnl).collect();
    let summary = summarize(pnls.iter().copied());
    let (var, cvar) = historical_var(&pnls, DEFAULT_VAR_CONFIDENCE);

    println!("Signal:        {} ({:+.2} bps)", eval.signal.description(), eval.dev_bps);
    println!("Paths:         {}", summary.count);
    println!("Total P&L:     {:.2}", summary.total_pnl);
    println!("Avg P&L:       {:.2}", summary.avg_pnl);
    println!("Win rate:      {:.1}%", summary.win_rate * 100.0);
    println!("Max drawdown:  {:.2}", summary.max_drawdown);
    println!("VaR 95%:       {:.2}", var);
    println!("CVaR 95%:      {:.2}", cvar);
    Ok(())
}

fn sweep(
    config: &EngineConfig,
    grid: Option<&Path>,
    series: Option<&Path>,
    bars: usize,
    top: usize,
    timeout_ms: u64,
) -> Result<()> {
    let grid = match grid {
        Some(path) => ParamGrid::load(path)?,
        None => ParamGrid::reference(),
    };
    let cells = grid.len()?;
    let series = load_or_generate(config, series, bars)?;

    let options = SweepOptions {
        per_config_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        ..Default::default()
    };
    let report = Optimizer::new(config.strategy.clone()).sweep_with(&grid, &series, &options)?;

    println!(
        "Evaluated {} of {} configurations ({} skipped)",
        report.results.len(),
        cells,
        report.skipped.len()
    );
    for (rank, result) in report.top(top).iter().enumerate() {
        println!(
            "#{:<3} threshold={:<5} stop_loss={:<7} spread={:<5} total={:>12.2} win={:>5.1}% dd={:>10.2}",
            rank + 1,
            result.config.threshold_bps,
            result.config.stop_loss,
            result.config.spread_bps,
            result.total_pnl,
            result.win_rate * 100.0,
            result.max_drawdown
        );
    }
    for cell in &report.skipped {
        warn!(index = cell.index, reason = %cell.reason, "Skipped configuration");
    }
    Ok(())
}

async fn watch(config: &EngineConfig, ticks: u64, interval_ms: Option<u64>) -> Result<()> {
    let monitor = LiveMonitor::new(
        config.strategy.clone(),
        config.market.pair.clone(),
        config.live.history_capacity,
    )?;
    let spec = synthetic_spec(config, usize::MAX);
    let mut feed = SyntheticFeed::new(spec, config.strategy.seed.unwrap_or(0))?;
    let poll_interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.live.poll_interval());

    let cancel = CancelToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping monitor");
            ctrl_c.cancel();
        }
    });

    let max_ticks = (ticks > 0).then_some(ticks);
    let stats = monitor
        .run(&mut feed, &LogAlertSink, poll_interval, &cancel, max_ticks)
        .await;

    let history = monitor.history();
    println!(
        "Ticks: {}  evaluated: {}  failed: {}  alerts: {}",
        stats.ticks, stats.evaluated, stats.failed, stats.alerts
    );
    if let Some(dev) = history.with_read(|buf| deviation_stats(buf.iter())) {
        println!(
            "Deviation window ({} samples): latest {:+.2} mean {:+.2} sd {:.2} range [{:+.2}, {:+.2}] bps",
            dev.count, dev.latest_bps, dev.mean_bps, dev.std_dev_bps, dev.min_bps, dev.max_bps
        );
    }
    Ok(())
}

fn synthetic_spec(config: &EngineConfig, bars: usize) -> SyntheticSpec {
    SyntheticSpec {
        bars,
        r_dom: config.market.r_dom,
        r_for: config.market.r_for,
        tenor_days: config.strategy.tenor_days,
        ..Default::default()
    }
}

fn load_or_generate(
    config: &EngineConfig,
    path: Option<&Path>,
    bars: usize,
) -> Result<Vec<RateQuote>> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read series {}", path.display()))?;
            let series: Vec<RateQuote> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse series {}", path.display()))?;
            info!(bars = series.len(), path = %path.display(), "Loaded series");
            Ok(series)
        }
        None => {
            let spec = synthetic_spec(config, bars);
            let series = generate(&spec, config.strategy.seed.unwrap_or(0))?;
            info!(bars = series.len(), "Generated synthetic series");
            Ok(series)
        }
    }
}

fn print_result(label: &str, result: &BacktestResult) {
    println!("{} ({} bars, {} trades)", label, result.num_bars, result.num_trades);
    println!("  Total P&L:     {:.2}", result.total_pnl);
    println!("  Avg P&L:       {:.2}", result.avg_pnl);
    println!("  Win rate:      {:.1}%", result.win_rate * 100.0);
    println!("  Max drawdown:  {:.2}", result.max_drawdown);
    println!("  VaR 95%:       {:.2}", result.var_95);
    println!("  CVaR 95%:      {:.2}", result.cvar_95);
}
