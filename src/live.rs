//! Live Refresh Loop
//!
//! Polls a [`RateFeed`] on a fixed interval, evaluates each quote, appends the
//! deviation to the shared history and hands actionable signals to an
//! [`AlertSink`].
//!
//! # Design Principles
//!
//! 1. **Single writer**: only the monitor pushes into its [`SharedHistory`];
//!    chart readers take snapshots.
//! 2. **Failed ticks are inert**: a feed or pricing error is logged and
//!    counted, the history is left untouched, and the loop keeps polling.
//! 3. **Fire and forget alerts**: delivery failures are logged, never retried.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backtest::CancelToken;
use crate::error::{EngineError, EngineResult};
use crate::history::SharedHistory;
use crate::models::{Alert, BacktestConfig, DeviationSample, RateQuote, TickEvaluation};
use crate::signal::should_alert;

pub use crate::signal::evaluate_tick;

/// Nominal dashboard refresh period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// COLLABORATOR SEAMS
// =============================================================================

/// Source of spot/rate snapshots (broker API, replay file, synthetic process).
#[async_trait]
pub trait RateFeed: Send {
    async fn next_quote(&mut self) -> Result<RateQuote, EngineError>;
}

/// Destination for arbitrage alerts (chat webhook, pager, log).
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Writes alerts to the tracing log.
#[derive(Debug, Clone, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        info!(
            pair = %alert.pair,
            signal = alert.signal.as_str(),
            dev_bps = alert.dev_bps,
            threshold_bps = alert.threshold_bps,
            "{}",
            alert.message()
        );
        Ok(())
    }
}

// =============================================================================
// MONITOR
// =============================================================================

/// Counters for one [`LiveMonitor::run`] invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveStats {
    pub ticks: u64,
    pub evaluated: u64,
    pub failed: u64,
    pub alerts: u64,
}

#[derive(Debug, Clone)]
pub struct LiveMonitor {
    config: BacktestConfig,
    pair: String,
    history: SharedHistory,
}

impl LiveMonitor {
    pub fn new(
        config: BacktestConfig,
        pair: impl Into<String>,
        history_capacity: usize,
    ) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pair: pair.into(),
            history: SharedHistory::new(history_capacity),
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    /// Reader handle for charts.
    pub fn history(&self) -> SharedHistory {
        self.history.clone()
    }

    /// Evaluates one feed result. On any error the history is not touched.
    pub fn apply(&self, quote: Result<RateQuote, EngineError>) -> EngineResult<TickEvaluation> {
        let quote = quote.map_err(|e| match e {
            EngineError::UpstreamFeedError { .. } => e,
            other => EngineError::upstream(other.to_string()),
        })?;
        let eval = evaluate_tick(&quote, &self.config)?;

        self.history.push(DeviationSample {
            timestamp: quote.as_of.unwrap_or_else(Utc::now),
            dev_bps: eval.dev_bps,
            observed_forward: eval.forward.observed,
        });
        metrics::gauge!("fxarb_last_deviation_bps", eval.dev_bps);
        Ok(eval)
    }

    /// One refresh: poll, evaluate, record, alert.
    pub async fn tick<F, S>(&self, feed: &mut F, sink: &S) -> EngineResult<TickEvaluation>
    where
        F: RateFeed + ?Sized,
        S: AlertSink + ?Sized,
    {
        metrics::increment_counter!("fxarb_ticks_total");
        let polled = feed.next_quote().await;
        let eval = match self.apply(polled) {
            Ok(eval) => eval,
            Err(e) => {
                metrics::increment_counter!("fxarb_tick_errors_total");
                return Err(e);
            }
        };

        debug!(
            pair = %self.pair,
            spot = eval.quote.spot,
            theoretical = eval.forward.theoretical,
            observed = eval.forward.observed,
            dev_bps = eval.dev_bps,
            signal = eval.signal.as_str(),
            "Tick evaluated"
        );

        if should_alert(eval.signal) {
            let alert = Alert {
                pair: self.pair.clone(),
                signal: eval.signal,
                dev_bps: eval.dev_bps,
                threshold_bps: self.config.threshold_bps,
                timestamp: eval.quote.as_of.unwrap_or_else(Utc::now),
            };
            metrics::increment_counter!("fxarb_alerts_total");
            if let Err(e) = sink.deliver(&alert).await {
                metrics::increment_counter!("fxarb_alert_failures_total");
                warn!(pair = %self.pair, error = %e, "Alert delivery failed");
            }
        }
        Ok(eval)
    }

    /// Polls every `poll_interval` until cancelled or `max_ticks` is reached.
    /// Tick errors never stop the loop.
    pub async fn run<F, S>(
        &self,
        feed: &mut F,
        sink: &S,
        poll_interval: Duration,
        cancel: &CancelToken,
        max_ticks: Option<u64>,
    ) -> LiveStats
    where
        F: RateFeed + ?Sized,
        S: AlertSink + ?Sized,
    {
        let mut stats = LiveStats::default();
        let mut interval = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            pair = %self.pair,
            poll_interval_ms = poll_interval.as_millis() as u64,
            threshold_bps = self.config.threshold_bps,
            "Live monitor started"
        );

        loop {
            if cancel.is_cancelled() || max_ticks.map_or(false, |max| stats.ticks >= max) {
                break;
            }
            interval.tick().await;
            if cancel.is_cancelled() {
                break;
            }

            stats.ticks += 1;
            match self.tick(feed, sink).await {
                Ok(eval) => {
                    stats.evaluated += 1;
                    if should_alert(eval.signal) {
                        stats.alerts += 1;
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(pair = %self.pair, error = %e, "Tick failed, history unchanged");
                }
            }
        }

        info!(
            ticks = stats.ticks,
            evaluated = stats.evaluated,
            failed = stats.failed,
            alerts = stats.alerts,
            "Live monitor stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    struct ScriptedFeed {
        script: VecDeque<Result<RateQuote, EngineError>>,
    }

    impl ScriptedFeed {
        fn new(script: Vec<Result<RateQuote, EngineError>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    #[async_trait]
    impl RateFeed for ScriptedFeed {
        async fn next_quote(&mut self) -> Result<RateQuote, EngineError> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(EngineError::upstream("script exhausted")))
        }
    }

    #[derive(Default, Clone)]
    struct RecordingSink {
        alerts: Arc<Mutex<Vec<Alert>>>,
        fail: bool,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
            self.alerts.lock().push(alert.clone());
            if self.fail {
                anyhow::bail!("webhook returned 500");
            }
            Ok(())
        }
    }

    fn monitor(offset_bps: f64) -> LiveMonitor {
        let cfg = BacktestConfig {
            offset_bps,
            threshold_bps: 5.0,
            ..Default::default()
        };
        LiveMonitor::new(cfg, "EUR_USD", 50).unwrap()
    }

    fn quote() -> RateQuote {
        RateQuote::new(1.1000, 30, 0.05, 0.03)
    }

    #[test]
    fn test_apply_records_sample() {
        let m = monitor(15.0);
        assert_eq!(m.pair(), "EUR_USD");
        assert_eq!(m.config().threshold_bps, 5.0);
        let eval = m.apply(Ok(quote())).unwrap();
        assert_eq!(eval.signal, crate::models::Signal::Sell);
        let snap = m.history().snapshot();
        assert_eq!(snap.len(), 1);
        assert!((snap[0].dev_bps - 15.0).abs() < 1e-6);
        assert_eq!(snap[0].observed_forward, eval.forward.observed);
    }

    #[test]
    fn test_failed_ticks_leave_history_untouched() {
        let m = monitor(15.0);
        m.apply(Ok(quote())).unwrap();

        let upstream = m.apply(Err(EngineError::upstream("HTTP 503")));
        assert!(matches!(upstream, Err(EngineError::UpstreamFeedError { .. })));

        let bad = m.apply(Ok(RateQuote::new(0.0, 30, 0.05, 0.03)));
        assert!(matches!(bad, Err(EngineError::InvalidInput { .. })));

        assert_eq!(m.history().len(), 1);
    }

    #[test]
    fn test_non_upstream_feed_errors_are_wrapped() {
        let m = monitor(0.0);
        let err = m.apply(Err(EngineError::EmptySeries)).unwrap_err();
        assert!(matches!(err, EngineError::UpstreamFeedError { .. }));
    }

    #[tokio::test]
    async fn test_tick_alerts_on_actionable_signal() {
        let m = monitor(15.0);
        let sink = RecordingSink::default();
        let mut feed = ScriptedFeed::new(vec![Ok(quote())]);
        m.tick(&mut feed, &sink).await.unwrap();

        let alerts = sink.alerts.lock();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].pair, "EUR_USD");
        assert_eq!(alerts[0].threshold_bps, 5.0);
        assert!(alerts[0].message().contains("Rich → Sell forward"));
    }

    #[tokio::test]
    async fn test_no_alert_inside_threshold() {
        let m = monitor(2.0);
        let sink = RecordingSink::default();
        let mut feed = ScriptedFeed::new(vec![Ok(quote())]);
        m.tick(&mut feed, &sink).await.unwrap();
        assert!(sink.alerts.lock().is_empty());
        assert_eq!(m.history().len(), 1);
    }

    #[tokio::test]
    async fn test_alert_failure_is_not_fatal() {
        let m = monitor(-15.0);
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let mut feed = ScriptedFeed::new(vec![Ok(quote())]);
        let eval = m.tick(&mut feed, &sink).await.unwrap();
        assert_eq!(eval.signal, crate::models::Signal::Buy);
        assert_eq!(sink.alerts.lock().len(), 1);
        assert_eq!(m.history().len(), 1);
    }

    #[tokio::test]
    async fn test_run_survives_errors_and_stops_at_max_ticks() {
        let m = monitor(15.0);
        let sink = RecordingSink::default();
        let mut feed = ScriptedFeed::new(vec![
            Ok(quote()),
            Err(EngineError::upstream("timeout")),
            Ok(RateQuote::new(-1.0, 30, 0.05, 0.03)),
            Ok(quote()),
        ]);
        let stats = m
            .run(
                &mut feed,
                &sink,
                Duration::from_millis(1),
                &CancelToken::new(),
                Some(4),
            )
            .await;

        assert_eq!(
            stats,
            LiveStats {
                ticks: 4,
                evaluated: 2,
                failed: 2,
                alerts: 2,
            }
        );
        assert_eq!(m.history().len(), 2);
    }

    #[tokio::test]
    async fn test_run_honours_cancellation() {
        let m = monitor(0.0);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut feed = ScriptedFeed::new(vec![Ok(quote())]);
        let stats = m
            .run(&mut feed, &LogAlertSink, Duration::from_millis(1), &cancel, None)
            .await;
        assert_eq!(stats.ticks, 0);
        assert!(m.history().is_empty());
    }
}
