//! Polling loop that re-evaluates a strategy on fresh data
//!
//! Each cycle fetches the trailing window of bars from a [`PriceProvider`],
//! runs the strategy over it and reports the most recent signal. A failing
//! cycle is logged and skipped; the loop keeps going. Signals are reported
//! only, never routed to a broker.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{BacktestError, PriceFrame, Result, Signal};
use serde::Serialize;
use tracing::{info, warn};

use crate::data::load_file;
use crate::signals::Strategy;

/// Source of the most recent bars
pub trait PriceProvider: Send + Sync {
    fn latest(&self, lookback: usize) -> Result<PriceFrame>;
}

/// Re-reads a CSV/JSON file on every poll
#[derive(Debug, Clone)]
pub struct FilePriceProvider {
    path: PathBuf,
}

impl FilePriceProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PriceProvider for FilePriceProvider {
    fn latest(&self, lookback: usize) -> Result<PriceFrame> {
        let bars = load_file(&self.path)?;
        Ok(PriceFrame::from_bars(&bars).tail(lookback))
    }
}

/// Latest signal observed in one polling cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveUpdate {
    pub iteration: usize,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub signal: Signal,
    pub position_change: i8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveSummary {
    pub iterations: usize,
    pub failures: usize,
    pub last_signal: Option<Signal>,
}

pub struct LiveRunner<P, S> {
    provider: P,
    strategy: S,
    lookback: usize,
    poll_interval: Duration,
    sleep: bool,
}

impl<P: PriceProvider, S: Strategy> LiveRunner<P, S> {
    pub fn new(provider: P, strategy: S, lookback: usize) -> Result<Self> {
        if lookback == 0 {
            return Err(BacktestError::InvalidConfiguration(
                "lookback must be at least one bar".to_string(),
            ));
        }

        Ok(Self {
            provider,
            strategy,
            lookback,
            poll_interval: Duration::from_secs(60),
            sleep: true,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Poll back-to-back, without waiting between cycles
    pub fn without_sleep(mut self) -> Self {
        self.sleep = false;
        self
    }

    /// Poll until `max_iterations` cycles have run (forever when `None`)
    pub fn run<F>(&self, max_iterations: Option<usize>, mut on_update: F) -> LiveSummary
    where
        F: FnMut(&LiveUpdate),
    {
        let mut summary = LiveSummary::default();
        info!(
            strategy = self.strategy.name(),
            lookback = self.lookback,
            interval_secs = self.poll_interval.as_secs(),
            "starting live polling"
        );

        while max_iterations.map_or(true, |max| summary.iterations < max) {
            summary.iterations += 1;

            match self.poll_once(summary.iterations) {
                Ok(update) => {
                    if summary.last_signal != Some(update.signal) {
                        info!(
                            iteration = update.iteration,
                            price = update.price,
                            signal = %update.signal,
                            "signal changed"
                        );
                    }
                    summary.last_signal = Some(update.signal);
                    on_update(&update);
                }
                Err(e) => {
                    summary.failures += 1;
                    warn!(iteration = summary.iterations, error = %e, "polling cycle failed");
                }
            }

            let more = max_iterations.map_or(true, |max| summary.iterations < max);
            if self.sleep && more {
                thread::sleep(self.poll_interval);
            }
        }

        summary
    }

    fn poll_once(&self, iteration: usize) -> Result<LiveUpdate> {
        let frame = self.provider.latest(self.lookback)?;
        let prices = frame.series("close").ok_or_else(|| {
            BacktestError::InvalidInput("Price data must contain a 'close' column".to_string())
        })?;
        let signals = self.strategy.generate_signals(&prices)?;
        let last = signals.last().ok_or_else(|| {
            BacktestError::InvalidInput("strategy produced no signals".to_string())
        })?;

        Ok(LiveUpdate {
            iteration,
            timestamp: last.timestamp,
            price: last.price,
            signal: last.signal,
            position_change: last.position_change,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::MovingAverageCross;
    use chrono::TimeZone;
    use common::PricePoint;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a growing price history and fails on selected polls
    struct ScriptedProvider {
        closes: Vec<f64>,
        fail_on: Vec<usize>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(closes: Vec<f64>, fail_on: Vec<usize>) -> Self {
            Self {
                closes,
                fail_on,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl PriceProvider for ScriptedProvider {
        fn latest(&self, lookback: usize) -> Result<PriceFrame> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&call) {
                return Err(BacktestError::DataLoadError("feed unavailable".to_string()));
            }

            let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let visible = (self.closes.len() - 3 + call).min(self.closes.len());
            let points: Vec<PricePoint> = self.closes[..visible]
                .iter()
                .enumerate()
                .map(|(i, &c)| PricePoint::new(start + chrono::Duration::days(i as i64), c))
                .collect();
            Ok(PriceFrame::from_closes(&points).tail(lookback))
        }
    }

    #[test]
    fn test_live_runner_reports_latest_signal() {
        let closes: Vec<f64> = (1..=20).map(f64::from).collect();
        let provider = ScriptedProvider::new(closes, vec![]);
        let strategy = MovingAverageCross::new(2, 4).unwrap();
        let runner = LiveRunner::new(provider, strategy, 10).unwrap().without_sleep();

        let mut updates = Vec::new();
        let summary = runner.run(Some(3), |u| updates.push(u.clone()));

        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.last_signal, Some(Signal::Long));
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].price, 18.0);
        assert_eq!(updates[2].price, 20.0);
        assert!(updates.iter().enumerate().all(|(i, u)| u.iteration == i + 1));
    }

    #[test]
    fn test_live_runner_survives_provider_failures() {
        let closes: Vec<f64> = (1..=20).map(f64::from).collect();
        let provider = ScriptedProvider::new(closes, vec![1, 3]);
        let strategy = MovingAverageCross::new(2, 4).unwrap();
        let runner = LiveRunner::new(provider, strategy, 10).unwrap().without_sleep();

        let mut seen = 0;
        let summary = runner.run(Some(4), |_| seen += 1);

        assert_eq!(summary.iterations, 4);
        assert_eq!(summary.failures, 2);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_live_runner_zero_iterations() {
        let provider = ScriptedProvider::new(vec![1.0, 2.0, 3.0], vec![]);
        let runner = LiveRunner::new(provider, MovingAverageCross::default(), 5)
            .unwrap()
            .without_sleep();

        let summary = runner.run(Some(0), |_| {});

        assert_eq!(summary, LiveSummary::default());
    }

    #[test]
    fn test_zero_lookback_rejected() {
        let provider = ScriptedProvider::new(vec![1.0], vec![]);
        let result = LiveRunner::new(provider, MovingAverageCross::default(), 0);

        assert!(matches!(result, Err(BacktestError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_file_provider_returns_trailing_window() {
        let path = std::env::temp_dir().join(format!("live-provider-{}.csv", std::process::id()));
        let mut csv = String::from("timestamp,open,high,low,close,volume\n");
        for day in 1..=9 {
            csv.push_str(&format!("2024-01-0{},1,1,1,{},10\n", day, day));
        }
        std::fs::write(&path, csv).unwrap();

        let frame = FilePriceProvider::new(&path).latest(4).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(frame.len(), 4);
        assert_eq!(frame.column("close"), Some(&[6.0, 7.0, 8.0, 9.0][..]));
    }
}
