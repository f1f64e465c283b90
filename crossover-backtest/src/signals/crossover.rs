use common::{
    BacktestError, PricePoint, Result, Signal, SignalRow, SignalSequence, StrategyConfig,
};
use tracing::debug;

use super::Strategy;
use crate::indicators::calculate_sma;

/// Simple moving average crossover strategy.
///
/// Long while the fast average is above the slow one, short while it is
/// below, flat on ties and while either average is still warming up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovingAverageCross {
    fast_window: usize,
    slow_window: usize,
}

impl Default for MovingAverageCross {
    fn default() -> Self {
        let config = StrategyConfig::default();
        Self {
            fast_window: config.fast_window,
            slow_window: config.slow_window,
        }
    }
}

impl MovingAverageCross {
    pub fn new(fast_window: usize, slow_window: usize) -> Result<Self> {
        if fast_window == 0 || slow_window == 0 {
            return Err(BacktestError::InvalidConfiguration(
                "Moving average windows must be positive integers".to_string(),
            ));
        }
        if fast_window >= slow_window {
            return Err(BacktestError::InvalidConfiguration(format!(
                "fast_window ({}) must be strictly smaller than slow_window ({})",
                fast_window, slow_window
            )));
        }

        Ok(Self {
            fast_window,
            slow_window,
        })
    }

    pub fn from_config(config: &StrategyConfig) -> Result<Self> {
        Self::new(config.fast_window, config.slow_window)
    }

    pub fn fast_window(&self) -> usize {
        self.fast_window
    }

    pub fn slow_window(&self) -> usize {
        self.slow_window
    }
}

impl Strategy for MovingAverageCross {
    fn name(&self) -> &str {
        "Moving Average Crossover"
    }

    fn generate_signals(&self, prices: &[PricePoint]) -> Result<SignalSequence> {
        if prices.is_empty() {
            return Err(BacktestError::InvalidInput(
                "Price series must not be empty".to_string(),
            ));
        }

        let closes: Vec<f64> = prices.iter().map(|p| p.price).collect();
        let fast = calculate_sma(&closes, self.fast_window);
        let slow = calculate_sma(&closes, self.slow_window);

        let mut previous: Option<Signal> = None;
        let rows: Vec<SignalRow> = prices
            .iter()
            .zip(fast.into_iter().zip(slow))
            .map(|(point, (fast_ma, slow_ma))| {
                let signal = crossover_signal(fast_ma, slow_ma);
                let position_change = previous.map_or(0, |prev| signal.value() - prev.value());
                previous = Some(signal);

                SignalRow {
                    timestamp: point.timestamp,
                    price: point.price,
                    fast_ma,
                    slow_ma,
                    signal,
                    position_change,
                }
            })
            .collect();

        debug!(
            bars = rows.len(),
            fast_window = self.fast_window,
            slow_window = self.slow_window,
            "generated crossover signals"
        );

        Ok(SignalSequence::new(rows))
    }
}

/// Undefined averages and NaN comparisons fall through to flat
fn crossover_signal(fast: Option<f64>, slow: Option<f64>) -> Signal {
    match (fast, slow) {
        (Some(f), Some(s)) if f > s => Signal::Long,
        (Some(f), Some(s)) if f < s => Signal::Short,
        _ => Signal::Flat,
    }
}
