//! Execution lag and transaction costs
//!
//! A signal produced at bar `t` is only acted on from bar `t + 1`, so the
//! position held during a period is always the previous bar's signal.
//! Costs come in two flavours:
//! - slippage, charged in return units per unit of position turnover
//! - commission, a flat fee per unit of signal change charged against equity

use common::{BacktestParameters, SignalSequence};

/// Cost model applied on top of lagged positions
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecutionModel {
    commission: f64,
    slippage: f64,
}

impl ExecutionModel {
    pub fn new(commission: f64, slippage: f64) -> Self {
        Self {
            commission,
            slippage,
        }
    }

    pub fn from_params(params: &BacktestParameters) -> Self {
        Self::new(params.commission, params.slippage)
    }

    /// Position held during each period (`held[0]` is always flat)
    pub fn lagged_positions(signals: &SignalSequence) -> Vec<f64> {
        std::iter::once(0.0)
            .chain(signals.signals().map(|s| s.exposure()))
            .take(signals.len())
            .collect()
    }

    /// Strategy return per period, net of slippage
    pub fn strategy_returns(&self, held: &[f64], raw_returns: &[f64]) -> Vec<f64> {
        let mut returns: Vec<f64> = held
            .iter()
            .zip(raw_returns)
            .map(|(position, raw)| position * raw)
            .collect();

        if self.slippage > 0.0 {
            for (i, ret) in returns.iter_mut().enumerate().skip(1) {
                *ret -= (held[i] - held[i - 1]).abs() * self.slippage;
            }
        }

        returns
    }

    /// Subtract cumulative commission from an equity curve in place
    pub fn apply_commission(&self, equity: &mut [f64], signals: &SignalSequence) {
        if self.commission <= 0.0 {
            return;
        }

        let mut trades = 0.0;
        for (value, change) in equity.iter_mut().zip(signals.position_changes()) {
            trades += f64::from(change.unsigned_abs());
            *value -= trades * self.commission;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use common::{Signal, SignalRow};

    fn make_signals(values: &[Signal]) -> SignalSequence {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut prev: Option<Signal> = None;
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, &signal)| {
                let position_change = prev.map_or(0, |p| signal.value() - p.value());
                prev = Some(signal);
                SignalRow {
                    timestamp: start + Duration::days(i as i64),
                    price: 100.0,
                    fast_ma: None,
                    slow_ma: None,
                    signal,
                    position_change,
                }
            })
            .collect();
        SignalSequence::new(rows)
    }

    #[test]
    fn test_positions_are_lagged_one_period() {
        let signals = make_signals(&[Signal::Long, Signal::Long, Signal::Short, Signal::Flat]);
        let held = ExecutionModel::lagged_positions(&signals);

        assert_eq!(held, vec![0.0, 1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_lagged_positions_empty() {
        let held = ExecutionModel::lagged_positions(&SignalSequence::default());
        assert!(held.is_empty());
    }

    #[test]
    fn test_strategy_returns_without_costs() {
        let model = ExecutionModel::default();
        let held = vec![0.0, 1.0, -1.0];
        let raw = vec![0.0, 0.02, 0.01];

        assert_eq!(model.strategy_returns(&held, &raw), vec![0.0, 0.02, -0.01]);
    }

    #[test]
    fn test_slippage_scales_with_turnover() {
        let model = ExecutionModel::new(0.0, 0.001);
        let held = vec![0.0, 1.0, 1.0, -1.0];
        let raw = vec![0.0, 0.0, 0.0, 0.0];

        let returns = model.strategy_returns(&held, &raw);

        assert_eq!(returns[0], 0.0);
        assert!((returns[1] + 0.001).abs() < 1e-15);
        assert_eq!(returns[2], 0.0);
        assert!((returns[3] + 0.002).abs() < 1e-15);
    }

    #[test]
    fn test_commission_accumulates_over_trades() {
        let model = ExecutionModel::new(1.5, 0.0);
        let signals = make_signals(&[Signal::Flat, Signal::Long, Signal::Long, Signal::Short]);
        let mut equity = vec![100.0; 4];

        model.apply_commission(&mut equity, &signals);

        assert_eq!(equity, vec![100.0, 98.5, 98.5, 95.5]);
    }

    #[test]
    fn test_zero_commission_is_noop() {
        let model = ExecutionModel::new(0.0, 0.0);
        let signals = make_signals(&[Signal::Flat, Signal::Long]);
        let mut equity = vec![100.0, 101.0];

        model.apply_commission(&mut equity, &signals);

        assert_eq!(equity, vec![100.0, 101.0]);
    }
}
