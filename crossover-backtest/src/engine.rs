use chrono::{DateTime, Utc};
use common::{BacktestError, BacktestParameters, BacktestResult, PriceFrame, Result};
use tracing::{debug, info};

use crate::execution::ExecutionModel;
use crate::metrics::MetricsCalculator;
use crate::signals::{MovingAverageCross, Strategy};

/// Vectorised single-strategy backtest engine
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    params: BacktestParameters,
    execution: ExecutionModel,
}

impl Default for BacktestEngine {
    fn default() -> Self {
        let params = BacktestParameters::default();
        Self {
            execution: ExecutionModel::from_params(&params),
            params,
        }
    }
}

impl BacktestEngine {
    pub fn new(params: BacktestParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            execution: ExecutionModel::from_params(&params),
            params,
        })
    }

    pub fn params(&self) -> &BacktestParameters {
        &self.params
    }

    /// Backtest `strategy` on the `close` column of `frame`.
    ///
    /// Without a strategy, a 12/26 moving average crossover is used.
    pub fn run(
        &self,
        frame: &PriceFrame,
        strategy: Option<&dyn Strategy>,
    ) -> Result<BacktestResult> {
        let prices = frame.series("close").ok_or_else(|| {
            BacktestError::InvalidInput("Price data must contain a 'close' column".to_string())
        })?;

        let fallback = MovingAverageCross::default();
        let strategy: &dyn Strategy = match strategy {
            Some(strategy) => strategy,
            None => &fallback,
        };

        let signals = strategy.generate_signals(&prices)?;
        if signals.len() != prices.len() {
            return Err(BacktestError::InvalidInput(format!(
                "{} produced {} signals for {} prices",
                strategy.name(),
                signals.len(),
                prices.len()
            )));
        }
        debug!(bars = prices.len(), strategy = strategy.name(), "running backtest");

        let closes: Vec<f64> = prices.iter().map(|p| p.price).collect();
        let raw_returns = period_returns(&closes);
        let held = ExecutionModel::lagged_positions(&signals);
        let returns = self.execution.strategy_returns(&held, &raw_returns);

        let mut equity = compound_equity(self.params.initial_cash, &returns);
        self.execution.apply_commission(&mut equity, &signals);

        let metrics = MetricsCalculator::calculate(
            &returns,
            &equity,
            self.params.initial_cash,
            self.params.trading_days,
        );
        let drawdown = MetricsCalculator::calculate_drawdown_curve(&equity);
        let final_equity = equity.last().copied().unwrap_or(self.params.initial_cash);

        info!(
            bars = prices.len(),
            total_return = metrics.total_return,
            sharpe = metrics.sharpe,
            max_drawdown = metrics.max_drawdown,
            "backtest complete"
        );

        let index = frame.index();
        Ok(BacktestResult {
            signals,
            returns: indexed(index, returns),
            equity_curve: indexed(index, equity),
            drawdown_curve: indexed(index, drawdown),
            metrics,
            initial_cash: self.params.initial_cash,
            final_equity,
        })
    }
}

/// Simple returns of the underlying; the first period has no reference and is 0
fn period_returns(closes: &[f64]) -> Vec<f64> {
    std::iter::once(0.0)
        .chain(closes.windows(2).map(|w| {
            let ret = w[1] / w[0] - 1.0;
            if ret.is_nan() {
                0.0
            } else {
                ret
            }
        }))
        .take(closes.len())
        .collect()
}

/// Account value from compounding `(1 + r)` over every period up to `t`.
///
/// A NaN return yields a NaN equity point but leaves the running growth
/// untouched, so later periods keep compounding.
fn compound_equity(initial_cash: f64, returns: &[f64]) -> Vec<f64> {
    let mut growth = 1.0;
    returns
        .iter()
        .map(|r| {
            if r.is_nan() {
                return f64::NAN;
            }
            growth *= 1.0 + r;
            growth * initial_cash
        })
        .collect()
}

fn indexed(index: &[DateTime<Utc>], values: Vec<f64>) -> Vec<(DateTime<Utc>, f64)> {
    index.iter().copied().zip(values).collect()
}
