use common::PerformanceMetrics;

/// Calculate performance metrics from strategy returns and the equity curve.
///
/// Degenerate statistics (empty input, single observation, zero variance)
/// never surface as NaN; every such metric is reported as 0.0.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate all performance metrics
    pub fn calculate(
        returns: &[f64],
        equity_curve: &[f64],
        initial_cash: f64,
        trading_days: u32,
    ) -> PerformanceMetrics {
        let Some(&final_equity) = equity_curve.last() else {
            return PerformanceMetrics::default();
        };

        let periods = equity_curve.len() as f64;
        let periods_per_year = f64::from(trading_days);
        let growth = final_equity / initial_cash;

        let total_return = growth - 1.0;
        let annualised_return = growth.powf(periods_per_year / periods) - 1.0;

        let std_dev = sample_std_dev(returns);
        let volatility = std_dev * periods_per_year.sqrt();
        let sharpe = if std_dev != 0.0 {
            mean(returns) / std_dev * periods_per_year.sqrt()
        } else {
            0.0
        };

        PerformanceMetrics {
            annualised_return: nan_to_zero(annualised_return),
            total_return: nan_to_zero(total_return),
            volatility: nan_to_zero(volatility),
            sharpe: nan_to_zero(sharpe),
            max_drawdown: Self::calculate_max_drawdown(equity_curve),
        }
    }

    /// Worst relative decline from the running peak (0.0 or negative)
    pub fn calculate_max_drawdown(equity_curve: &[f64]) -> f64 {
        let worst = relative_drawdowns(equity_curve).fold(f64::NAN, f64::min);
        nan_to_zero(worst)
    }

    /// Calculate drawdown curve
    pub fn calculate_drawdown_curve(equity_curve: &[f64]) -> Vec<f64> {
        relative_drawdowns(equity_curve).map(nan_to_zero).collect()
    }
}

/// `equity / running_max - 1` per period; NaN observations do not move the peak
fn relative_drawdowns(equity_curve: &[f64]) -> impl Iterator<Item = f64> + '_ {
    let mut peak = f64::NAN;
    equity_curve.iter().map(move |&equity| {
        peak = peak.max(equity);
        equity / peak - 1.0
    })
}

fn observed(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

/// Mean of the non-NaN values
fn mean(values: &[f64]) -> f64 {
    let (sum, count) = observed(values).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    sum / count as f64
}

/// Sample standard deviation (n - 1 denominator) of the non-NaN values;
/// NaN below two observations
fn sample_std_dev(values: &[f64]) -> f64 {
    let count = observed(values).count();
    if count < 2 {
        return f64::NAN;
    }

    let avg = mean(values);
    let variance = observed(values).map(|v| (v - avg).powi(2)).sum::<f64>() / (count - 1) as f64;
    variance.sqrt()
}

fn nan_to_zero(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_total_and_annualised_return() {
        let equity = [10000.0, 10100.0, 10200.0, 10300.0, 10400.0];
        let returns = [0.0, 0.01, 0.0099, 0.0098, 0.0097];

        let metrics = MetricsCalculator::calculate(&returns, &equity, 10000.0, 252);

        assert_relative_eq!(metrics.total_return, 0.04, epsilon = 1e-12);
        assert_relative_eq!(
            metrics.annualised_return,
            1.04_f64.powf(252.0 / 5.0) - 1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_max_drawdown() {
        let equity = [10000.0, 11000.0, 9000.0, 9500.0, 10500.0];
        let max_dd = MetricsCalculator::calculate_max_drawdown(&equity);

        // Peak was 11000, trough was 9000
        assert_relative_eq!(max_dd, 9000.0 / 11000.0 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_drawdown_curve() {
        let equity = [10000.0, 11000.0, 10000.0, 9000.0];
        let dd_curve = MetricsCalculator::calculate_drawdown_curve(&equity);

        assert_eq!(dd_curve.len(), 4);
        assert_eq!(dd_curve[0], 0.0); // No drawdown at start
        assert_eq!(dd_curve[1], 0.0); // New high, no drawdown
        assert_relative_eq!(dd_curve[2], -1.0 / 11.0, epsilon = 1e-12);
        assert_relative_eq!(dd_curve[3], -2.0 / 11.0, epsilon = 1e-12);
    }

    #[test]
    fn test_volatility_and_sharpe() {
        let returns = [0.01, 0.03];
        let equity = [1010.0, 1040.3];

        let metrics = MetricsCalculator::calculate(&returns, &equity, 1000.0, 252);

        let std_dev = 0.0002_f64.sqrt();
        assert_relative_eq!(metrics.volatility, std_dev * 252_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(metrics.sharpe, 0.02 / std_dev * 252_f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_nan_returns_are_skipped() {
        let returns = [0.01, f64::NAN, 0.03];
        let equity = [1010.0, f64::NAN, 1040.3];

        let metrics = MetricsCalculator::calculate(&returns, &equity, 1000.0, 252);

        let std_dev = 0.0002_f64.sqrt();
        assert_relative_eq!(metrics.total_return, 0.0403, epsilon = 1e-12);
        assert_relative_eq!(metrics.volatility, std_dev * 252_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(metrics.sharpe, 0.02 / std_dev * 252_f64.sqrt(), epsilon = 1e-9);
        assert_eq!(metrics.max_drawdown, 0.0);
    }

    #[test]
    fn test_zero_variance_sharpe_is_zero() {
        let returns = [0.0; 6];
        let equity = [1000.0; 6];

        let metrics = MetricsCalculator::calculate(&returns, &equity, 1000.0, 252);

        assert_eq!(metrics.sharpe, 0.0);
        assert_eq!(metrics.volatility, 0.0);
        assert_eq!(metrics.total_return, 0.0);
        assert_eq!(metrics.max_drawdown, 0.0);
    }

    #[test]
    fn test_single_observation_normalised() {
        let metrics = MetricsCalculator::calculate(&[0.0], &[1000.0], 1000.0, 252);

        assert_eq!(metrics, PerformanceMetrics::default());
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        let metrics = MetricsCalculator::calculate(&[], &[], 1000.0, 252);

        assert_eq!(metrics, PerformanceMetrics::default());
        assert!(MetricsCalculator::calculate_drawdown_curve(&[]).is_empty());
    }

    #[test]
    fn test_nan_annualised_return_normalised() {
        // Negative growth under a fractional exponent is NaN
        let equity = [1000.0, 500.0, -1000.0];
        let returns = [0.0, -0.5, -3.0];

        let metrics = MetricsCalculator::calculate(&returns, &equity, 1000.0, 10);

        assert_eq!(metrics.annualised_return, 0.0);
        assert_eq!(metrics.total_return, -2.0);
        assert_eq!(metrics.max_drawdown, -2.0);
    }
}
