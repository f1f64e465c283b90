/// Calculate Simple Moving Average
///
/// # Arguments
/// * `prices` - Slice of prices
/// * `period` - SMA period
///
/// # Returns
/// Vector of Option<f64>, None for values before enough data is available
pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = prices.len();
    let mut sma = vec![None; n];

    if n < period || period == 0 {
        return sma;
    }

    // Calculate initial sum
    let mut sum: f64 = prices[..period].iter().sum();
    sma[period - 1] = Some(sum / period as f64);

    // Sliding window for subsequent values
    for i in period..n {
        let leaving = prices[i - period];
        if leaving.is_finite() {
            sum = sum - leaving + prices[i];
        } else {
            // Non-finite value left the window; re-sum from scratch
            sum = prices[i + 1 - period..=i].iter().sum();
        }
        sma[i] = Some(sum / period as f64);
    }

    sma
}
