use chrono::{DateTime, Duration, Utc};
use common::{BacktestError, Bar, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generate a random-walk daily price series ending today
pub fn generate_synthetic_bars(days: usize, initial_price: f64) -> Result<Vec<Bar>> {
    let start = Utc::now() - Duration::days(days as i64);
    generate_bars(&mut rand::thread_rng(), days, initial_price, start)
}

/// Reproducible variant of [`generate_synthetic_bars`]
pub fn generate_synthetic_bars_seeded(
    days: usize,
    initial_price: f64,
    seed: u64,
) -> Result<Vec<Bar>> {
    let start = DateTime::<Utc>::UNIX_EPOCH + Duration::days(19_723); // 2024-01-01
    generate_bars(&mut StdRng::seed_from_u64(seed), days, initial_price, start)
}

fn generate_bars<R: Rng>(
    rng: &mut R,
    days: usize,
    initial_price: f64,
    start: DateTime<Utc>,
) -> Result<Vec<Bar>> {
    if !initial_price.is_finite() || initial_price <= 0.0 {
        return Err(BacktestError::InvalidInput(format!(
            "initial price must be positive, got {}",
            initial_price
        )));
    }

    let mut bars = Vec::with_capacity(days);
    let mut price = initial_price;

    let daily_volatility = 0.015;
    let drift = 0.0003; // Slight upward drift

    for i in 0..days {
        let random_return: f64 = rng.gen_range(-1.0..1.0);
        let daily_return = drift + daily_volatility * random_return;
        let new_price = price * (1.0 + daily_return);

        // Generate OHLC
        let intraday_range = price * rng.gen_range(0.01..0.04);
        let open = price + rng.gen_range(-intraday_range / 2.0..intraday_range / 2.0);
        let close = new_price;

        let high = open.max(close) + rng.gen_range(0.0..intraday_range / 2.0);
        let low = open.min(close) - rng.gen_range(0.0..intraday_range / 2.0);

        // Generate volume (higher on volatile days)
        let base_volume = 5_000_000.0;
        let volume_multiplier = 1.0 + daily_return.abs() * 10.0;
        let volume = (base_volume * volume_multiplier * rng.gen_range(0.8..1.2)).round();

        bars.push(Bar {
            timestamp: start + Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume,
        });

        price = new_price;
    }

    Ok(bars)
}
