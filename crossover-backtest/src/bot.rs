use std::time::Duration;

use common::{BacktestError, BacktestResult, DataSource, PriceFrame, Result, TradingConfig};
use tracing::info;

use crate::data::{generate_synthetic_bars, generate_synthetic_bars_seeded, load_file};
use crate::engine::BacktestEngine;
use crate::live::{FilePriceProvider, LiveRunner};
use crate::signals::MovingAverageCross;

const DEFAULT_SYNTHETIC_DAYS: u64 = 252;
const DEFAULT_SYNTHETIC_PRICE: f64 = 100.0;

/// Wires configuration, data loading, the backtest engine and live polling
#[derive(Debug, Clone)]
pub struct TradingBot {
    config: TradingConfig,
    strategy: MovingAverageCross,
}

impl TradingBot {
    pub fn new(config: TradingConfig) -> Result<Self> {
        let strategy = MovingAverageCross::from_config(&config.strategy_config())?;
        Ok(Self { config, strategy })
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    pub fn strategy(&self) -> &MovingAverageCross {
        &self.strategy
    }

    /// Historical bars for the configured data source
    pub fn load_data(&self) -> Result<PriceFrame> {
        let bars = match self.config.data_source {
            DataSource::File => {
                let path = self.config.data_path.as_deref().ok_or_else(|| {
                    BacktestError::InvalidConfiguration(
                        "data_path must be set when data_source is 'file'".to_string(),
                    )
                })?;
                info!(symbol = %self.config.symbol, path = %path.display(), "loading price data");
                load_file(path)?
            }
            DataSource::Synthetic => {
                let days = self.extra_u64("days")?.unwrap_or(DEFAULT_SYNTHETIC_DAYS) as usize;
                let price = self.extra_f64("initial_price")?.unwrap_or(DEFAULT_SYNTHETIC_PRICE);
                info!(days, initial_price = price, "generating synthetic price data");
                match self.extra_u64("seed")? {
                    Some(seed) => generate_synthetic_bars_seeded(days, price, seed)?,
                    None => generate_synthetic_bars(days, price)?,
                }
            }
        };

        Ok(PriceFrame::from_bars(&bars))
    }

    /// Backtest the configured strategy on `data`, or on freshly loaded data
    pub fn backtest(&self, data: Option<&PriceFrame>) -> Result<BacktestResult> {
        let engine = BacktestEngine::new(self.config.backtest_parameters())?;
        match data {
            Some(frame) => engine.run(frame, Some(&self.strategy)),
            None => engine.run(&self.load_data()?, Some(&self.strategy)),
        }
    }

    /// Polling loop over the configured data file
    pub fn live_runner(
        &self,
        lookback: usize,
    ) -> Result<LiveRunner<FilePriceProvider, MovingAverageCross>> {
        let path = match (self.config.data_source, &self.config.data_path) {
            (DataSource::File, Some(path)) => path.clone(),
            _ => {
                return Err(BacktestError::InvalidConfiguration(
                    "live polling requires a file data source with data_path set".to_string(),
                ))
            }
        };

        let runner = LiveRunner::new(FilePriceProvider::new(path), self.strategy, lookback)?
            .with_poll_interval(Duration::from_secs(self.config.poll_interval_secs));
        Ok(runner)
    }

    fn extra_u64(&self, key: &str) -> Result<Option<u64>> {
        self.config
            .extra
            .get(key)
            .map(|value| {
                value.as_u64().ok_or_else(|| {
                    BacktestError::InvalidConfiguration(format!(
                        "extra.{} must be a non-negative integer",
                        key
                    ))
                })
            })
            .transpose()
    }

    fn extra_f64(&self, key: &str) -> Result<Option<f64>> {
        self.config
            .extra
            .get(key)
            .map(|value| {
                value.as_f64().ok_or_else(|| {
                    BacktestError::InvalidConfiguration(format!("extra.{} must be a number", key))
                })
            })
            .transpose()
    }
}
