use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

/// Moving average window sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub fast_window: usize,
    pub slow_window: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fast_window: 12,
            slow_window: 26,
        }
    }
}

/// Backtest parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestParameters {
    pub initial_cash: f64,
    /// Flat fee per unit of position change, charged against equity
    pub commission: f64,
    /// Cost per unit of position turnover, charged in return units
    pub slippage: f64,
    /// Periods per year used for annualisation
    pub trading_days: u32,
}

impl Default for BacktestParameters {
    fn default() -> Self {
        Self {
            initial_cash: 10_000.0,
            commission: 0.0,
            slippage: 0.0,
            trading_days: 252,
        }
    }
}

impl BacktestParameters {
    pub fn with_cash(mut self, initial_cash: f64) -> Self {
        self.initial_cash = initial_cash;
        self
    }

    pub fn with_commission(mut self, commission: f64) -> Self {
        self.commission = commission;
        self
    }

    pub fn with_slippage(mut self, slippage: f64) -> Self {
        self.slippage = slippage;
        self
    }

    pub fn with_trading_days(mut self, trading_days: u32) -> Self {
        self.trading_days = trading_days;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.initial_cash.is_finite() || self.initial_cash <= 0.0 {
            return Err(BacktestError::InvalidConfiguration(format!(
                "initial_cash must be a positive number, got {}",
                self.initial_cash
            )));
        }
        if !self.commission.is_finite() || self.commission < 0.0 {
            return Err(BacktestError::InvalidConfiguration(format!(
                "commission must be non-negative, got {}",
                self.commission
            )));
        }
        if !self.slippage.is_finite() || self.slippage < 0.0 {
            return Err(BacktestError::InvalidConfiguration(format!(
                "slippage must be non-negative, got {}",
                self.slippage
            )));
        }
        if self.trading_days == 0 {
            return Err(BacktestError::InvalidConfiguration(
                "trading_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where historical bars come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// CSV or JSON file, selected by extension
    #[default]
    #[serde(alias = "csv")]
    File,
    /// Randomly generated bars
    Synthetic,
}

impl FromStr for DataSource {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" | "csv" => Ok(DataSource::File),
            "synthetic" => Ok(DataSource::Synthetic),
            other => Err(BacktestError::InvalidConfiguration(format!(
                "Unsupported data_source: {}",
                other
            ))),
        }
    }
}

/// Top-level settings for the CLI and live runner.
///
/// The backtest core never reads this directly; it is projected onto
/// [`StrategyConfig`] and [`BacktestParameters`] by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbol: String,
    pub cash: f64,
    pub fast_window: usize,
    pub slow_window: usize,
    pub commission: f64,
    pub slippage: f64,
    pub trading_days: u32,
    pub data_source: DataSource,
    #[serde(alias = "csv_data_path")]
    pub data_path: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        let strategy = StrategyConfig::default();
        let params = BacktestParameters::default();
        Self {
            symbol: "AAPL".to_string(),
            cash: params.initial_cash,
            fast_window: strategy.fast_window,
            slow_window: strategy.slow_window,
            commission: params.commission,
            slippage: params.slippage,
            trading_days: params.trading_days,
            data_source: DataSource::File,
            data_path: None,
            poll_interval_secs: 60,
            extra: BTreeMap::new(),
        }
    }
}

impl TradingConfig {
    /// Read `TRADERBOT_*` environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Same as [`TradingConfig::from_env`] with a custom variable lookup
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let data_source = match lookup("TRADERBOT_DATA_SOURCE") {
            Some(raw) => raw.parse()?,
            None => defaults.data_source,
        };

        Ok(Self {
            symbol: lookup("TRADERBOT_SYMBOL").unwrap_or(defaults.symbol),
            cash: parse_var(&lookup, "TRADERBOT_CASH", defaults.cash)?,
            fast_window: parse_var(&lookup, "TRADERBOT_FAST_WINDOW", defaults.fast_window)?,
            slow_window: parse_var(&lookup, "TRADERBOT_SLOW_WINDOW", defaults.slow_window)?,
            commission: parse_var(&lookup, "TRADERBOT_COMMISSION", defaults.commission)?,
            slippage: parse_var(&lookup, "TRADERBOT_SLIPPAGE", defaults.slippage)?,
            trading_days: parse_var(&lookup, "TRADERBOT_TRADING_DAYS", defaults.trading_days)?,
            data_source,
            data_path: lookup("TRADERBOT_CSV_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            poll_interval_secs: parse_var(
                &lookup,
                "TRADERBOT_POLL_INTERVAL",
                defaults.poll_interval_secs,
            )?,
            extra: defaults.extra,
        })
    }

    /// Load settings from a JSON file; missing keys keep their defaults
    pub fn from_json(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            BacktestError::InvalidConfiguration(format!("{}: {}", path.display(), e))
        })?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn to_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig {
            fast_window: self.fast_window,
            slow_window: self.slow_window,
        }
    }

    pub fn backtest_parameters(&self) -> BacktestParameters {
        BacktestParameters {
            initial_cash: self.cash,
            commission: self.commission,
            slippage: self.slippage,
            trading_days: self.trading_days,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            BacktestError::InvalidConfiguration(format!("{}={:?} is not a valid value", key, raw))
        }),
        None => Ok(default),
    }
}
