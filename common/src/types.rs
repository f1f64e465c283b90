use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

/// OHLCV bar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// A single observation of a price series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Column-labelled price table sharing one timestamp index.
///
/// Every column has exactly as many values as the index has timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceFrame {
    index: Vec<DateTime<Utc>>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl PriceFrame {
    pub fn new(index: Vec<DateTime<Utc>>) -> Self {
        Self {
            index,
            columns: BTreeMap::new(),
        }
    }

    /// Add (or replace) a named column
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(BacktestError::InvalidInput(format!(
                "column '{}' has {} values but the index has {} timestamps",
                name,
                values.len(),
                self.index.len()
            )));
        }
        self.columns.insert(name, values);
        Ok(self)
    }

    /// Build an OHLCV frame from bars
    pub fn from_bars(bars: &[Bar]) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert("open".to_string(), bars.iter().map(|b| b.open).collect());
        columns.insert("high".to_string(), bars.iter().map(|b| b.high).collect());
        columns.insert("low".to_string(), bars.iter().map(|b| b.low).collect());
        columns.insert("close".to_string(), bars.iter().map(|b| b.close).collect());
        columns.insert("volume".to_string(), bars.iter().map(|b| b.volume).collect());

        Self {
            index: bars.iter().map(|b| b.timestamp).collect(),
            columns,
        }
    }

    /// Build a frame holding only a `close` column
    pub fn from_closes(points: &[PricePoint]) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert("close".to_string(), points.iter().map(|p| p.price).collect());

        Self {
            index: points.iter().map(|p| p.timestamp).collect(),
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Pair a column with the index
    pub fn series(&self, name: &str) -> Option<Vec<PricePoint>> {
        self.column(name).map(|values| {
            self.index
                .iter()
                .zip(values)
                .map(|(ts, v)| PricePoint::new(*ts, *v))
                .collect()
        })
    }

    /// Trailing `n` rows (the whole frame when it is shorter)
    pub fn tail(&self, n: usize) -> Self {
        let start = self.index.len().saturating_sub(n);
        Self {
            index: self.index[start..].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| (name.clone(), values[start..].to_vec()))
                .collect(),
        }
    }
}

/// Directional stance derived from a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Signal {
    Short,
    #[default]
    Flat,
    Long,
}

impl Signal {
    pub fn value(self) -> i8 {
        match self {
            Signal::Short => -1,
            Signal::Flat => 0,
            Signal::Long => 1,
        }
    }

    /// Position size held while this signal is active
    pub fn exposure(self) -> f64 {
        f64::from(self.value())
    }
}

impl From<Signal> for i8 {
    fn from(signal: Signal) -> Self {
        signal.value()
    }
}

impl TryFrom<i8> for Signal {
    type Error = String;

    fn try_from(value: i8) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(Signal::Short),
            0 => Ok(Signal::Flat),
            1 => Ok(Signal::Long),
            other => Err(format!("signal must be -1, 0 or 1, got {}", other)),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Signal::Short => "short",
            Signal::Flat => "flat",
            Signal::Long => "long",
        };
        f.write_str(label)
    }
}

/// Per-timestamp output of a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast_ma: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_ma: Option<f64>,
    pub signal: Signal,
    pub position_change: i8,
}

/// Ordered signal rows aligned one-to-one with the input prices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalSequence(Vec<SignalRow>);

impl SignalSequence {
    pub fn new(rows: Vec<SignalRow>) -> Self {
        Self(rows)
    }

    pub fn rows(&self) -> &[SignalRow] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SignalRow> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&SignalRow> {
        self.0.last()
    }

    pub fn signals(&self) -> impl Iterator<Item = Signal> + '_ {
        self.0.iter().map(|row| row.signal)
    }

    pub fn position_changes(&self) -> impl Iterator<Item = i8> + '_ {
        self.0.iter().map(|row| row.position_change)
    }
}

impl<'a> IntoIterator for &'a SignalSequence {
    type Item = &'a SignalRow;
    type IntoIter = std::slice::Iter<'a, SignalRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Performance metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub annualised_return: f64,
    pub total_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
}

impl PerformanceMetrics {
    /// Named metric values in report order
    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("annualised_return", self.annualised_return),
            ("total_return", self.total_return),
            ("volatility", self.volatility),
            ("sharpe", self.sharpe),
            ("max_drawdown", self.max_drawdown),
        ]
    }
}

/// Backtest result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub signals: SignalSequence,
    pub returns: Vec<(DateTime<Utc>, f64)>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub drawdown_curve: Vec<(DateTime<Utc>, f64)>,
    pub metrics: PerformanceMetrics,
    pub initial_cash: f64,
    pub final_equity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Bar::new(start + Duration::days(i as i64), c, c + 1.0, c - 1.0, c, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_frame_from_bars() {
        let bars = make_bars(&[10.0, 11.0, 12.0]);
        let frame = PriceFrame::from_bars(&bars);

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.column("close"), Some(&[10.0, 11.0, 12.0][..]));
        assert_eq!(frame.column("high"), Some(&[11.0, 12.0, 13.0][..]));
        let names: Vec<&str> = frame.column_names().collect();
        assert_eq!(names, vec!["close", "high", "low", "open", "volume"]);
    }

    #[test]
    fn test_frame_rejects_misaligned_column() {
        let bars = make_bars(&[10.0, 11.0]);
        let frame = PriceFrame::new(bars.iter().map(|b| b.timestamp).collect());

        let result = frame.with_column("close", vec![1.0]);
        assert!(matches!(result, Err(BacktestError::InvalidInput(_))));
    }

    #[test]
    fn test_frame_series_and_tail() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0]);
        let frame = PriceFrame::from_bars(&bars);

        let tail = frame.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.index()[0], bars[2].timestamp);

        let series = tail.series("close").unwrap();
        assert_eq!(series[1], PricePoint::new(bars[3].timestamp, 13.0));
        assert!(tail.series("vwap").is_none());

        assert_eq!(frame.tail(10).len(), 4);
    }

    #[test]
    fn test_signal_conversions() {
        assert_eq!(Signal::Long.value(), 1);
        assert_eq!(Signal::Short.exposure(), -1.0);
        assert_eq!(Signal::try_from(0i8), Ok(Signal::Flat));
        assert!(Signal::try_from(2i8).is_err());

        let json = serde_json::to_string(&Signal::Short).unwrap();
        assert_eq!(json, "-1");
        let parsed: Signal = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, Signal::Long);
    }

    #[test]
    fn test_metric_entries_order() {
        let metrics = PerformanceMetrics {
            total_return: 0.5,
            ..Default::default()
        };
        let names: Vec<&str> = metrics.entries().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec!["annualised_return", "total_return", "volatility", "sharpe", "max_drawdown"]
        );
        assert_eq!(metrics.entries()[1].1, 0.5);
    }
}
