use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use common::{BacktestError, Bar, Result};

const TIMESTAMP_COLUMNS: [&str; 3] = ["timestamp", "time", "date"];
const OHLCV_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Load bars from CSV file
pub fn load_csv(path: &Path) -> Result<Vec<Bar>> {
    let file = File::open(path)
        .map_err(|e| BacktestError::DataLoadError(format!("{}: {}", path.display(), e)))?;
    read_csv(BufReader::new(file))
}

/// Parse headed OHLCV CSV data.
///
/// Column names are matched case-insensitively and may appear in any order;
/// extra columns are ignored.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Bar>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| BacktestError::CsvError(e.to_string()))?
        .clone();
    let layout = ColumnLayout::from_headers(&headers)?;

    let mut bars = Vec::new();
    for (row, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| BacktestError::CsvError(e.to_string()))?;
        bars.push(layout.parse_bar(&record, row + 1)?);
    }

    ensure_chronological(&bars)?;
    Ok(bars)
}

/// Load bars from JSON file
pub fn load_json(path: &Path) -> Result<Vec<Bar>> {
    let file = File::open(path)
        .map_err(|e| BacktestError::DataLoadError(format!("{}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);
    let bars: Vec<Bar> = serde_json::from_reader(reader)?;
    ensure_chronological(&bars)?;
    Ok(bars)
}

/// Positions of the timestamp and OHLCV columns within a header row
#[derive(Debug)]
struct ColumnLayout {
    timestamp: usize,
    ohlcv: [usize; 5],
}

impl ColumnLayout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let lowered: Vec<String> = headers.iter().map(str::to_lowercase).collect();
        let position = |name: &str| lowered.iter().position(|h| h == name);

        let timestamp = lowered
            .iter()
            .position(|h| TIMESTAMP_COLUMNS.contains(&h.as_str()))
            .ok_or_else(|| {
                BacktestError::DataLoadError("CSV data must include a timestamp column".to_string())
            })?;

        let missing: BTreeSet<&str> = OHLCV_COLUMNS
            .iter()
            .copied()
            .filter(|name| position(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(BacktestError::DataLoadError(format!(
                "CSV is missing required columns: {}",
                missing.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }

        let mut ohlcv = [0; 5];
        for (slot, name) in ohlcv.iter_mut().zip(OHLCV_COLUMNS) {
            *slot = position(name).unwrap_or_default();
        }

        Ok(Self { timestamp, ohlcv })
    }

    fn parse_bar(&self, record: &csv::StringRecord, row: usize) -> Result<Bar> {
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let number = |slot: usize| -> Result<f64> {
            let raw = field(self.ohlcv[slot]);
            raw.parse().map_err(|_| {
                BacktestError::CsvError(format!(
                    "Invalid {} value {:?} on row {}",
                    OHLCV_COLUMNS[slot], raw, row
                ))
            })
        };

        Ok(Bar {
            timestamp: parse_timestamp(field(self.timestamp))?,
            open: number(0)?,
            high: number(1)?,
            low: number(2)?,
            close: number(3)?,
            volume: number(4)?,
        })
    }
}

/// Bars must be strictly increasing in time
fn ensure_chronological(bars: &[Bar]) -> Result<()> {
    match bars
        .windows(2)
        .find(|w| w[1].timestamp <= w[0].timestamp)
    {
        Some(w) => Err(BacktestError::DataLoadError(format!(
            "Timestamps must be strictly increasing: {} follows {}",
            w[1].timestamp, w[0].timestamp
        ))),
        None => Ok(()),
    }
}

/// Parse timestamp from various formats
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    // Try ISO 8601 format first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try common formats
    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d",
    ];

    for fmt in &formats {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        }
    }

    // Try Unix timestamp (seconds)
    if let Ok(ts) = s.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(ts, 0) {
            return Ok(dt);
        }
    }

    Err(BacktestError::CsvError(format!(
        "Unable to parse timestamp: {}",
        s
    )))
}
