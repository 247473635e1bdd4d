//! OHLCV candle loading from CSV.
//!
//! Expected header: `date,open,high,low,close,volume`. Dates may be RFC 3339,
//! `YYYY-MM-DD HH:MM:SS` (UTC) or unix timestamps in seconds or milliseconds.
//! The resulting frame carries `date` as unix seconds next to the price columns.

use crate::domain::ml::DataFrame;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

pub const CANDLE_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

/// Unix timestamps above this are taken as milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Deserialize)]
struct CandleRecord {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

pub fn load_candles(path: &Path) -> Result<DataFrame> {
    let file = File::open(path).with_context(|| format!("Failed to open candles {:?}", path))?;
    let frame = read_candles(BufReader::new(file))
        .with_context(|| format!("Failed to load candles from {:?}", path))?;
    info!("Loaded {} candles from {:?}", frame.nrows(), path);
    Ok(frame)
}

pub fn read_candles<R: Read>(reader: R) -> Result<DataFrame> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows: Vec<(DateTime<Utc>, [f64; 5])> = Vec::new();

    for (line, result) in rdr.deserialize::<CandleRecord>().enumerate() {
        let record =
            result.with_context(|| format!("Malformed candle on data row {}", line + 1))?;
        let date = parse_date(&record.date)
            .with_context(|| format!("Bad date on data row {}", line + 1))?;
        rows.push((
            date,
            [
                record.open,
                record.high,
                record.low,
                record.close,
                record.volume,
            ],
        ));
    }

    if rows.is_empty() {
        bail!("No candles found");
    }

    rows.sort_by_key(|(date, _)| *date);
    let before = rows.len();
    rows.dedup_by_key(|(date, _)| *date);
    if rows.len() < before {
        warn!("Dropped {} duplicate candles", before - rows.len());
    }

    let mut columns: Vec<(String, Vec<f64>)> = CANDLE_COLUMNS
        .iter()
        .map(|name| (name.to_string(), Vec::with_capacity(rows.len())))
        .collect();
    for (date, values) in &rows {
        columns[0].1.push(date.timestamp() as f64);
        for (idx, value) in values.iter().enumerate() {
            columns[idx + 1].1.push(*value);
        }
    }

    Ok(DataFrame::from_columns(columns)?)
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Ok(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    let ts: i64 = raw
        .parse()
        .with_context(|| format!("Unrecognised date '{}'", raw))?;
    let date = if ts.abs() >= MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(ts)
    } else {
        DateTime::from_timestamp(ts, 0)
    };
    date.with_context(|| format!("Timestamp out of range '{}'", raw))
}
