use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::model::Bar;

/// Binance API error body.
#[derive(Debug, Deserialize)]
pub struct BinanceApiErrorResponse {
    pub code: i64,
    pub msg: String,
}

/// One row of GET /api/v3/klines:
/// `[open_time, open, high, low, close, volume, close_time, ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinanceKline {
    pub open_time: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: u64,
}

fn numeric_field(row: &[Value], idx: usize, name: &str) -> Result<f64, AppError> {
    let v = row
        .get(idx)
        .ok_or_else(|| AppError::MalformedResponse(format!("kline missing {}", name)))?;
    let parsed = match v {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed
        .filter(|x| x.is_finite())
        .ok_or_else(|| AppError::MalformedResponse(format!("kline {} is not numeric: {}", name, v)))
}

fn time_field(row: &[Value], idx: usize, name: &str) -> Result<u64, AppError> {
    row.get(idx)
        .and_then(Value::as_u64)
        .ok_or_else(|| AppError::MalformedResponse(format!("kline {} is not a timestamp", name)))
}

impl BinanceKline {
    pub fn from_row(row: &Value) -> Result<Self, AppError> {
        let row = row
            .as_array()
            .ok_or_else(|| AppError::MalformedResponse(format!("kline row is not an array: {}", row)))?;
        Ok(Self {
            open_time: time_field(row, 0, "open_time")?,
            open: numeric_field(row, 1, "open")?,
            high: numeric_field(row, 2, "high")?,
            low: numeric_field(row, 3, "low")?,
            close: numeric_field(row, 4, "close")?,
            volume: numeric_field(row, 5, "volume")?,
            close_time: time_field(row, 6, "close_time")?,
        })
    }

    pub fn into_bar(self) -> Bar {
        Bar {
            timestamp_ms: self.open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Parse a klines response body into bars sorted by open time. Klines
/// closing after `closed_by_ms` are still forming and are dropped.
pub fn parse_klines(body: &Value, closed_by_ms: u64) -> Result<Vec<Bar>, AppError> {
    let rows = body
        .as_array()
        .ok_or_else(|| AppError::MalformedResponse("klines response is not an array".to_string()))?;
    let klines = rows
        .iter()
        .map(BinanceKline::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    let mut bars: Vec<Bar> = klines
        .into_iter()
        .filter(|k| k.close_time <= closed_by_ms)
        .map(BinanceKline::into_bar)
        .collect();
    bars.sort_by_key(|b| b.timestamp_ms);
    Ok(bars)
}
