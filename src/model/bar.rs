use serde::{Deserialize, Serialize};

/// One OHLCV observation for a fixed period. `timestamp_ms` is the period open time (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp_ms: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Named price column of a bar slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "high" => Some(Self::High),
            "low" => Some(Self::Low),
            "close" => Some(Self::Close),
            "volume" => Some(Self::Volume),
            _ => None,
        }
    }

    pub fn get(self, bar: &Bar) -> f64 {
        match self {
            Self::Open => bar.open,
            Self::High => bar.high,
            Self::Low => bar.low,
            Self::Close => bar.close,
            Self::Volume => bar.volume,
        }
    }
}

pub fn timestamps(bars: &[Bar]) -> Vec<u64> {
    bars.iter().map(|b| b.timestamp_ms).collect()
}

pub fn column(bars: &[Bar], field: PriceField) -> Vec<f64> {
    bars.iter().map(|b| field.get(b)).collect()
}

/// Close series resampled to `interval_ms` buckets.
///
/// Each bucket is labelled with its end time, so a value is only known once
/// the bucket has closed. Buckets without bars are skipped.
pub fn resample_close(bars: &[Bar], interval_ms: u64) -> Vec<(u64, f64)> {
    assert!(interval_ms > 0, "interval_ms must be > 0");
    let mut out: Vec<(u64, f64)> = Vec::new();
    for bar in bars {
        let bucket_end = bar.timestamp_ms - (bar.timestamp_ms % interval_ms) + interval_ms;
        match out.last_mut() {
            Some((end, close)) if *end == bucket_end => *close = bar.close,
            _ => out.push((bucket_end, bar.close)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: u64, close: f64) -> Bar {
        Bar {
            timestamp_ms: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn resample_close_labels_buckets_by_end_time() {
        let bars = vec![
            bar(0, 1.0),
            bar(30_000, 2.0),
            bar(60_000, 3.0),
            bar(180_000, 4.0),
        ];
        let out = resample_close(&bars, 60_000);
        assert_eq!(out, vec![(60_000, 2.0), (120_000, 3.0), (240_000, 4.0)]);
    }

    #[test]
    fn price_field_parse_is_case_insensitive() {
        assert_eq!(PriceField::parse(" Close "), Some(PriceField::Close));
        assert_eq!(PriceField::parse("vwap"), None);
        let b = bar(0, 5.0);
        assert!((PriceField::Close.get(&b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    #[should_panic(expected = "interval_ms must be > 0")]
    fn resample_rejects_zero_interval() {
        resample_close(&[bar(0, 1.0)], 0);
    }
}
