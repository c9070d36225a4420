use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotMode {
    #[default]
    Day,
    Week,
}

pub const PIVOT_LEVELS: [&str; 7] = ["p", "r1", "s1", "r2", "s2", "r3", "s3"];

/// Classic floor pivot levels from a period's high, low and last close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotLevels {
    pub p: f64,
    pub r1: f64,
    pub s1: f64,
    pub r2: f64,
    pub s2: f64,
    pub r3: f64,
    pub s3: f64,
}

impl PivotLevels {
    pub fn from_hlc(high: f64, low: f64, close: f64) -> Self {
        let p = (high + low + close) / 3.0;
        let r1 = 2.0 * p - low;
        let s1 = 2.0 * p - high;
        let r2 = p - s1 + r1;
        let s2 = p - (r1 - s1);
        let r3 = p - s2 + r2;
        let s3 = p - (r2 - s2);
        Self {
            p,
            r1,
            s1,
            r2,
            s2,
            r3,
            s3,
        }
    }

    pub fn as_array(&self) -> [f64; 7] {
        [self.p, self.r1, self.s1, self.r2, self.s2, self.r3, self.s3]
    }
}

/// Calendar bucket a timestamp falls into (UTC day, or ISO year/week).
fn period_key(timestamp_ms: u64, mode: PivotMode) -> (i32, u32) {
    let date = DateTime::<Utc>::from_timestamp_millis(timestamp_ms as i64)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN);
    match mode {
        PivotMode::Day => (date.year(), date.ordinal()),
        PivotMode::Week => {
            let week = date.iso_week();
            (week.year(), week.week())
        }
    }
}

/// Deviation of each value from the previous period's pivot levels.
///
/// Periods are computed from the series itself (high/low/last of the values
/// in the period). "Previous" is the most recent earlier period present in the
/// series; every bar of the first period is undefined. Returns one column per
/// entry of [`PIVOT_LEVELS`].
pub fn pivot_deviation(timestamps: &[u64], series: &[f64], mode: PivotMode) -> Vec<Vec<f64>> {
    let n = series.len();
    let mut out = vec![vec![f64::NAN; n]; PIVOT_LEVELS.len()];

    let mut previous: Option<PivotLevels> = None;
    let mut start = 0;
    while start < n {
        let key = period_key(timestamps[start], mode);
        let mut end = start;
        while end < n && period_key(timestamps[end], mode) == key {
            end += 1;
        }

        if let Some(levels) = previous {
            for i in start..end {
                for (col, level) in levels.as_array().iter().enumerate() {
                    out[col][i] = series[i] - level;
                }
            }
        }

        let defined: Vec<f64> = series[start..end]
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect();
        if let Some(&last) = defined.last() {
            let high = defined.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let low = defined.iter().copied().fold(f64::INFINITY, f64::min);
            previous = Some(PivotLevels::from_hlc(high, low, last));
        }
        start = end;
    }
    out
}
