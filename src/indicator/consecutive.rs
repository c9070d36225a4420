use crate::model::bar::{resample_close, Bar};

#[derive(Debug, Clone, PartialEq)]
pub struct RunLengths {
    pub up: Vec<f64>,
    pub down: Vec<f64>,
}

/// Count consecutive rising and falling moves.
///
/// A rise increments `up` and resets `down`, a fall does the opposite. Flat or
/// undefined moves reset both. The first value has no move and reads 0.
pub fn run_lengths(series: &[f64]) -> RunLengths {
    let mut up = Vec::with_capacity(series.len());
    let mut down = Vec::with_capacity(series.len());
    let (mut u, mut d) = (0.0, 0.0);
    for i in 0..series.len() {
        let change = if i == 0 {
            f64::NAN
        } else {
            series[i] - series[i - 1]
        };
        if change > 0.0 {
            u += 1.0;
            d = 0.0;
        } else if change < 0.0 {
            d += 1.0;
            u = 0.0;
        } else {
            u = 0.0;
            d = 0.0;
        }
        up.push(u);
        down.push(d);
    }
    RunLengths { up, down }
}

/// Run lengths of the close series resampled to `interval_ms`, carried onto
/// the native timestamps.
///
/// A resampled value becomes visible at the first native bar at or after the
/// end of its bucket, so no bar sees a bucket that has not closed yet. Bars
/// before the first closed bucket are undefined.
pub fn resampled_run_lengths(bars: &[Bar], interval_ms: u64) -> RunLengths {
    let buckets = resample_close(bars, interval_ms);
    let closes: Vec<f64> = buckets.iter().map(|(_, c)| *c).collect();
    let runs = run_lengths(&closes);

    let mut up = Vec::with_capacity(bars.len());
    let mut down = Vec::with_capacity(bars.len());
    let mut next = 0;
    let mut current: Option<usize> = None;
    for bar in bars {
        while next < buckets.len() && buckets[next].0 <= bar.timestamp_ms {
            current = Some(next);
            next += 1;
        }
        match current {
            Some(j) => {
                up.push(runs.up[j]);
                down.push(runs.down[j]);
            }
            None => {
                up.push(f64::NAN);
                down.push(f64::NAN);
            }
        }
    }
    RunLengths { up, down }
}
