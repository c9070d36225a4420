/// True range per bar: `max(high - low, |high - prev_close|, |low - prev_close|)`.
///
/// Undefined components are ignored; the first bar has no previous close and
/// reduces to `high - low`.
pub fn true_range(low: &[f64], high: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|i| {
            let mut parts = vec![high[i] - low[i]];
            if i > 0 {
                parts.push((high[i] - close[i - 1]).abs());
                parts.push((low[i] - close[i - 1]).abs());
            }
            parts
                .into_iter()
                .filter(|v| !v.is_nan())
                .fold(f64::NAN, |acc, v| if acc.is_nan() { v } else { acc.max(v) })
        })
        .collect()
}

/// Average true range with Wilder-style recursive smoothing.
///
/// The first `window - 1` values are undefined, the value at `window - 1` is
/// the mean of the first `window` true ranges. Series shorter than `window`
/// are entirely undefined.
pub fn atr(low: &[f64], high: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    assert!(window > 0, "ATR window must be > 0");
    let tr = true_range(low, high, close);
    let mut out = vec![f64::NAN; tr.len()];
    if tr.len() < window {
        return out;
    }
    let w = window as f64;
    out[window - 1] = tr[..window].iter().sum::<f64>() / w;
    for i in window..tr.len() {
        out[i] = (out[i - 1] * (w - 1.0) + tr[i]) / w;
    }
    out
}
