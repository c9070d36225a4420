use super::sma::sma;

/// Relative strength index from arithmetic rolling means of gains and losses.
///
/// The first change is 0 and undefined changes count as 0. A zero (or
/// undefined) denominator reads 50. With `min_periods > 0` the first
/// `min_periods - 1` values are undefined.
pub fn rsi(series: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    let mut ups = Vec::with_capacity(series.len());
    let mut downs = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        let change = if i == 0 {
            0.0
        } else {
            series[i] - series[i - 1]
        };
        ups.push(if change > 0.0 { change } else { 0.0 });
        downs.push(if change < 0.0 { -change } else { 0.0 });
    }

    let avg_up = sma(&ups, window, min_periods);
    let avg_down = sma(&downs, window, min_periods);

    let mut out: Vec<f64> = avg_up
        .iter()
        .zip(avg_down.iter())
        .map(|(u, d)| {
            let total = u + d;
            if total.is_nan() || total <= 0.0 {
                50.0
            } else {
                (u / total * 100.0).clamp(0.0, 100.0)
            }
        })
        .collect();

    if min_periods > 0 {
        for v in out.iter_mut().take(min_periods - 1) {
            *v = f64::NAN;
        }
    }
    out
}
