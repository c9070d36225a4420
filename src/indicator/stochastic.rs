use super::rolling::{rolling_max, rolling_min};
use super::sma::sma;

#[derive(Debug, Clone, PartialEq)]
pub struct StochasticOutput {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

/// Stochastic oscillator.
///
/// `%K = (close - lowest_low) / (highest_high - lowest_low) * 100` over `window`
/// bars, optionally smoothed by `SMA(k_smooth)` (0 disables), and
/// `%D = SMA(%K, d_smooth)`. With `min_periods > 0` the first `min_periods`
/// values of the raw `%K` are undefined. A flat window yields an undefined `%K`.
pub fn stochastic(
    low: &[f64],
    high: &[f64],
    close: &[f64],
    window: usize,
    k_smooth: usize,
    d_smooth: usize,
    min_periods: usize,
) -> StochasticOutput {
    let lowest = rolling_min(low, window, 0);
    let highest = rolling_max(high, window, 0);

    let mut k: Vec<f64> = close
        .iter()
        .zip(lowest.iter().zip(highest.iter()))
        .map(|(c, (lo, hi))| {
            let range = hi - lo;
            if range == 0.0 {
                f64::NAN
            } else {
                (c - lo) / range * 100.0
            }
        })
        .collect();

    for v in k.iter_mut().take(min_periods) {
        *v = f64::NAN;
    }

    if k_smooth > 0 {
        k = sma(&k, k_smooth, 0);
    }
    let d = sma(&k, d_smooth, 0);
    StochasticOutput { k, d }
}
