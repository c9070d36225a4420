//! Trailing-window reductions that skip undefined values.

fn window_values(series: &[f64], end: usize, window: usize) -> impl Iterator<Item = f64> + '_ {
    let start = (end + 1).saturating_sub(window);
    series[start..=end].iter().copied().filter(|v| !v.is_nan())
}

fn reduce(
    series: &[f64],
    window: usize,
    min_periods: usize,
    f: impl Fn(&mut dyn Iterator<Item = f64>) -> f64,
) -> Vec<f64> {
    assert!(window > 0, "rolling window must be > 0");
    let min_count = min_periods.max(1);
    (0..series.len())
        .map(|i| {
            let count = window_values(series, i, window).count();
            if count >= min_count {
                f(&mut window_values(series, i, window))
            } else {
                f64::NAN
            }
        })
        .collect()
}

pub fn rolling_min(series: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    reduce(series, window, min_periods, |it| it.fold(f64::INFINITY, f64::min))
}

pub fn rolling_max(series: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    reduce(series, window, min_periods, |it| {
        it.fold(f64::NEG_INFINITY, f64::max)
    })
}

/// Sample standard deviation (ddof = 1); needs two defined values regardless of `min_periods`.
pub fn rolling_std(series: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    reduce(series, window, min_periods, |it| {
        let values: Vec<f64> = it.collect();
        sample_std(&values)
    })
}

pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// `series[i] - series[i - 1]`; the first position is undefined.
pub fn diff(series: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; series.len()];
    for i in 1..series.len() {
        out[i] = series[i] - series[i - 1];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_over_partial_windows() {
        let s = [3.0, 1.0, 4.0, 1.0, 5.0];
        let lo = rolling_min(&s, 3, 0);
        let hi = rolling_max(&s, 3, 0);
        assert_eq!(lo, vec![3.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(hi, vec![3.0, 3.0, 4.0, 4.0, 5.0]);
    }

    #[test]
    fn std_uses_sample_denominator() {
        let out = rolling_std(&[1.0, 2.0, 3.0, 4.0], 4, 0);
        assert!(out[0].is_nan());
        assert!((out[1] - (0.5f64).sqrt()).abs() < 1e-12);
        assert!((out[3] - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn diff_leaves_first_undefined() {
        let d = diff(&[1.0, 4.0, 2.0]);
        assert!(d[0].is_nan());
        assert_eq!(&d[1..], &[3.0, -2.0]);
    }
}
