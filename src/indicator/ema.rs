/// Exponentially weighted mean with `alpha = 2 / (span + 1)` and no bias adjustment.
///
/// Undefined inputs keep the previous mean but still decay its weight, so the
/// next defined value pulls harder. A position is defined once
/// `max(min_periods, 1)` defined values have been observed.
pub fn ema(series: &[f64], span: usize, min_periods: usize) -> Vec<f64> {
    assert!(span > 0, "EMA span must be > 0");
    let alpha = 2.0 / (span as f64 + 1.0);
    let min_count = min_periods.max(1);

    let mut out = Vec::with_capacity(series.len());
    let mut weighted = f64::NAN;
    let mut old_wt = 1.0;
    let mut nobs = 0usize;

    for &cur in series {
        let valid = !cur.is_nan();
        if valid {
            nobs += 1;
        }
        if weighted.is_nan() {
            if valid {
                weighted = cur;
                old_wt = 1.0;
            }
        } else {
            old_wt *= 1.0 - alpha;
            if valid {
                if weighted != cur {
                    weighted = (old_wt * weighted + alpha * cur) / (old_wt + alpha);
                }
                old_wt = 1.0;
            }
        }
        out.push(if nobs >= min_count { weighted } else { f64::NAN });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_first_value_and_smooths() {
        // span 3 => alpha 0.5
        let out = ema(&[2.0, 4.0, 8.0], 3, 0);
        assert!((out[0] - 2.0).abs() < 1e-12);
        assert!((out[1] - 3.0).abs() < 1e-12);
        assert!((out[2] - 5.5).abs() < 1e-12);
    }

    #[test]
    fn gap_decays_the_old_weight() {
        // after a NaN the old weight is 0.25, so the next value gets weight 0.5/(0.25+0.5)
        let out = ema(&[2.0, f64::NAN, 8.0], 3, 0);
        assert!((out[1] - 2.0).abs() < 1e-12);
        let expected = (0.25 * 2.0 + 0.5 * 8.0) / 0.75;
        assert!((out[2] - expected).abs() < 1e-12);
    }

    #[test]
    fn min_periods_masks_the_warmup() {
        let out = ema(&[1.0, 1.0, 1.0, 1.0], 10, 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!((out[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn leading_undefined_values_stay_undefined() {
        let out = ema(&[f64::NAN, f64::NAN, 5.0], 4, 0);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!((out[2] - 5.0).abs() < 1e-12);
    }
}
