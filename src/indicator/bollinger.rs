use serde::Deserialize;

use super::rolling::rolling_std;
use super::sma::sma;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandMode {
    #[default]
    Ranges,
    Spread,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub lower: Vec<f64>,
    pub middle: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bands {
    /// Relative band width `(upper - lower) / middle`.
    pub fn spread(&self) -> Vec<f64> {
        self.upper
            .iter()
            .zip(self.lower.iter().zip(self.middle.iter()))
            .map(|(u, (l, m))| (u - l) / m)
            .collect()
    }
}

/// Bollinger bands around `SMA(window)`; the deviation of the first element is 0.
pub fn bollinger(series: &[f64], window: usize, stdev_multiplier: f64, min_periods: usize) -> Bands {
    let middle = sma(series, window, min_periods);
    let mut dev: Vec<f64> = rolling_std(series, window, min_periods)
        .into_iter()
        .map(|s| s * stdev_multiplier)
        .collect();
    if let Some(first) = dev.first_mut() {
        *first = 0.0;
    }
    let upper = middle.iter().zip(dev.iter()).map(|(m, d)| m + d).collect();
    let lower = middle.iter().zip(dev.iter()).map(|(m, d)| m - d).collect();
    Bands {
        lower,
        middle,
        upper,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_band_collapses_onto_middle() {
        let bands = bollinger(&[10.0, 12.0, 14.0], 3, 2.0, 0);
        assert!((bands.upper[0] - 10.0).abs() < 1e-12);
        assert!((bands.lower[0] - 10.0).abs() < 1e-12);
        let std = (2.0f64).sqrt();
        assert!((bands.middle[1] - 11.0).abs() < 1e-12);
        assert!((bands.upper[1] - (11.0 + 2.0 * std)).abs() < 1e-12);
    }

    #[test]
    fn spread_is_relative_width() {
        let bands = bollinger(&[10.0, 10.0, 10.0], 3, 2.0, 0);
        assert!(bands.spread().iter().all(|v| v.abs() < 1e-12));
    }
}
