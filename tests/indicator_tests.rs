use proptest::prelude::*;

use sandbox_signal::indicator::atr::atr;
use sandbox_signal::indicator::ema::ema;
use sandbox_signal::indicator::macd::macd;
use sandbox_signal::indicator::pivot::{pivot_deviation, PivotMode, PIVOT_LEVELS};
use sandbox_signal::indicator::rsi::rsi;
use sandbox_signal::indicator::sma::sma;
use sandbox_signal::indicator::IndicatorSpec;
use sandbox_signal::model::Bar;

const HOUR_MS: u64 = 3_600_000;

fn rising_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + i as f64;
            Bar {
                timestamp_ms: 1_700_000_000_000 + i as u64 * 900_000,
                open: close - 0.5,
                high: close + 0.5,
                low: close - 1.0,
                close,
                volume: 10.0,
            }
        })
        .collect()
}

#[test]
fn sma_warm_up_then_trailing_mean() {
    let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3, 3);
    assert!(out[0].is_nan() && out[1].is_nan());
    assert!((out[2] - 2.0).abs() < f64::EPSILON);
    assert!((out[3] - 3.0).abs() < f64::EPSILON);
    assert!((out[4] - 4.0).abs() < f64::EPSILON);
}

#[test]
fn ema_seeds_with_first_value() {
    let out = ema(&[10.0, 20.0], 3, 0);
    assert!((out[0] - 10.0).abs() < f64::EPSILON);
    // alpha = 0.5
    assert!((out[1] - 15.0).abs() < 1e-12);
}

#[test]
fn rising_closes_give_positive_plateauing_macd() {
    let closes: Vec<f64> = rising_bars(100).iter().map(|b| b.close).collect();
    let out = macd(&closes, 12, 26, 9);
    let tail = &out.macd[80..];
    assert!(tail.iter().all(|v| *v > 0.0));
    let late_change = (out.macd[99] - out.macd[98]).abs();
    let early_change = (out.macd[10] - out.macd[9]).abs();
    assert!(late_change < early_change);
    assert!(late_change < 0.05);
}

#[test]
fn rising_closes_drive_rsi_to_100() {
    let closes: Vec<f64> = rising_bars(100).iter().map(|b| b.close).collect();
    let out = rsi(&closes, 14, 0);
    assert!((out[0] - 50.0).abs() < f64::EPSILON);
    assert!((out[99] - 100.0).abs() < 1e-9);
}

#[test]
fn constant_series_rsi_is_fifty() {
    let out = rsi(&[5.0; 30], 14, 0);
    assert!(out.iter().all(|v| (v - 50.0).abs() < f64::EPSILON));
}

#[test]
fn pivot_first_day_is_undefined() {
    let ts: Vec<u64> = (0..48).map(|i| 1_700_006_400_000 + i * HOUR_MS).collect();
    let values: Vec<f64> = (0..48).map(|i| 100.0 + (i % 7) as f64).collect();
    let out = pivot_deviation(&ts, &values, PivotMode::Day);
    assert_eq!(out.len(), PIVOT_LEVELS.len());

    let first_day_end = ts
        .iter()
        .position(|t| t / 86_400_000 != ts[0] / 86_400_000)
        .expect("two days of data");
    for col in &out {
        assert!(col[..first_day_end].iter().all(|v| v.is_nan()));
        assert!(col[first_day_end..].iter().all(|v| v.is_finite()));
    }
}

#[test]
fn unknown_source_column_is_reported() {
    let spec: IndicatorSpec = toml::from_str(
        r#"
kind = "sma"
column = "vwap"
window = 3
"#,
    )
    .expect("spec");
    assert!(spec.compute(&rising_bars(10)).is_err());
}

#[test]
fn aliases_select_indicator_kinds() {
    let spec: IndicatorSpec = toml::from_str("kind = \"bbands\"\nmode = \"spread\"").expect("bbands");
    let frame = spec.compute(&rising_bars(30)).expect("bands");
    assert_eq!(frame.names(), vec!["spread"]);

    let spec: IndicatorSpec = toml::from_str("kind = \"fstoc\"").expect("fstoc");
    let frame = spec.compute(&rising_bars(30)).expect("stoch");
    assert_eq!(frame.names(), vec!["k", "d"]);

    assert!(toml::from_str::<IndicatorSpec>("kind = \"ichimoku\"").is_err());
    assert!(toml::from_str::<IndicatorSpec>("kind = \"rsi\"\nwindwo = 3").is_err());
}

proptest! {
    #[test]
    fn moving_averages_stay_aligned(
        values in prop::collection::vec(1.0f64..1_000.0, 1..200),
        window in 1usize..30,
    ) {
        let s = sma(&values, window, window);
        let e = ema(&values, window, window);
        prop_assert_eq!(s.len(), values.len());
        prop_assert_eq!(e.len(), values.len());
        let defined = s.iter().filter(|v| !v.is_nan()).count();
        prop_assert!(defined <= values.len().saturating_sub(window - 1));
        prop_assert_eq!(defined, values.len().saturating_sub(window - 1));
    }

    #[test]
    fn rsi_is_bounded(values in prop::collection::vec(1.0f64..1_000.0, 2..200), window in 1usize..30) {
        for v in rsi(&values, window, 0) {
            prop_assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn atr_recomputation_is_idempotent(
        closes in prop::collection::vec(10.0f64..100.0, 2..120),
        window in 1usize..20,
    ) {
        let high: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();
        let first = atr(&low, &high, &closes, window);
        let second = atr(&low, &high, &closes, window);
        prop_assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            prop_assert!((a.is_nan() && b.is_nan()) || a == b);
        }
    }
}
