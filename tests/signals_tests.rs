use proptest::prelude::*;

use sandbox_signal::error::{classify, AppError};
use sandbox_signal::model::{Frame, Signal};
use sandbox_signal::signals::{quantile, SignalModel, SignalSettings, Thresholds};

fn predictions(columns: usize, rows: usize) -> Frame {
    let mut frame = Frame::new((0..rows as u64).collect());
    for c in 0..columns {
        frame
            .push_column(&format!("pred_{}", c + 1), (0..rows).map(|r| r as f64).collect())
            .expect("column");
    }
    frame
}

#[test]
fn quantile_interpolates_linearly() {
    let values = [4.0, 1.0, 3.0, 2.0, f64::NAN];
    assert!((quantile(&values, 0.0) - 1.0).abs() < f64::EPSILON);
    assert!((quantile(&values, 0.5) - 2.5).abs() < f64::EPSILON);
    assert!((quantile(&values, 1.0) - 4.0).abs() < f64::EPSILON);
    assert!(quantile(&[], 0.5).is_nan());
}

#[test]
fn aggregate_above_threshold_is_long() {
    let settings = SignalSettings {
        aggregate_threshold: 3,
        ..SignalSettings::default()
    };
    let (model, tagged) = SignalModel::fit(&predictions(4, 11), settings).expect("fit");

    for th in model.thresholds().values() {
        assert!((th.low - 3.0).abs() < 1e-12);
        assert!((th.high - 7.0).abs() < 1e-12);
    }
    // All four columns agree on every row.
    assert_eq!(tagged.aggregate[0], -4);
    assert_eq!(tagged.aggregate[5], 0);
    assert_eq!(tagged.aggregate[10], 4);
    assert_eq!(tagged.signals[0], Signal::Short);
    assert_eq!(tagged.signals[5], Signal::Flat);
    assert_eq!(tagged.last_signal(), Some((10, Signal::Long)));
}

#[test]
fn aggregate_equal_to_threshold_stays_flat() {
    let settings = SignalSettings {
        aggregate_threshold: 3,
        ..SignalSettings::default()
    };
    let (_, tagged) = SignalModel::fit(&predictions(3, 11), settings).expect("fit");
    assert_eq!(tagged.aggregate[10], 3);
    assert_eq!(tagged.signals[10], Signal::Flat);
}

#[test]
fn predict_uses_stored_thresholds_and_requires_columns() {
    let (model, _) = SignalModel::fit(&predictions(2, 11), SignalSettings::default()).expect("fit");
    let live = Frame::new(vec![100, 101])
        .with_column("pred_1", vec![50.0, -50.0])
        .expect("pred_1")
        .with_column("pred_2", vec![50.0, 5.0])
        .expect("pred_2");
    let tagged = model.predict(&live).expect("predict");
    assert_eq!(tagged.tags["pred_1"], vec![1, -1]);
    assert_eq!(tagged.tags["pred_2"], vec![1, 0]);
    assert_eq!(tagged.aggregate, vec![2, -1]);

    let missing = Frame::new(vec![1]).with_column("pred_1", vec![0.0]).expect("pred_1");
    let err = model.predict(&missing).unwrap_err();
    assert!(matches!(classify(&err), Some(AppError::Data(_))));
}

#[test]
fn invalid_quantiles_are_config_errors() {
    let settings = SignalSettings {
        low_quantile: 0.9,
        high_quantile: 0.1,
        aggregate_threshold: 3,
    };
    let err = SignalModel::fit(&predictions(1, 5), settings).unwrap_err();
    assert!(matches!(classify(&err), Some(AppError::Config(_))));
}

#[test]
fn thresholds_survive_save_and_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("BTCUSDT").join("signal_thresholds.json");
    assert!(SignalModel::load(&path).expect("load").is_none());

    let (model, _) = SignalModel::fit(&predictions(2, 21), SignalSettings::default()).expect("fit");
    model.save(&path).expect("save");
    let loaded = SignalModel::load(&path).expect("load").expect("saved model");
    assert_eq!(loaded, model);
}

proptest! {
    #[test]
    fn tags_are_monotone_beyond_high(
        low in -100.0f64..0.0,
        spread in 0.0f64..100.0,
        extra in 0.0f64..1_000.0,
    ) {
        let th = Thresholds { low, high: low + spread };
        let above = th.high + extra + 1e-6;
        prop_assert_eq!(th.tag(above), 1);
        prop_assert!(th.tag(above + 1.0) >= th.tag(above));
        prop_assert_eq!(th.tag(th.low - extra - 1e-6), -1);
        prop_assert_eq!(th.tag(f64::NAN), 0);
    }
}
