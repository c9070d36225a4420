use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use ndarray::{array, Array1, Array2, ArrayView1, ArrayView2};

use sandbox_signal::ensemble::folds::{kfold, stratified_kfold};
use sandbox_signal::ensemble::{
    prediction_column, train, Estimator, EstimatorKind, EstimatorSpec, LinearRegression,
    RandomForest, TrainOptions,
};
use sandbox_signal::error::{classify, AppError};
use sandbox_signal::features::horizon_column;
use sandbox_signal::model::Frame;

fn features(n: usize) -> Frame {
    let index: Vec<u64> = (0..n as u64).collect();
    Frame::new(index)
        .with_column("x", (0..n).map(|i| i as f64).collect())
        .expect("x")
        .with_column("z", (0..n).map(|i| ((i * 7) % 11) as f64).collect())
        .expect("z")
}

/// `target_h = h * x + 1` with the last `h` rows undefined.
fn targets(n: usize, horizons: &[usize]) -> Frame {
    let mut frame = Frame::new((0..n as u64).collect());
    for &h in horizons {
        let values = (0..n)
            .map(|i| if i + h < n { h as f64 * i as f64 + 1.0 } else { f64::NAN })
            .collect();
        frame.push_column(&horizon_column(h), values).expect("target");
    }
    frame
}

fn options(horizons: Vec<usize>) -> TrainOptions {
    TrainOptions {
        horizons,
        folds: 4,
        seed: 7,
    }
}

#[test]
fn linear_regression_recovers_exact_relation() {
    let x: Array2<f64> = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0]];
    let y = array![1.0, 3.0, 5.0, 7.0, 9.0];
    let mut model = LinearRegression::new(0.0);
    model.fit(x.view(), y.view()).expect("fit");
    let w = model.weights().expect("weights");
    assert!((w[0] - 2.0).abs() < 1e-9);
    assert!(w[1].abs() < 1e-9);
    assert!((model.bias() - 1.0).abs() < 1e-9);
}

#[test]
fn folds_partition_every_row_once() {
    let splits = kfold(10, 3, 1).expect("kfold");
    let mut seen: Vec<usize> = splits.iter().flat_map(|s| s.test.clone()).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
    let sizes: Vec<usize> = splits.iter().map(|s| s.test.len()).collect();
    assert_eq!(sizes, vec![4, 3, 3]);

    let labels = [1, 1, 1, 1, -1, -1, -1, -1];
    for split in stratified_kfold(&labels, 2, 3).expect("stratified") {
        let ups = split.test.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!(ups, 2);
    }
    assert!(kfold(3, 1, 0).is_err());
    assert!(kfold(2, 3, 0).is_err());
}

#[test]
fn trainer_produces_oof_and_refit_per_horizon() {
    let n = 60;
    let horizons = vec![2, 5];
    let ensemble = train(
        &features(n),
        &targets(n, &horizons),
        &LinearRegression::default(),
        &options(horizons.clone()),
    )
    .expect("train");

    assert_eq!(ensemble.horizons(), horizons);
    assert_eq!(ensemble.feature_names(), &["x".to_string(), "z".to_string()]);
    for m in ensemble.models() {
        assert_eq!(m.oof.len(), n - m.horizon);
        let oof = m.oof.column(&prediction_column(m.horizon)).expect("oof column");
        for (ts, p) in m.oof.index().iter().zip(oof) {
            let truth = m.horizon as f64 * *ts as f64 + 1.0;
            assert!((p - truth).abs() < 1e-3, "h={} ts={} p={}", m.horizon, ts, p);
        }
    }

    let stacked = ensemble.stacked_oof().expect("stacked");
    assert_eq!(stacked.len(), n - 5);
    assert_eq!(stacked.names(), vec!["pred_2", "pred_5"]);

    let live = features(n + 3);
    let preds = ensemble.predict(&live).expect("predict");
    let p5 = preds.column("pred_5").expect("pred_5");
    assert!((p5[n + 2] - (5.0 * (n + 2) as f64 + 1.0)).abs() < 1e-3);
}

#[test]
fn predict_rejects_mismatched_features() {
    let n = 30;
    let ensemble = train(
        &features(n),
        &targets(n, &[2]),
        &LinearRegression::default(),
        &options(vec![2]),
    )
    .expect("train");
    let wrong = Frame::new(vec![0, 1])
        .with_column("x", vec![0.0, 1.0])
        .expect("x");
    let err = ensemble.predict(&wrong).unwrap_err();
    assert!(matches!(classify(&err), Some(AppError::Data(_))));
}

#[test]
fn forest_regressor_tracks_monotone_target() {
    let n = 80;
    let estimator = EstimatorSpec::default().build(11);
    let ensemble = train(&features(n), &targets(n, &[2]), estimator.as_ref(), &options(vec![2]))
        .expect("train forest");
    let preds = ensemble.predict(&features(n)).expect("predict");
    let p = preds.column("pred_2").expect("pred_2");
    assert!(p[70] > p[10]);
}

#[test]
fn forest_classifier_separates_sign_labels() {
    let x: Array2<f64> = Array2::from_shape_fn((40, 1), |(i, _)| i as f64);
    let y = ndarray::Array1::from_shape_fn(40, |i| if i < 20 { -1.0 } else { 1.0 });
    let mut forest = RandomForest::classifier(5, 4, 3);
    forest.fit(x.view(), y.view()).expect("fit");
    let pred = forest.predict(array![[2.0], [37.0]].view()).expect("predict");
    assert!((pred[0] + 1.0).abs() < f64::EPSILON);
    assert!((pred[1] - 1.0).abs() < f64::EPSILON);
}

#[test]
fn unfitted_models_fail_with_model_error() {
    let err = LinearRegression::default()
        .predict(array![[1.0]].view())
        .unwrap_err();
    assert!(matches!(classify(&err), Some(AppError::Model(_))));
}

/// Linear model whose `fit` fails on the `fail_on`-th call across all clones.
#[derive(Debug)]
struct FlakyEstimator {
    inner: LinearRegression,
    calls: Arc<AtomicUsize>,
    fail_on: usize,
}

impl Estimator for FlakyEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Regressor
    }

    fn name(&self) -> &'static str {
        "flaky"
    }

    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(AppError::Model("solver diverged".to_string()).into());
        }
        self.inner.fit(x, y)
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.inner.predict(x)
    }

    fn fresh(&self) -> Box<dyn Estimator> {
        Box::new(FlakyEstimator {
            inner: LinearRegression::default(),
            calls: Arc::clone(&self.calls),
            fail_on: self.fail_on,
        })
    }
}

#[test]
fn failing_fold_aborts_the_whole_run() {
    let n = 40;
    let horizons = vec![2, 5];
    let calls = Arc::new(AtomicUsize::new(0));
    // Horizon 2 uses 4 folds plus the refit, so call 5 is horizon 5's first fold.
    let flaky = FlakyEstimator {
        inner: LinearRegression::default(),
        calls: Arc::clone(&calls),
        fail_on: 5,
    };
    let err = train(&features(n), &targets(n, &horizons), &flaky, &options(horizons))
        .unwrap_err();
    assert!(matches!(classify(&err), Some(AppError::Model(_))));
    assert!(format!("{:#}", err).contains("fold 1 of horizon 5"));
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[test]
fn classifier_trains_on_sign_labels_with_stratified_folds() {
    let n = 60;
    let mut sign_targets = Frame::new((0..n as u64).collect());
    sign_targets
        .push_column(
            &horizon_column(2),
            (0..n)
                .map(|i| if i + 2 < n { i as f64 - 29.5 } else { f64::NAN })
                .collect(),
        )
        .expect("target");

    let classifier = RandomForest::classifier(10, 4, 3).with_max_features(2);
    let ensemble = train(&features(n), &sign_targets, &classifier, &options(vec![2]))
        .expect("train classifier");

    let model = &ensemble.models()[0];
    assert_eq!(model.estimator.kind(), EstimatorKind::Classifier);
    let oof = model.oof.column(&prediction_column(2)).expect("oof");
    assert_eq!(oof.len(), n - 2);
    for p in oof {
        let label = p / model.scale;
        assert!((label.abs() - 1.0).abs() < 1e-12, "label {}", label);
    }

    let preds = ensemble.predict(&features(n)).expect("predict");
    let p = preds.column("pred_2").expect("pred_2");
    assert!(p[2] < 0.0);
    assert!(p[57] > 0.0);
}
