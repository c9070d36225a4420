pub mod folds;
pub mod forest;
pub mod linear;

use anyhow::{Context, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::Deserialize;

use crate::error::AppError;
use crate::features::horizon_column;
use crate::indicator::rolling::sample_std;
use crate::model::Frame;

pub use forest::RandomForest;
pub use linear::LinearRegression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorKind {
    Regressor,
    Classifier,
}

/// A supervised model the trainer can cross-validate and refit.
pub trait Estimator: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> EstimatorKind;
    fn name(&self) -> &'static str;
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()>;
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;
    /// Unfitted estimator with the same hyper-parameters.
    fn fresh(&self) -> Box<dyn Estimator>;
}

pub(crate) fn check_shapes(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(AppError::Model("empty training set".to_string()).into());
    }
    if x.nrows() != y.len() {
        return Err(AppError::Model(format!(
            "dimension mismatch: {} feature rows, {} targets",
            x.nrows(),
            y.len()
        ))
        .into());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LinearParams {
    pub alpha: f64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self { alpha: 1e-3 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub max_features: Option<usize>,
    pub classifier: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 10,
            max_depth: 8,
            min_samples_split: 2,
            max_features: None,
            classifier: false,
        }
    }
}

/// Estimator selection from configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorSpec {
    Linear(LinearParams),
    RandomForest(ForestParams),
}

impl Default for EstimatorSpec {
    fn default() -> Self {
        Self::RandomForest(ForestParams::default())
    }
}

impl EstimatorSpec {
    pub fn build(&self, seed: u64) -> Box<dyn Estimator> {
        match self {
            Self::Linear(p) => Box::new(LinearRegression::new(p.alpha)),
            Self::RandomForest(p) => {
                let rf = if p.classifier {
                    RandomForest::classifier(p.n_trees, p.max_depth, seed)
                } else {
                    RandomForest::regressor(p.n_trees, p.max_depth, seed)
                }
                .with_min_samples_split(p.min_samples_split);
                Box::new(match p.max_features {
                    Some(n) => rf.with_max_features(n),
                    None => rf,
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub horizons: Vec<usize>,
    pub folds: usize,
    pub seed: u64,
}

pub fn prediction_column(h: usize) -> String {
    format!("pred_{}", h)
}

/// Fitted model for one horizon plus the data needed to calibrate signals.
#[derive(Debug)]
pub struct HorizonModel {
    pub horizon: usize,
    /// Sample std-dev of the horizon's target at fit time.
    pub scale: f64,
    pub estimator: Box<dyn Estimator>,
    /// Out-of-fold predictions in target units, column `pred_<h>`.
    pub oof: Frame,
}

#[derive(Debug)]
pub struct Ensemble {
    feature_names: Vec<String>,
    models: Vec<HorizonModel>,
}

impl Ensemble {
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn models(&self) -> &[HorizonModel] {
        &self.models
    }

    pub fn horizons(&self) -> Vec<usize> {
        self.models.iter().map(|m| m.horizon).collect()
    }

    /// Out-of-fold predictions of every horizon inner-joined on timestamp.
    pub fn stacked_oof(&self) -> Result<Frame> {
        let mut iter = self.models.iter();
        let first = iter
            .next()
            .ok_or_else(|| AppError::Model("ensemble has no horizons".to_string()))?;
        let mut out = first.oof.clone();
        for m in iter {
            out = out.inner_join(&m.oof)?;
        }
        Ok(out.drop_undefined())
    }

    /// One `pred_<h>` column per horizon, in target units.
    pub fn predict(&self, features: &Frame) -> Result<Frame> {
        let names: Vec<&str> = features.names();
        if names.len() != self.feature_names.len()
            || names.iter().zip(&self.feature_names).any(|(a, b)| *a != b.as_str())
        {
            return Err(AppError::Data(format!(
                "feature columns {:?} do not match training columns {:?}",
                names, self.feature_names
            ))
            .into());
        }
        let x = features.to_array();
        let mut out = Frame::new(features.index().to_vec());
        for m in &self.models {
            let pred = m
                .estimator
                .predict(x.view())
                .with_context(|| format!("predicting horizon {}", m.horizon))?;
            out.push_column(
                &prediction_column(m.horizon),
                pred.iter().map(|v| v * m.scale).collect(),
            )?;
        }
        Ok(out)
    }
}

fn target_scale(y: &[f64]) -> f64 {
    let s = sample_std(y);
    if s.is_finite() && s > 0.0 {
        s
    } else {
        1.0
    }
}

/// Cross-validate and refit one estimator per horizon.
///
/// `features` must hold only defined rows; `targets` holds one `target_<h>`
/// column per horizon over any superset of the feature timestamps. Any fold
/// failure aborts the whole run.
pub fn train(
    features: &Frame,
    targets: &Frame,
    estimator: &dyn Estimator,
    options: &TrainOptions,
) -> Result<Ensemble> {
    if features.width() == 0 {
        return Err(AppError::Data("feature matrix has no columns".to_string()).into());
    }
    let mut models = Vec::with_capacity(options.horizons.len());

    for &h in &options.horizons {
        let span = tracing::info_span!("horizon", horizon = h);
        let _enter = span.enter();

        let target_name = horizon_column(h);
        let aligned = features.inner_join(
            &Frame::new(targets.index().to_vec()).with_column(
                &target_name,
                targets
                    .column(&target_name)
                    .ok_or_else(|| AppError::Data(format!("missing target '{}'", target_name)))?
                    .to_vec(),
            )?,
        )?;
        let aligned = aligned.drop_undefined();
        let y_raw = aligned
            .column(&target_name)
            .ok_or_else(|| AppError::Data(format!("missing target '{}'", target_name)))?
            .to_vec();
        let x_frame = features.select_timestamps(&aligned.index().iter().copied().collect());
        let x = x_frame.to_array();

        let scale = target_scale(&y_raw);
        let y: Array1<f64> = match estimator.kind() {
            EstimatorKind::Regressor => y_raw.iter().map(|v| v / scale).collect(),
            EstimatorKind::Classifier => y_raw.iter().map(|v| sign_label(*v)).collect(),
        };

        let splits = match estimator.kind() {
            EstimatorKind::Regressor => folds::kfold(y.len(), options.folds, options.seed),
            EstimatorKind::Classifier => {
                let labels: Vec<i64> = y.iter().map(|v| *v as i64).collect();
                folds::stratified_kfold(&labels, options.folds, options.seed)
            }
        }
        .with_context(|| format!("splitting horizon {}", h))?;

        let mut oof = vec![f64::NAN; y.len()];
        for (k, split) in splits.iter().enumerate() {
            let mut est = estimator.fresh();
            let x_train = x.select(ndarray::Axis(0), &split.train);
            let y_train = y.select(ndarray::Axis(0), &split.train);
            est.fit(x_train.view(), y_train.view())
                .with_context(|| format!("fitting fold {} of horizon {}", k + 1, h))?;
            let x_test = x.select(ndarray::Axis(0), &split.test);
            let pred = est
                .predict(x_test.view())
                .with_context(|| format!("predicting fold {} of horizon {}", k + 1, h))?;
            for (&row, p) in split.test.iter().zip(pred.iter()) {
                oof[row] = p * scale;
            }
        }

        let mut deployed = estimator.fresh();
        deployed
            .fit(x.view(), y.view())
            .with_context(|| format!("refitting horizon {}", h))?;

        tracing::info!(
            rows = y.len(),
            folds = splits.len(),
            scale,
            estimator = deployed.name(),
            "horizon trained"
        );

        models.push(HorizonModel {
            horizon: h,
            scale,
            estimator: deployed,
            oof: Frame::new(x_frame.index().to_vec()).with_column(&prediction_column(h), oof)?,
        });
    }

    Ok(Ensemble {
        feature_names: features.names().iter().map(|s| s.to_string()).collect(),
        models,
    })
}

fn sign_label(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}
