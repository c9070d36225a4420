use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::{Frame, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    pub low_quantile: f64,
    pub high_quantile: f64,
    pub aggregate_threshold: i32,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            low_quantile: 0.3,
            high_quantile: 0.7,
            aggregate_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    /// `+1` above `high`, `-1` below `low`, otherwise 0. Undefined values and
    /// undefined thresholds tag 0.
    pub fn tag(&self, value: f64) -> i32 {
        if value > self.high {
            1
        } else if value < self.low {
            -1
        } else {
            0
        }
    }
}

/// Per-row tags, their sum and the resulting signal.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedFrame {
    pub index: Vec<u64>,
    pub tags: BTreeMap<String, Vec<i32>>,
    pub aggregate: Vec<i32>,
    pub signals: Vec<Signal>,
}

impl TaggedFrame {
    pub fn last_signal(&self) -> Option<(u64, Signal)> {
        Some((*self.index.last()?, *self.signals.last()?))
    }
}

/// Linear-interpolated quantile of the defined values (`NaN` when there are none).
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Quantile thresholds learnt from training-time predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalModel {
    settings: SignalSettings,
    thresholds: BTreeMap<String, Thresholds>,
}

impl SignalModel {
    /// Learn per-column thresholds and return the tagged training frame.
    pub fn fit(predictions: &Frame, settings: SignalSettings) -> Result<(Self, TaggedFrame)> {
        if !(0.0..=1.0).contains(&settings.low_quantile)
            || !(0.0..=1.0).contains(&settings.high_quantile)
            || settings.low_quantile > settings.high_quantile
        {
            return Err(AppError::Config(format!(
                "invalid signal quantiles ({}, {})",
                settings.low_quantile, settings.high_quantile
            ))
            .into());
        }
        let thresholds = predictions
            .columns()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    Thresholds {
                        low: quantile(values, settings.low_quantile),
                        high: quantile(values, settings.high_quantile),
                    },
                )
            })
            .collect();
        let model = Self {
            settings,
            thresholds,
        };
        let tagged = model.predict(predictions)?;
        tracing::info!(
            columns = model.thresholds.len(),
            rows = predictions.len(),
            "signal thresholds fitted"
        );
        Ok((model, tagged))
    }

    pub fn settings(&self) -> SignalSettings {
        self.settings
    }

    pub fn thresholds(&self) -> &BTreeMap<String, Thresholds> {
        &self.thresholds
    }

    /// Tag new predictions with the stored thresholds; never refits.
    pub fn predict(&self, predictions: &Frame) -> Result<TaggedFrame> {
        let n = predictions.len();
        let mut tags = BTreeMap::new();
        let mut aggregate = vec![0i32; n];
        for (name, th) in &self.thresholds {
            let values = predictions.column(name).ok_or_else(|| {
                AppError::Data(format!("prediction column '{}' is missing", name))
            })?;
            let col: Vec<i32> = values.iter().map(|v| th.tag(*v)).collect();
            for (acc, t) in aggregate.iter_mut().zip(col.iter()) {
                *acc += t;
            }
            tags.insert(name.clone(), col);
        }
        let signals = aggregate
            .iter()
            .map(|a| Signal::from_aggregate(*a, self.settings.aggregate_threshold))
            .collect();
        Ok(TaggedFrame {
            index: predictions.index().to_vec(),
            tags,
            aggregate,
            signals,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload = serde_json::to_string_pretty(self)?;
        std::fs::write(path, payload)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let payload = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let model = serde_json::from_str(&payload)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_interpolates_linearly() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&v, 0.0) - 1.0).abs() < 1e-12);
        assert!((quantile(&v, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&v, 0.3) - 1.9).abs() < 1e-12);
        assert!(quantile(&[f64::NAN], 0.5).is_nan());
    }

    #[test]
    fn undefined_thresholds_tag_zero() {
        let th = Thresholds {
            low: f64::NAN,
            high: f64::NAN,
        };
        assert_eq!(th.tag(5.0), 0);
        let th = Thresholds { low: 0.0, high: 1.0 };
        assert_eq!(th.tag(f64::NAN), 0);
        assert_eq!(th.tag(2.0), 1);
        assert_eq!(th.tag(-1.0), -1);
        assert_eq!(th.tag(1.0), 0);
    }

    #[test]
    fn rejects_inverted_quantiles() {
        let frame = Frame::new(vec![1]).with_column("pred_2", vec![1.0]).expect("frame");
        let settings = SignalSettings {
            low_quantile: 0.8,
            high_quantile: 0.2,
            aggregate_threshold: 3,
        };
        assert!(SignalModel::fit(&frame, settings).is_err());
    }
}
