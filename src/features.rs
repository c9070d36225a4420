use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};

use crate::error::AppError;
use crate::indicator::IndicatorSpec;
use crate::model::bar::Bar;
use crate::model::Frame;

pub const DEFAULT_HORIZONS: [usize; 6] = [2, 5, 10, 25, 50, 100];

/// Declarative set of indicators turned into one feature matrix.
///
/// Output columns are `<name>_<indicator column>` in name order, so the
/// column set depends only on the configuration.
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    indicators: BTreeMap<String, IndicatorSpec>,
}

impl FeaturePipeline {
    pub fn new(indicators: BTreeMap<String, IndicatorSpec>) -> Result<Self> {
        if indicators.is_empty() {
            return Err(AppError::Config("no indicators configured".to_string()).into());
        }
        for (name, spec) in &indicators {
            spec.validate()
                .with_context(|| format!("indicator '{}'", name))?;
        }
        Ok(Self { indicators })
    }

    pub fn indicators(&self) -> &BTreeMap<String, IndicatorSpec> {
        &self.indicators
    }

    /// All indicator outputs outer-joined on timestamp; undefined values are kept.
    pub fn compute(&self, bars: &[Bar]) -> Result<Frame> {
        if bars.is_empty() {
            return Err(AppError::Data("no bars to compute features from".to_string()).into());
        }
        let mut seen: HashSet<String> = HashSet::new();
        let mut out: Option<Frame> = None;
        for (name, spec) in &self.indicators {
            let frame = spec
                .compute(bars)
                .with_context(|| format!("indicator '{}' ({})", name, spec.kind_name()))?
                .prefixed(name);
            for col in frame.names() {
                if !seen.insert(col.to_string()) {
                    return Err(AppError::Config(format!(
                        "feature column '{}' produced twice; rename indicator '{}'",
                        col, name
                    ))
                    .into());
                }
            }
            out = Some(match out {
                None => frame,
                Some(acc) => acc.outer_join(&frame)?,
            });
        }
        out.ok_or_else(|| AppError::Config("no indicators configured".to_string()).into())
    }

    /// Feature rows with every column defined.
    pub fn feature_matrix(&self, bars: &[Bar]) -> Result<Frame> {
        let matrix = self.compute(bars)?.drop_undefined();
        tracing::debug!(
            bars = bars.len(),
            rows = matrix.len(),
            columns = matrix.width(),
            "feature matrix built"
        );
        Ok(matrix)
    }
}

pub fn horizon_column(h: usize) -> String {
    format!("target_{}", h)
}

/// Forward differences `price[t + h] - price[t]`, one column per horizon.
///
/// The last `h` rows of each column are undefined.
pub fn get_target(index: &[u64], prices: &[f64], horizons: &[usize]) -> Result<Frame> {
    if index.len() != prices.len() {
        return Err(AppError::Data(format!(
            "target index has {} timestamps for {} prices",
            index.len(),
            prices.len()
        ))
        .into());
    }
    let mut frame = Frame::new(index.to_vec());
    for &h in horizons {
        if h == 0 {
            return Err(AppError::Config("target horizon must be > 0".to_string()).into());
        }
        let values = (0..prices.len())
            .map(|t| {
                if t + h < prices.len() {
                    prices[t + h] - prices[t]
                } else {
                    f64::NAN
                }
            })
            .collect();
        frame.push_column(&horizon_column(h), values)?;
    }
    Ok(frame)
}
