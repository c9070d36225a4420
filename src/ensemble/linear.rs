use anyhow::Result;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::{check_shapes, Estimator, EstimatorKind};
use crate::error::AppError;

/// Ridge-regularised least squares with an unpenalised intercept.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    alpha: f64,
    weights: Option<Array1<f64>>,
    bias: f64,
}

impl LinearRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.max(0.0),
            weights: None,
            bias: 0.0,
        }
    }

    pub fn weights(&self) -> Option<&Array1<f64>> {
        self.weights.as_ref()
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new(1e-3)
    }
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting.
pub(crate) fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < 1e-12 {
            return Err(AppError::Model("singular normal equations".to_string()).into());
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}

impl Estimator for LinearRegression {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Regressor
    }

    fn name(&self) -> &'static str {
        "linear"
    }

    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| AppError::Model("empty training set".to_string()))?;
        let y_mean = y.sum() / y.len() as f64;
        let xc = &x - &x_mean;
        let yc = &y - y_mean;

        let mut gram = xc.t().dot(&xc);
        for i in 0..gram.nrows() {
            gram[[i, i]] += self.alpha;
        }
        let rhs = xc.t().dot(&yc);
        let w = solve(gram, rhs)?;
        self.bias = y_mean - x_mean.dot(&w);
        self.weights = Some(w);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let w = self
            .weights
            .as_ref()
            .ok_or_else(|| AppError::Model("linear model is not fitted".to_string()))?;
        if x.ncols() != w.len() {
            return Err(AppError::Model(format!(
                "expected {} features, got {}",
                w.len(),
                x.ncols()
            ))
            .into());
        }
        Ok(x.dot(w) + self.bias)
    }

    fn fresh(&self) -> Box<dyn Estimator> {
        Box::new(Self::new(self.alpha))
    }
}
