use std::collections::BTreeMap;

use anyhow::Result;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

use super::{check_shapes, Estimator, EstimatorKind};
use crate::error::AppError;

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Internal {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone, Copy)]
struct TreeParams {
    kind: EstimatorKind,
    max_depth: usize,
    min_samples_split: usize,
    max_features: usize,
}

/// Running impurity statistics for one side of a candidate split.
#[derive(Debug, Clone)]
struct SideStats {
    n: usize,
    sum: f64,
    sum_sq: f64,
    counts: Vec<usize>,
}

impl SideStats {
    fn new(n_classes: usize) -> Self {
        Self {
            n: 0,
            sum: 0.0,
            sum_sq: 0.0,
            counts: vec![0; n_classes],
        }
    }

    fn add(&mut self, y: f64, class: usize) {
        self.n += 1;
        self.sum += y;
        self.sum_sq += y * y;
        if let Some(c) = self.counts.get_mut(class) {
            *c += 1;
        }
    }

    fn remove(&mut self, y: f64, class: usize) {
        self.n -= 1;
        self.sum -= y;
        self.sum_sq -= y * y;
        if let Some(c) = self.counts.get_mut(class) {
            *c -= 1;
        }
    }

    /// Total impurity weighted by sample count (SSE or n * gini).
    fn impurity(&self, kind: EstimatorKind) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let n = self.n as f64;
        match kind {
            EstimatorKind::Regressor => (self.sum_sq - self.sum * self.sum / n).max(0.0),
            EstimatorKind::Classifier => {
                let sq: f64 = self.counts.iter().map(|&c| (c as f64 / n).powi(2)).sum();
                n * (1.0 - sq)
            }
        }
    }
}

struct TreeBuilder<'x, 'y> {
    x: ArrayView2<'x, f64>,
    y: ArrayView1<'y, f64>,
    class_of: Vec<usize>,
    classes: Vec<f64>,
    params: TreeParams,
}

impl TreeBuilder<'_, '_> {
    fn leaf_value(&self, rows: &[usize]) -> f64 {
        match self.params.kind {
            EstimatorKind::Regressor => {
                rows.iter().map(|&i| self.y[i]).sum::<f64>() / rows.len().max(1) as f64
            }
            EstimatorKind::Classifier => {
                let mut counts = vec![0usize; self.classes.len()];
                for &i in rows {
                    counts[self.class_of[i]] += 1;
                }
                let best = counts
                    .iter()
                    .enumerate()
                    .max_by_key(|&(_, c)| *c)
                    .map(|(k, _)| k)
                    .unwrap_or(0);
                self.classes.get(best).copied().unwrap_or(0.0)
            }
        }
    }

    fn best_split(&self, rows: &[usize], rng: &mut StdRng) -> Option<(usize, f64)> {
        let n_features = self.x.ncols();
        let features = sample(rng, n_features, self.params.max_features.min(n_features));

        let mut parent = SideStats::new(self.classes.len());
        for &i in rows {
            parent.add(self.y[i], self.class_of[i]);
        }
        let mut best_impurity = parent.impurity(self.params.kind);
        let mut best = None;

        for f in features.iter() {
            let mut order = rows.to_vec();
            order.sort_by(|&a, &b| self.x[[a, f]].total_cmp(&self.x[[b, f]]));

            let mut left = SideStats::new(self.classes.len());
            let mut right = parent.clone();
            for w in 0..order.len() - 1 {
                let i = order[w];
                left.add(self.y[i], self.class_of[i]);
                right.remove(self.y[i], self.class_of[i]);

                let here = self.x[[i, f]];
                let next = self.x[[order[w + 1], f]];
                if here == next {
                    continue;
                }
                let impurity =
                    left.impurity(self.params.kind) + right.impurity(self.params.kind);
                if impurity + 1e-12 < best_impurity {
                    best_impurity = impurity;
                    best = Some((f, (here + next) / 2.0));
                }
            }
        }
        best
    }

    fn build(&self, rows: &[usize], depth: usize, rng: &mut StdRng) -> TreeNode {
        if depth >= self.params.max_depth || rows.len() < self.params.min_samples_split {
            return TreeNode::Leaf {
                value: self.leaf_value(rows),
            };
        }
        let Some((feature_idx, threshold)) = self.best_split(rows, rng) else {
            return TreeNode::Leaf {
                value: self.leaf_value(rows),
            };
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| self.x[[i, feature_idx]] <= threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            return TreeNode::Leaf {
                value: self.leaf_value(rows),
            };
        }
        TreeNode::Internal {
            feature_idx,
            threshold,
            left: Box::new(self.build(&left_rows, depth + 1, rng)),
            right: Box::new(self.build(&right_rows, depth + 1, rng)),
        }
    }
}

fn predict_row(node: &TreeNode, row: ArrayView1<f64>) -> f64 {
    match node {
        TreeNode::Leaf { value } => *value,
        TreeNode::Internal {
            feature_idx,
            threshold,
            left,
            right,
        } => {
            if row[*feature_idx] <= *threshold {
                predict_row(left, row)
            } else {
                predict_row(right, row)
            }
        }
    }
}

/// Bootstrap-aggregated CART trees.
///
/// Regressors average the tree outputs; classifiers take a majority vote over
/// the labels seen at fit time. Bootstrap draws and feature subsets come from
/// a seeded RNG, so a given seed always grows the same forest.
#[derive(Debug, Clone)]
pub struct RandomForest {
    kind: EstimatorKind,
    n_trees: usize,
    max_depth: usize,
    min_samples_split: usize,
    max_features: Option<usize>,
    seed: u64,
    n_features: usize,
    classes: Vec<f64>,
    trees: Vec<TreeNode>,
}

impl RandomForest {
    pub fn regressor(n_trees: usize, max_depth: usize, seed: u64) -> Self {
        Self::new(EstimatorKind::Regressor, n_trees, max_depth, seed)
    }

    pub fn classifier(n_trees: usize, max_depth: usize, seed: u64) -> Self {
        Self::new(EstimatorKind::Classifier, n_trees, max_depth, seed)
    }

    fn new(kind: EstimatorKind, n_trees: usize, max_depth: usize, seed: u64) -> Self {
        Self {
            kind,
            n_trees: n_trees.max(1),
            max_depth: max_depth.max(1),
            min_samples_split: 2,
            max_features: None,
            seed,
            n_features: 0,
            classes: Vec::new(),
            trees: Vec::new(),
        }
    }

    pub fn with_min_samples_split(mut self, n: usize) -> Self {
        self.min_samples_split = n.max(2);
        self
    }

    /// Features considered per split; defaults to all for regressors and
    /// `sqrt(n_features)` for classifiers.
    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = Some(n.max(1));
        self
    }

    pub fn n_trees(&self) -> usize {
        self.n_trees
    }
}

impl Estimator for RandomForest {
    fn kind(&self) -> EstimatorKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        match self.kind {
            EstimatorKind::Regressor => "random_forest_regressor",
            EstimatorKind::Classifier => "random_forest_classifier",
        }
    }

    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let n = x.nrows();
        self.n_features = x.ncols();

        let mut classes: BTreeMap<i64, f64> = BTreeMap::new();
        if self.kind == EstimatorKind::Classifier {
            for &v in y.iter() {
                classes.insert(v.round() as i64, v.round());
            }
        }
        self.classes = classes.values().copied().collect();
        let class_of: Vec<usize> = y
            .iter()
            .map(|&v| {
                self.classes
                    .iter()
                    .position(|&c| c == v.round())
                    .unwrap_or(0)
            })
            .collect();

        let max_features = self.max_features.unwrap_or(match self.kind {
            EstimatorKind::Regressor => self.n_features,
            EstimatorKind::Classifier => ((self.n_features as f64).sqrt().round() as usize).max(1),
        });
        let builder = TreeBuilder {
            x,
            y,
            class_of,
            classes: self.classes.clone(),
            params: TreeParams {
                kind: self.kind,
                max_depth: self.max_depth,
                min_samples_split: self.min_samples_split,
                max_features,
            },
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.n_trees);
        for _ in 0..self.n_trees {
            let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            trees.push(builder.build(&rows, 0, &mut rng));
        }
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(AppError::Model("random forest is not fitted".to_string()).into());
        }
        if x.ncols() != self.n_features {
            return Err(AppError::Model(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            ))
            .into());
        }
        let out = x
            .rows()
            .into_iter()
            .map(|row| {
                let votes = self.trees.iter().map(|t| predict_row(t, row));
                match self.kind {
                    EstimatorKind::Regressor => votes.sum::<f64>() / self.trees.len() as f64,
                    EstimatorKind::Classifier => {
                        let mut tally: BTreeMap<i64, usize> = BTreeMap::new();
                        for v in votes {
                            *tally.entry(v as i64).or_default() += 1;
                        }
                        tally
                            .into_iter()
                            .max_by_key(|(_, c)| *c)
                            .map(|(label, _)| label as f64)
                            .unwrap_or(0.0)
                    }
                }
            })
            .collect();
        Ok(out)
    }

    fn fresh(&self) -> Box<dyn Estimator> {
        let mut copy = Self::new(self.kind, self.n_trees, self.max_depth, self.seed)
            .with_min_samples_split(self.min_samples_split);
        copy.max_features = self.max_features;
        Box::new(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = x.column(0).mapv(|v| if v < 20.0 { -1.0 } else { 1.0 });
        (x, y)
    }

    #[test]
    fn regressor_learns_a_step() {
        let (x, y) = step_data();
        let mut rf = RandomForest::regressor(15, 4, 11);
        rf.fit(x.view(), y.view()).expect("fit");
        let pred = rf.predict(x.view()).expect("predict");
        assert!(pred[2] < -0.5);
        assert!(pred[37] > 0.5);
    }

    #[test]
    fn classifier_votes_on_labels() {
        let (x, y) = step_data();
        let mut rf = RandomForest::classifier(9, 4, 5).with_max_features(2);
        rf.fit(x.view(), y.view()).expect("fit");
        let pred = rf.predict(x.view()).expect("predict");
        assert!((pred[0] - (-1.0)).abs() < f64::EPSILON);
        assert!((pred[39] - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn same_seed_grows_the_same_forest() {
        let (x, y) = step_data();
        let mut a = RandomForest::regressor(5, 3, 42);
        let mut b = a.fresh();
        a.fit(x.view(), y.view()).expect("fit a");
        b.fit(x.view(), y.view()).expect("fit b");
        assert_eq!(
            a.predict(x.view()).expect("a"),
            b.predict(x.view()).expect("b")
        );
    }
}
