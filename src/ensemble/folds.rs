use std::collections::BTreeMap;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::AppError;

/// Train/test row indices for one fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

fn check(n_samples: usize, n_splits: usize) -> Result<()> {
    if n_splits < 2 {
        return Err(AppError::Config(format!("folds must be >= 2, got {}", n_splits)).into());
    }
    if n_samples < n_splits {
        return Err(AppError::Data(format!(
            "{} samples cannot be split into {} folds",
            n_samples, n_splits
        ))
        .into());
    }
    Ok(())
}

fn splits_from_assignment(fold_of: &[usize], n_splits: usize) -> Vec<Split> {
    (0..n_splits)
        .map(|k| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..fold_of.len()).partition(|&i| fold_of[i] == k);
            Split { train, test }
        })
        .collect()
}

/// Shuffled k-fold: the first `n % k` folds get one extra sample.
pub fn kfold(n_samples: usize, n_splits: usize, seed: u64) -> Result<Vec<Split>> {
    check(n_samples, n_splits)?;
    let mut order: Vec<usize> = (0..n_samples).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let base = n_samples / n_splits;
    let extra = n_samples % n_splits;
    let mut fold_of = vec![0; n_samples];
    let mut cursor = 0;
    for k in 0..n_splits {
        let size = base + usize::from(k < extra);
        for &i in &order[cursor..cursor + size] {
            fold_of[i] = k;
        }
        cursor += size;
    }
    Ok(splits_from_assignment(&fold_of, n_splits))
}

/// Shuffled stratified k-fold over integer class labels.
///
/// Each class is shuffled and dealt round-robin across folds, continuing
/// where the previous class stopped, so every fold keeps roughly the class
/// proportions and fold sizes differ by at most one.
pub fn stratified_kfold(labels: &[i64], n_splits: usize, seed: u64) -> Result<Vec<Split>> {
    check(labels.len(), n_splits)?;
    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0; labels.len()];
    let mut next_fold = 0;
    for members in by_class.values_mut() {
        members.shuffle(&mut rng);
        for &i in members.iter() {
            fold_of[i] = next_fold;
            next_fold = (next_fold + 1) % n_splits;
        }
    }
    Ok(splits_from_assignment(&fold_of, n_splits))
}
