use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use ndarray::Array2;

use crate::error::AppError;

/// Timestamp-indexed table of named `f64` columns. `NaN` marks an undefined value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    index: Vec<u64>,
    columns: Vec<(String, Vec<f64>)>,
}

impl Frame {
    pub fn new(index: Vec<u64>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Result<Self> {
        self.push_column(name, values)?;
        Ok(self)
    }

    pub fn push_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        if values.len() != self.index.len() {
            return Err(AppError::Data(format!(
                "column '{}' has {} values for an index of {}",
                name,
                values.len(),
                self.index.len()
            ))
            .into());
        }
        if self.has_column(name) {
            return Err(AppError::Data(format!("duplicate column '{}'", name)).into());
        }
        self.columns.push((name.to_string(), values));
        Ok(())
    }

    pub fn index(&self) -> &[u64] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        self.columns.iter().map(|(_, v)| v[i]).collect()
    }

    /// Rename every column to `<prefix>_<column>`.
    pub fn prefixed(self, prefix: &str) -> Self {
        Self {
            index: self.index,
            columns: self
                .columns
                .into_iter()
                .map(|(n, v)| (format!("{}_{}", prefix, n), v))
                .collect(),
        }
    }

    /// Rows whose timestamp appears in `keep`, in this frame's order.
    pub fn select_timestamps(&self, keep: &BTreeSet<u64>) -> Self {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&i| keep.contains(&self.index[i]))
            .collect();
        self.take_rows(&rows)
    }

    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            index: rows.iter().map(|&i| self.index[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(n, v)| (n.clone(), rows.iter().map(|&i| v[i]).collect()))
                .collect(),
        }
    }

    /// Drop every row holding an undefined value in any column.
    pub fn drop_undefined(&self) -> Self {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&i| self.columns.iter().all(|(_, v)| !v[i].is_nan()))
            .collect();
        self.take_rows(&rows)
    }

    /// Union of both indexes (ascending); missing cells are `NaN`.
    pub fn outer_join(&self, other: &Frame) -> Result<Frame> {
        let index: Vec<u64> = self
            .index
            .iter()
            .chain(other.index.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.join_on(other, index)
    }

    /// Intersection of both indexes (ascending).
    pub fn inner_join(&self, other: &Frame) -> Result<Frame> {
        let theirs: BTreeSet<u64> = other.index.iter().copied().collect();
        let index: Vec<u64> = self
            .index
            .iter()
            .copied()
            .filter(|t| theirs.contains(t))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.join_on(other, index)
    }

    fn join_on(&self, other: &Frame, index: Vec<u64>) -> Result<Frame> {
        let mut out = Frame::new(index);
        for frame in [self, other] {
            let pos: HashMap<u64, usize> = frame
                .index
                .iter()
                .enumerate()
                .map(|(i, &t)| (t, i))
                .collect();
            for (name, values) in &frame.columns {
                let aligned = out
                    .index
                    .iter()
                    .map(|t| pos.get(t).map(|&i| values[i]).unwrap_or(f64::NAN))
                    .collect();
                out.push_column(name, aligned)?;
            }
        }
        Ok(out)
    }

    /// Row-major matrix of all columns, in column order.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), self.width()), |(i, j)| self.columns[j].1[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outer_join_fills_missing_with_nan() {
        let a = Frame::new(vec![1, 2, 3])
            .with_column("a", vec![1.0, 2.0, 3.0])
            .expect("column");
        let b = Frame::new(vec![2, 4])
            .with_column("b", vec![20.0, 40.0])
            .expect("column");
        let j = a.outer_join(&b).expect("join");
        assert_eq!(j.index(), &[1, 2, 3, 4]);
        let col_b = j.column("b").expect("b");
        assert!(col_b[0].is_nan());
        assert!((col_b[1] - 20.0).abs() < f64::EPSILON);
        assert!(j.column("a").expect("a")[3].is_nan());

        let clean = j.drop_undefined();
        assert_eq!(clean.index(), &[2]);
    }

    #[test]
    fn inner_join_keeps_shared_timestamps() {
        let a = Frame::new(vec![1, 2, 3])
            .with_column("a", vec![1.0, 2.0, 3.0])
            .expect("column");
        let b = Frame::new(vec![3, 2, 9])
            .with_column("b", vec![30.0, 20.0, 90.0])
            .expect("column");
        let j = a.inner_join(&b).expect("join");
        assert_eq!(j.index(), &[2, 3]);
        assert_eq!(j.row(1), vec![3.0, 30.0]);
    }

    #[test]
    fn duplicate_or_misaligned_columns_are_rejected() {
        let f = Frame::new(vec![1, 2]).with_column("x", vec![1.0, 2.0]).expect("x");
        assert!(f.clone().with_column("x", vec![0.0, 0.0]).is_err());
        assert!(f.with_column("y", vec![0.0]).is_err());
    }

    #[test]
    fn to_array_is_row_major() {
        let f = Frame::new(vec![1, 2])
            .with_column("x", vec![1.0, 2.0])
            .and_then(|f| f.with_column("y", vec![3.0, 4.0]))
            .expect("frame");
        let arr = f.to_array();
        assert_eq!(arr.shape(), &[2, 2]);
        assert!((arr[[1, 0]] - 2.0).abs() < f64::EPSILON);
        assert!((arr[[0, 1]] - 3.0).abs() < f64::EPSILON);
    }
}
