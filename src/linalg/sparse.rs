//! Compressed row matrix with distributed rows
use super::{SparsityPattern, Vector};
use crate::error::{Error, Result};
use crate::mpi::Communicator;
use ndarray::ArrayView1;
use sprs::CsMat;
use std::sync::Arc;

/// Sparse matrix storing the owned rows of its pattern.
///
/// Values live in a `sprs` matrix with the structure of the pattern,
/// local rows and global columns.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    pattern: Arc<SparsityPattern>,
    values: CsMat<f64>,
    comm: Arc<dyn Communicator>,
}

impl SparseMatrix {
    /// Zero matrix on a pattern, rows distributed over `comm`
    pub fn new(pattern: &Arc<SparsityPattern>, comm: &Arc<dyn Communicator>) -> Self {
        Self {
            pattern: Arc::clone(pattern),
            values: pattern.structure().map(|_| 0.),
            comm: Arc::clone(comm),
        }
    }

    /// Sparsity pattern
    pub fn pattern(&self) -> &Arc<SparsityPattern> {
        &self.pattern
    }

    /// Stored values, in pattern order
    pub fn values(&self) -> &[f64] {
        self.values.data()
    }

    /// Global number of rows
    pub fn m(&self) -> usize {
        self.pattern.n_rows()
    }

    /// Global number of columns
    pub fn n(&self) -> usize {
        self.pattern.n_cols()
    }

    /// Set every stored value to zero, keeping the pattern
    pub fn set_zero(&mut self) {
        self.values.data_mut().iter_mut().for_each(|v| *v = 0.);
    }

    fn position(&self, row: usize, col: usize) -> Result<usize> {
        self.pattern.index(row, col).ok_or_else(|| {
            Error::Invariant(format!("entry ({}, {}) is not in the sparsity pattern", row, col))
        })
    }

    /// Add to entry (row, col)
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let k = self.position(row, col)?;
        self.values.data_mut()[k] += value;
        Ok(())
    }

    /// Overwrite entry (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let k = self.position(row, col)?;
        self.values.data_mut()[k] = value;
        Ok(())
    }

    /// Value of entry (row, col), zero outside the pattern
    pub fn el(&self, row: usize, col: usize) -> f64 {
        self.pattern
            .index(row, col)
            .map_or(0., |k| self.values.data()[k])
    }

    /// Entries of a stored row as (column, value)
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.pattern.row_range(row);
        self.values.indices()[range.clone()]
            .iter()
            .copied()
            .zip(self.values.data()[range].iter().copied())
    }

    /// dst = M src
    pub fn vmult(&self, dst: &mut Vector, src: &Vector) {
        dst.fill(0.);
        self.vmult_add(dst, src);
    }

    /// dst += M src
    pub fn vmult_add(&self, dst: &mut Vector, src: &Vector) {
        let x = src.gather();
        let x = ArrayView1::from(&x[..]);
        let product = &self.values * &x;
        *dst.local_mut() += &product;
    }

    /// Replicate all rows on every rank.
    ///
    /// `full` is the pattern of all rows, of which every rank stores a
    /// contiguous slice.
    pub fn gather(&self, full: &Arc<SparsityPattern>) -> Result<SparseMatrix> {
        let data = self.comm.all_gather(self.values.data());
        if data.len() != full.n_nonzero() {
            return Err(Error::Invariant(format!(
                "gathered {} entries for a pattern with {}",
                data.len(),
                full.n_nonzero()
            )));
        }
        let mut values = full.structure().map(|_| 0.);
        values.data_mut().copy_from_slice(&data);
        Ok(SparseMatrix {
            pattern: Arc::clone(full),
            values,
            comm: Arc::clone(&self.comm),
        })
    }

    /// Main diagonal of the stored rows
    pub fn diagonal(&self) -> Vec<f64> {
        self.pattern.owned_rows().map(|i| self.el(i, i)).collect()
    }

    /// self = a * diag(d) * b on the stored rows of `self`.
    ///
    /// `b` must hold every row, `d` every entry. The pattern of `self` is
    /// fixed. A product entry outside of it is an error.
    pub fn mmult_into(&mut self, a: &SparseMatrix, b: &SparseMatrix, d: &[f64]) -> Result<()> {
        self.set_zero();
        for i in self.pattern.owned_rows() {
            for (k, a_ik) in a.row(i) {
                let s = a_ik * d[k];
                if s == 0. {
                    continue;
                }
                for (j, b_kj) in b.row(k) {
                    self.add(i, j, s * b_kj)?;
                }
            }
        }
        Ok(())
    }

    /// Replace zero diagonal entries of the stored rows by the mean
    /// absolute nonzero diagonal. Returns the number of replaced rows.
    pub fn regularize_zero_diagonal(&mut self) -> Result<usize> {
        let diag = self.diagonal();
        let (sum, count) = diag
            .iter()
            .filter(|d| d.abs() > 0.)
            .fold((0., 0.), |(s, c), d| (s + d.abs(), c + 1.));
        let (sum, nonzero) = (self.comm.sum(sum), self.comm.sum(count));
        let fill = if nonzero > 0. { sum / nonzero } else { 1. };
        let mut count = 0;
        for (i, d) in self.pattern.owned_rows().zip(diag) {
            if d == 0. {
                self.set(i, i, fill)?;
                count += 1;
            }
        }
        Ok(count)
    }
}
