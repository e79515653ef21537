//! Sparsity patterns
use sprs::{CsMat, TriMat};
use std::ops::Range;

/// Pattern under construction, every row of the matrix.
///
/// Entries are collected as triplets; duplicates merge when frozen.
#[derive(Debug)]
pub struct DynamicSparsityPattern {
    triplets: TriMat<f64>,
}

impl DynamicSparsityPattern {
    /// Empty pattern
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            triplets: TriMat::new((n_rows, n_cols)),
        }
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.triplets.rows()
    }

    /// Number of columns
    pub fn n_cols(&self) -> usize {
        self.triplets.cols()
    }

    /// Insert one entry
    pub fn add(&mut self, row: usize, col: usize) {
        self.triplets.add_triplet(row, col, 1.);
    }

    /// Inserted (row, col) pairs, unsorted and possibly repeated
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.triplets
            .row_inds()
            .iter()
            .copied()
            .zip(self.triplets.col_inds().iter().copied())
    }

    /// Number of distinct entries
    pub fn n_nonzero(&self) -> usize {
        let compressed: CsMat<f64> = self.triplets.to_csr();
        compressed.nnz()
    }
}

/// Compressed row pattern restricted to a contiguous range of rows.
///
/// Stored as a `sprs` matrix over the local rows with global columns,
/// sorted within each row. Every stored value is one.
#[derive(Debug, Clone)]
pub struct SparsityPattern {
    n_rows: usize,
    rows: Range<usize>,
    structure: CsMat<f64>,
}

impl SparsityPattern {
    /// Freeze the rows `rows` of a dynamic pattern
    pub fn from_dynamic(dsp: &DynamicSparsityPattern, rows: Range<usize>) -> Self {
        let mut local = TriMat::new((rows.len(), dsp.n_cols()));
        for (r, c) in dsp.entries().filter(|(r, _)| rows.contains(r)) {
            local.add_triplet(r - rows.start, c, 1.);
        }
        let mut structure: CsMat<f64> = local.to_csr();
        structure.data_mut().iter_mut().for_each(|v| *v = 1.);
        Self {
            n_rows: dsp.n_rows(),
            rows,
            structure,
        }
    }

    /// Global number of rows
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Global number of columns
    pub fn n_cols(&self) -> usize {
        self.structure.cols()
    }

    /// Rows stored here
    pub fn owned_rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    /// Number of stored entries
    pub fn n_nonzero(&self) -> usize {
        self.structure.nnz()
    }

    /// Local rows times global columns, every value one
    pub(crate) fn structure(&self) -> &CsMat<f64> {
        &self.structure
    }

    /// Positions of a stored row in the compressed storage
    pub(crate) fn row_range(&self, row: usize) -> Range<usize> {
        self.structure
            .indptr()
            .outer_inds_sz(row - self.rows.start)
    }

    /// Columns of a stored row
    pub fn row(&self, row: usize) -> &[usize] {
        &self.structure.indices()[self.row_range(row)]
    }

    /// Position of entry (row, col), `None` if not in the pattern
    pub fn index(&self, row: usize, col: usize) -> Option<usize> {
        if !self.rows.contains(&row) || col >= self.n_cols() {
            return None;
        }
        self.structure
            .nnz_index(row - self.rows.start, col)
            .map(|k| k.0)
    }

    /// Pattern of `a * b`, rows of `a`, plus the diagonal.
    ///
    /// `b` must store all of its rows.
    pub fn mmult(a: &SparsityPattern, b: &SparsityPattern) -> SparsityPattern {
        debug_assert_eq!(b.owned_rows(), 0..b.n_rows);
        debug_assert_eq!(a.n_cols(), b.n_rows);
        // values are all one, no product entry cancels
        let product: CsMat<f64> = &a.structure * &b.structure;
        let mut dsp = DynamicSparsityPattern::new(a.n_rows, b.n_cols());
        for (local, row) in product.outer_iterator().enumerate() {
            let i = a.rows.start + local;
            if i < b.n_cols() {
                dsp.add(i, i);
            }
            for (j, _) in row.iter() {
                dsp.add(i, j);
            }
        }
        SparsityPattern::from_dynamic(&dsp, a.owned_rows())
    }

    /// Lower and upper bandwidth of the stored rows
    pub fn bandwidth(&self) -> (usize, usize) {
        let mut lower = 0;
        let mut upper = 0;
        for i in self.owned_rows() {
            let row = self.row(i);
            if let (Some(&first), Some(&last)) = (row.first(), row.last()) {
                lower = lower.max(i.saturating_sub(first));
                upper = upper.max(last.saturating_sub(i));
            }
        }
        (lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_lookup() {
        let mut dsp = DynamicSparsityPattern::new(3, 3);
        dsp.add(0, 2);
        dsp.add(0, 0);
        dsp.add(2, 1);
        dsp.add(0, 2);
        assert_eq!(dsp.n_nonzero(), 3);
        let sp = SparsityPattern::from_dynamic(&dsp, 0..3);
        assert_eq!(sp.row(0), &[0, 2]);
        assert_eq!(sp.index(0, 2), Some(1));
        assert_eq!(sp.index(2, 1), Some(2));
        assert_eq!(sp.index(1, 1), None);
        assert_eq!(sp.bandwidth(), (1, 2));
    }

    #[test]
    fn test_owned_rows_keep_global_indices() {
        let mut dsp = DynamicSparsityPattern::new(4, 4);
        for i in 0..4 {
            dsp.add(i, i);
            dsp.add(i, 3 - i);
        }
        let sp = SparsityPattern::from_dynamic(&dsp, 2..4);
        assert_eq!(sp.n_rows(), 4);
        assert_eq!(sp.n_nonzero(), 4);
        assert_eq!(sp.row(2), &[1, 2]);
        assert_eq!(sp.index(3, 0), Some(2));
        assert_eq!(sp.index(0, 0), None);
    }

    #[test]
    fn test_mmult_pattern_contains_products_and_diagonal() {
        // a: 2x3, b: 3x2
        let mut da = DynamicSparsityPattern::new(2, 3);
        da.add(0, 0);
        da.add(1, 2);
        let mut db = DynamicSparsityPattern::new(3, 2);
        db.add(0, 1);
        db.add(2, 0);
        let a = SparsityPattern::from_dynamic(&da, 0..2);
        let b = SparsityPattern::from_dynamic(&db, 0..3);
        let c = SparsityPattern::mmult(&a, &b);
        assert_eq!(c.row(0), &[0, 1]);
        assert_eq!(c.row(1), &[0, 1]);
    }
}
