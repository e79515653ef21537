//! Incomplete LU factorization without fill-in
use super::Precondition;
use crate::linalg::{SparseMatrix, Vector};

/// ILU(0) of the owned diagonal block of a matrix.
///
/// Couplings to rows of other ranks are dropped, so in the distributed
/// case this is a block-Jacobi preconditioner with ILU(0) blocks.
/// Pivots smaller than `1e-14 * max|diag|` are replaced by the mean
/// absolute diagonal.
#[derive(Debug, Clone)]
pub struct SparseIlu {
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    diag_ptr: Vec<usize>,
    lu: Vec<f64>,
    regularized: usize,
}

impl SparseIlu {
    /// Factorize the owned diagonal block of `matrix`
    pub fn new(matrix: &SparseMatrix) -> Self {
        let rows = matrix.pattern().owned_rows();
        let first = rows.start;
        let n = rows.len();
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut diag_ptr = Vec::with_capacity(n);
        let mut lu = Vec::new();
        row_ptr.push(0);
        for (li, i) in rows.clone().enumerate() {
            let mut has_diag = false;
            for (j, v) in matrix.row(i) {
                if !rows.contains(&j) {
                    continue;
                }
                let lj = j - first;
                if lj > li && !has_diag {
                    diag_ptr.push(col_idx.len());
                    col_idx.push(li);
                    lu.push(0.);
                    has_diag = true;
                }
                if lj == li {
                    diag_ptr.push(col_idx.len());
                    has_diag = true;
                }
                col_idx.push(lj);
                lu.push(v);
            }
            if !has_diag {
                diag_ptr.push(col_idx.len());
                col_idx.push(li);
                lu.push(0.);
            }
            row_ptr.push(col_idx.len());
        }
        let mut ilu = Self {
            row_ptr,
            col_idx,
            diag_ptr,
            lu,
            regularized: 0,
        };
        ilu.factorize();
        ilu
    }

    /// Number of pivots that had to be regularized
    pub fn regularized(&self) -> usize {
        self.regularized
    }

    fn find(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.diag_ptr[row] + 1;
        let end = self.row_ptr[row + 1];
        self.col_idx[start..end]
            .binary_search(&col)
            .ok()
            .map(|k| start + k)
    }

    fn factorize(&mut self) {
        let n = self.diag_ptr.len();
        let diag_abs: Vec<f64> = self.diag_ptr.iter().map(|&k| self.lu[k].abs()).collect();
        let max_diag = diag_abs.iter().fold(0f64, |a, &b| a.max(b));
        let nonzero = diag_abs.iter().filter(|&&d| d > 0.).count();
        let fill = if nonzero > 0 {
            diag_abs.iter().sum::<f64>() / nonzero as f64
        } else {
            1.
        };
        let pivot_tol = 1e-14 * max_diag;

        for i in 0..n {
            for kk in self.row_ptr[i]..self.diag_ptr[i] {
                let k = self.col_idx[kk];
                let lik = self.lu[kk] / self.lu[self.diag_ptr[k]];
                self.lu[kk] = lik;
                if lik == 0. {
                    continue;
                }
                for jj in kk + 1..self.row_ptr[i + 1] {
                    let j = self.col_idx[jj];
                    if let Some(pos) = self.find(k, j) {
                        self.lu[jj] -= lik * self.lu[pos];
                    }
                }
            }
            let d = self.diag_ptr[i];
            if self.lu[d].abs() <= pivot_tol {
                self.lu[d] = if self.lu[d] < 0. { -fill } else { fill };
                self.regularized += 1;
            }
        }
        if self.regularized > 0 {
            log::warn!("ILU: regularized {} zero pivots", self.regularized);
        }
    }

    /// Solve L U x = b in place on the owned entries
    fn solve_in_place(&self, x: &mut [f64]) {
        let n = self.diag_ptr.len();
        for i in 0..n {
            let mut s = x[i];
            for kk in self.row_ptr[i]..self.diag_ptr[i] {
                s -= self.lu[kk] * x[self.col_idx[kk]];
            }
            x[i] = s;
        }
        for i in (0..n).rev() {
            let mut s = x[i];
            for kk in self.diag_ptr[i] + 1..self.row_ptr[i + 1] {
                s -= self.lu[kk] * x[self.col_idx[kk]];
            }
            x[i] = s / self.lu[self.diag_ptr[i]];
        }
    }
}

impl Precondition for SparseIlu {
    fn vmult(&self, dst: &mut Vector, src: &Vector) {
        dst.assign(src);
        let mut x = dst.local().to_vec();
        self.solve_in_place(&mut x);
        dst.local_mut()
            .iter_mut()
            .zip(x)
            .for_each(|(d, v)| *d = v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{DynamicSparsityPattern, SparsityPattern};
    use crate::mpi::{Communicator, Partition, SerialComm};
    use std::sync::Arc;

    fn approx_eq(result: &[f64], expected: &[f64]) {
        let dif = 1e-10;
        for (a, b) in expected.iter().zip(result.iter()) {
            if (a - b).abs() > dif {
                panic!("Large difference of values, got {} expected {}.", b, a)
            }
        }
    }

    fn tridiagonal(n: usize, diag: f64) -> SparseMatrix {
        let mut dsp = DynamicSparsityPattern::new(n, n);
        for i in 0..n {
            for j in i.saturating_sub(1)..(i + 2).min(n) {
                dsp.add(i, j);
            }
        }
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let pattern = Arc::new(SparsityPattern::from_dynamic(&dsp, 0..n));
        let mut m = SparseMatrix::new(&pattern, &comm);
        for i in 0..n {
            m.add(i, i, diag).unwrap();
            if i > 0 {
                m.add(i, i - 1, -1.).unwrap();
                m.add(i - 1, i, -1.).unwrap();
            }
        }
        m
    }

    #[test]
    fn test_ilu_is_exact_for_tridiagonal() {
        // no fill-in for tridiagonal matrices, ILU(0) = LU
        let n = 6;
        let m = tridiagonal(n, 2.5);
        let ilu = SparseIlu::new(&m);
        let p = Arc::new(Partition::serial(n));
        let b = Vector::from_local(&p, ndarray::Array1::linspace(1., 2., n));
        let mut x = Vector::zeros(&p);
        ilu.vmult(&mut x, &b);
        let mut recover = Vector::zeros(&p);
        m.vmult(&mut recover, &x);
        approx_eq(recover.local().as_slice().unwrap(), b.local().as_slice().unwrap());
        assert_eq!(ilu.regularized(), 0);
    }

    #[test]
    fn test_ilu_regularizes_zero_pivot() {
        let n = 3;
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let mut dsp = DynamicSparsityPattern::new(n, n);
        for i in 0..n {
            dsp.add(i, i);
        }
        let pattern = Arc::new(SparsityPattern::from_dynamic(&dsp, 0..n));
        let mut m = SparseMatrix::new(&pattern, &comm);
        m.add(0, 0, 2.).unwrap();
        m.add(2, 2, 4.).unwrap();
        let ilu = SparseIlu::new(&m);
        assert_eq!(ilu.regularized(), 1);
        let p = Arc::new(Partition::serial(n));
        let mut b = Vector::zeros(&p);
        b.fill(3.);
        let mut x = Vector::zeros(&p);
        ilu.vmult(&mut x, &b);
        approx_eq(x.local().as_slice().unwrap(), &[1.5, 1., 0.75]);
    }
}
