//! Banded direct solver
use crate::error::{Error, Result};
use crate::linalg::SparseMatrix;
use ndarray::{Array1, Array2};

/// LU factorization without pivoting, stored as a band.
///
/// Entry (i, j) lives at `band[[i, j + lower - i]]`. Without pivoting
/// the factors stay inside the band of the original matrix.
#[derive(Debug, Clone)]
pub struct BandedLu {
    /// Size of matrix
    pub n: usize,
    /// Number of subdiagonals
    pub lower: usize,
    /// Number of superdiagonals
    pub upper: usize,
    band: Array2<f64>,
}

impl BandedLu {
    /// Factorize a matrix that stores all of its rows
    ///
    /// # Errors
    /// A pivot vanishes (relative to the largest entry).
    pub fn from_matrix(matrix: &SparseMatrix) -> Result<Self> {
        let n = matrix.m();
        if matrix.pattern().owned_rows() != (0..n) {
            return Err(Error::Invariant(
                "banded factorization needs every row of the matrix".into(),
            ));
        }
        let (lower, upper) = matrix.pattern().bandwidth();
        let mut band = Array2::zeros((n, lower + upper + 1));
        for i in 0..n {
            for (j, v) in matrix.row(i) {
                band[[i, j + lower - i]] = v;
            }
        }
        let mut lu = Self {
            n,
            lower,
            upper,
            band,
        };
        lu.factorize()?;
        Ok(lu)
    }

    fn factorize(&mut self) -> Result<()> {
        let (n, l, u) = (self.n, self.lower, self.upper);
        let scale = self.band.iter().fold(0f64, |a, &b| a.max(b.abs()));
        let tiny = 1e-14 * scale.max(f64::MIN_POSITIVE);
        for k in 0..n {
            let pivot = self.band[[k, l]];
            if pivot.abs() <= tiny {
                return Err(Error::ZeroPivot { row: k });
            }
            for i in k + 1..(k + l + 1).min(n) {
                let factor = self.band[[i, k + l - i]] / pivot;
                self.band[[i, k + l - i]] = factor;
                if factor == 0. {
                    continue;
                }
                for j in k + 1..(k + u + 1).min(n) {
                    let ukj = self.band[[k, j + l - k]];
                    self.band[[i, j + l - i]] -= factor * ukj;
                }
            }
        }
        Ok(())
    }

    /// Solve the factorized system for a full right hand side
    pub fn solve(&self, rhs: &[f64]) -> Array1<f64> {
        let (n, l, u) = (self.n, self.lower, self.upper);
        let mut x = Array1::from(rhs.to_vec());
        for i in 0..n {
            let mut s = x[i];
            for j in i.saturating_sub(l)..i {
                s -= self.band[[i, j + l - i]] * x[j];
            }
            x[i] = s;
        }
        for i in (0..n).rev() {
            let mut s = x[i];
            for j in i + 1..(i + u + 1).min(n) {
                s -= self.band[[i, j + l - i]] * x[j];
            }
            x[i] = s / self.band[[i, l]];
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{DynamicSparsityPattern, SparsityPattern, Vector};
    use crate::mpi::{Communicator, Partition, SerialComm};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use std::sync::Arc;

    fn approx_eq(result: &Array1<f64>, expected: &Array1<f64>) {
        let dif = 1e-9;
        for (a, b) in expected.iter().zip(result.iter()) {
            if (a - b).abs() > dif {
                panic!("Large difference of values, got {} expected {}.", b, a)
            }
        }
    }

    #[test]
    fn test_banded_lu_nonsymmetric() {
        let n = 8;
        let mut dsp = DynamicSparsityPattern::new(n, n);
        for i in 0..n {
            for j in i.saturating_sub(2)..(i + 2).min(n) {
                dsp.add(i, j);
            }
        }
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let pattern = Arc::new(SparsityPattern::from_dynamic(&dsp, 0..n));
        let mut m = SparseMatrix::new(&pattern, &comm);
        for i in 0..n {
            for j in i.saturating_sub(2)..(i + 2).min(n) {
                let v = if i == j { 6. } else { 1. / (1. + i as f64 + 2. * j as f64) };
                m.set(i, j, v).unwrap();
            }
        }
        let lu = BandedLu::from_matrix(&m).unwrap();
        assert_eq!((lu.lower, lu.upper), (2, 1));

        let p = Arc::new(Partition::serial(n));
        let b = Array1::random(n, Uniform::new(-1., 1.));
        let x = lu.solve(b.as_slice().unwrap());
        let mut recover = Vector::zeros(&p);
        m.vmult(&mut recover, &Vector::from_local(&p, x));
        approx_eq(recover.local(), &b);
    }

    #[test]
    fn test_zero_pivot_is_an_error() {
        let n = 2;
        let mut dsp = DynamicSparsityPattern::new(n, n);
        dsp.add(0, 0);
        dsp.add(1, 1);
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let pattern = Arc::new(SparsityPattern::from_dynamic(&dsp, 0..n));
        let mut m = SparseMatrix::new(&pattern, &comm);
        m.set(0, 0, 1.).unwrap();
        assert!(matches!(
            BandedLu::from_matrix(&m),
            Err(Error::ZeroPivot { row: 1 })
        ));
    }
}
