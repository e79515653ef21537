//! Preconditioners for the inner conjugate gradient solves
use super::SparseIlu;
use crate::linalg::{SparseMatrix, Vector};
use ndarray::{Array1, Zip};

/// Apply an approximate inverse: dst = P^{-1} src
#[enum_dispatch]
pub trait Precondition {
    /// dst = P^{-1} src
    fn vmult(&self, dst: &mut Vector, src: &Vector);
}

/// Collection of inner preconditioners
#[enum_dispatch(Precondition)]
#[derive(Debug, Clone)]
pub enum Preconditioner {
    /// No preconditioning
    Identity(PreconditionIdentity),
    /// Inverse of the diagonal
    Jacobi(PreconditionJacobi),
    /// Incomplete LU without fill-in
    Ilu(SparseIlu),
}

/// dst = src
#[derive(Debug, Clone, Copy, Default)]
pub struct PreconditionIdentity;

impl Precondition for PreconditionIdentity {
    fn vmult(&self, dst: &mut Vector, src: &Vector) {
        dst.assign(src);
    }
}

/// dst = diag(M)^{-1} src
#[derive(Debug, Clone)]
pub struct PreconditionJacobi {
    inverse_diagonal: Array1<f64>,
}

impl PreconditionJacobi {
    /// Reciprocal of the diagonal of the owned rows.
    ///
    /// A vanishing diagonal entry is left unscaled.
    pub fn new(matrix: &SparseMatrix) -> Self {
        let inverse_diagonal = matrix
            .diagonal()
            .into_iter()
            .map(|d| if d.abs() > 1e-14 { 1. / d } else { 1. })
            .collect();
        Self { inverse_diagonal }
    }

    /// Reciprocal diagonal of the owned rows
    pub fn inverse_diagonal(&self) -> &Array1<f64> {
        &self.inverse_diagonal
    }
}

impl Precondition for PreconditionJacobi {
    fn vmult(&self, dst: &mut Vector, src: &Vector) {
        Zip::from(dst.local_mut())
            .and(src.local())
            .and(&self.inverse_diagonal)
            .for_each(|d, &s, &inv| *d = s * inv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{DynamicSparsityPattern, SparsityPattern};
    use crate::mpi::{Communicator, Partition, SerialComm};
    use std::sync::Arc;

    #[test]
    fn test_jacobi_reciprocal_of_mass() {
        let n = 5;
        let mut dsp = DynamicSparsityPattern::new(n, n);
        for i in 0..n {
            for j in i.saturating_sub(1)..(i + 2).min(n) {
                dsp.add(i, j);
            }
        }
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let pattern = Arc::new(SparsityPattern::from_dynamic(&dsp, 0..n));
        let mut mass = SparseMatrix::new(&pattern, &comm);
        for i in 0..n {
            mass.add(i, i, 4. / (i + 1) as f64).unwrap();
            if i > 0 {
                mass.add(i, i - 1, 0.5).unwrap();
                mass.add(i - 1, i, 0.5).unwrap();
            }
        }
        let jacobi = Preconditioner::from(PreconditionJacobi::new(&mass));
        let p = Arc::new(Partition::serial(n));
        let mut ones = Vector::zeros(&p);
        ones.fill(1.);
        let mut reciprocal = Vector::zeros(&p);
        jacobi.vmult(&mut reciprocal, &ones);
        for (i, d) in mass.diagonal().iter().enumerate() {
            let product = d * reciprocal.local()[i];
            if (product - 1.).abs() > 1e-12 {
                panic!("Large difference of values, got {} expected {}.", product, 1.)
            }
        }
    }
}
