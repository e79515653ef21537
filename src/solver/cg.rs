//! Preconditioned conjugate gradients
use super::{Precondition, SolverControl, SolverState};
use crate::error::{Error, Result};
use crate::linalg::{SparseMatrix, Vector};

/// Conjugate gradient solver for symmetric positive definite matrices
#[derive(Debug, Clone)]
pub struct SolverCg {
    control: SolverControl,
    name: &'static str,
}

impl SolverCg {
    /// `name` is used in error messages and logs
    pub fn new(control: SolverControl, name: &'static str) -> Self {
        Self { control, name }
    }

    /// Solve `a x = b` starting from the content of `x`.
    ///
    /// # Errors
    /// The iteration budget is exhausted or the search direction has
    /// non-positive curvature.
    pub fn solve<P: Precondition>(
        &self,
        a: &SparseMatrix,
        x: &mut Vector,
        b: &Vector,
        precondition: &P,
    ) -> Result<SolverState> {
        let mut r = Vector::zeros(b.partition());
        a.vmult(&mut r, x);
        r.sadd(-1., 1., b);
        let initial_residual = r.l2_norm();
        let mut residual = initial_residual;
        if self.control.converged(residual) {
            return Ok(SolverState {
                steps: 0,
                initial_residual,
                residual,
            });
        }

        let mut z = Vector::zeros(b.partition());
        let mut q = Vector::zeros(b.partition());
        precondition.vmult(&mut z, &r);
        let mut p = z.clone();
        let mut rz = r.dot(&z);

        for step in 1..=self.control.max_steps {
            a.vmult(&mut q, &p);
            let pq = p.dot(&q);
            if pq <= 0. {
                return Err(Error::Breakdown {
                    solver: self.name,
                    steps: step,
                });
            }
            let alpha = rz / pq;
            x.axpy(alpha, &p);
            r.axpy(-alpha, &q);
            residual = r.l2_norm();
            if self.control.converged(residual) {
                log::debug!("{}: converged in {} steps", self.name, step);
                return Ok(SolverState {
                    steps: step,
                    initial_residual,
                    residual,
                });
            }
            precondition.vmult(&mut z, &r);
            let rz_new = r.dot(&z);
            p.sadd(rz_new / rz, 1., &z);
            rz = rz_new;
        }
        Err(Error::NoConvergence {
            solver: self.name,
            steps: self.control.max_steps,
            residual,
            tolerance: self.control.tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{DynamicSparsityPattern, SparsityPattern};
    use crate::mpi::{Communicator, Partition, SerialComm, ThreadComm};
    use crate::solver::{PreconditionIdentity, Preconditioner, SparseIlu};
    use std::sync::Arc;
    use std::thread;

    fn laplace(n: usize, comm: &Arc<dyn Communicator>, rows: std::ops::Range<usize>) -> SparseMatrix {
        let mut dsp = DynamicSparsityPattern::new(n, n);
        for i in 0..n {
            for j in i.saturating_sub(1)..(i + 2).min(n) {
                dsp.add(i, j);
            }
        }
        let pattern = Arc::new(SparsityPattern::from_dynamic(&dsp, rows.clone()));
        let mut m = SparseMatrix::new(&pattern, comm);
        for i in rows {
            m.add(i, i, 2.).unwrap();
            if i > 0 {
                m.add(i, i - 1, -1.).unwrap();
            }
            if i + 1 < n {
                m.add(i, i + 1, -1.).unwrap();
            }
        }
        m
    }

    #[test]
    fn test_cg_converges_on_laplace() {
        let n = 20;
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let a = laplace(n, &comm, 0..n);
        let p = Arc::new(Partition::serial(n));
        let mut b = Vector::zeros(&p);
        b.fill(1.);
        let mut x = Vector::zeros(&p);
        let control = SolverControl::relative(2 * n, 1e-10, b.l2_norm());
        let state = SolverCg::new(control, "CG")
            .solve(&a, &mut x, &b, &PreconditionIdentity)
            .unwrap();
        assert!(state.steps <= 2 * n);
        // exact solution x_i = (i+1)(n-i)/2
        for i in 0..n {
            let exact = ((i + 1) * (n - i)) as f64 / 2.;
            assert!((x.local()[i] - exact).abs() < 1e-6);
        }
    }

    #[test]
    fn test_cg_zero_rhs_returns_zero() {
        let n = 5;
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let a = laplace(n, &comm, 0..n);
        let p = Arc::new(Partition::serial(n));
        let b = Vector::zeros(&p);
        let mut x = Vector::zeros(&p);
        let ilu = Preconditioner::from(SparseIlu::new(&a));
        let state = SolverCg::new(SolverControl::relative(n, 1e-6, 0.), "CG")
            .solve(&a, &mut x, &b, &ilu)
            .unwrap();
        assert_eq!(state.steps, 0);
        assert_eq!(x.l2_norm(), 0.);
    }

    #[test]
    fn test_cg_budget_exhausted_is_an_error() {
        let n = 30;
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let a = laplace(n, &comm, 0..n);
        let p = Arc::new(Partition::serial(n));
        let mut b = Vector::zeros(&p);
        b.fill(1.);
        let mut x = Vector::zeros(&p);
        let result = SolverCg::new(SolverControl::new(2, 1e-12), "CG for A")
            .solve(&a, &mut x, &b, &PreconditionIdentity);
        assert!(matches!(
            result,
            Err(Error::NoConvergence { solver: "CG for A", steps: 2, .. })
        ));
    }

    #[test]
    fn test_distributed_cg_matches_serial() {
        let n = 16;
        let handles: Vec<_> = ThreadComm::create(2)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let comm: Arc<dyn Communicator> = Arc::new(comm);
                    let p = Arc::new(Partition::new(n, Arc::clone(&comm)));
                    let a = laplace(n, &comm, p.owned_range());
                    let mut b = Vector::zeros(&p);
                    b.fill(1.);
                    let mut x = Vector::zeros(&p);
                    let ilu = SparseIlu::new(&a);
                    let control = SolverControl::relative(2 * n, 1e-10, b.l2_norm());
                    SolverCg::new(control, "CG").solve(&a, &mut x, &b, &ilu).unwrap();
                    x.gather().into_owned()
                })
            })
            .collect();
        for h in handles {
            let x = h.join().unwrap();
            for (i, v) in x.iter().enumerate() {
                let exact = ((i + 1) * (n - i)) as f64 / 2.;
                assert!((v - exact).abs() < 1e-6);
            }
        }
    }
}
