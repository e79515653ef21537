//! Flexible restarted GMRES
//!
//! Right preconditioned GMRES that stores the preconditioned directions
//! `z_j = P_j^{-1} v_j` next to the Arnoldi basis. The preconditioner may
//! differ between applications (inner iterative solves), the update is
//! formed from the stored `z_j`.
use super::{PreconditionIdentity, SolverControl, SolverState};
use crate::error::{Error, Result};
use crate::linalg::{BlockSparseMatrix, BlockVector};

/// Approximate inverse of a block operator, may fail (inner solves)
pub trait BlockPrecondition {
    /// dst = P^{-1} src
    fn vmult(&self, dst: &mut BlockVector, src: &BlockVector) -> Result<()>;
}

impl BlockPrecondition for PreconditionIdentity {
    fn vmult(&self, dst: &mut BlockVector, src: &BlockVector) -> Result<()> {
        dst.assign(src);
        Ok(())
    }
}

/// Givens rotation eliminating the subdiagonal of the Hessenberg matrix
#[derive(Debug, Clone, Copy)]
struct GivensRotation {
    c: f64,
    s: f64,
}

impl GivensRotation {
    fn new(a: f64, b: f64) -> Self {
        let r = a.hypot(b);
        if r == 0. {
            Self { c: 1., s: 0. }
        } else {
            Self { c: a / r, s: b / r }
        }
    }

    fn apply(&self, a: f64, b: f64) -> (f64, f64) {
        (self.c * a + self.s * b, -self.s * a + self.c * b)
    }
}

/// Flexible GMRES(m)
#[derive(Debug, Clone)]
pub struct SolverFgmres {
    control: SolverControl,
    restart: usize,
}

impl SolverFgmres {
    /// Default basis size before restart
    pub const DEFAULT_RESTART: usize = 30;

    /// New solver, restart after [`SolverFgmres::DEFAULT_RESTART`] vectors
    pub fn new(control: SolverControl) -> Self {
        Self {
            control,
            restart: Self::DEFAULT_RESTART,
        }
    }

    /// Change the basis size
    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = restart.max(1);
        self
    }

    /// Solve `a x = b` starting from the content of `x`.
    ///
    /// Convergence is tested on the true residual `‖b - a x‖` at the end
    /// of each cycle.
    ///
    /// # Errors
    /// Iteration budget exhausted, or the preconditioner failed.
    pub fn solve<P: BlockPrecondition>(
        &self,
        a: &BlockSparseMatrix,
        x: &mut BlockVector,
        b: &BlockVector,
        precondition: &P,
    ) -> Result<SolverState> {
        let partitions = b.partitions();
        let mut r = BlockVector::zeros(&partitions);
        let mut beta = a.residual(&mut r, x, b);
        let initial_residual = beta;
        let mut steps = 0;

        loop {
            if self.control.converged(beta) {
                return Ok(SolverState {
                    steps,
                    initial_residual,
                    residual: beta,
                });
            }
            if steps >= self.control.max_steps {
                return Err(Error::NoConvergence {
                    solver: "FGMRES",
                    steps,
                    residual: beta,
                    tolerance: self.control.tolerance,
                });
            }

            let m = self.restart;
            let mut basis: Vec<BlockVector> = Vec::with_capacity(m + 1);
            let mut directions: Vec<BlockVector> = Vec::with_capacity(m);
            let mut hessenberg = vec![vec![0f64; m]; m + 1];
            let mut rotations: Vec<GivensRotation> = Vec::with_capacity(m);
            let mut g = vec![0f64; m + 1];
            g[0] = beta;
            r.scale(1. / beta);
            basis.push(r.clone());

            let mut k = 0;
            while k < m && steps < self.control.max_steps {
                let mut z = BlockVector::zeros(&partitions);
                precondition.vmult(&mut z, &basis[k])?;
                let mut w = BlockVector::zeros(&partitions);
                a.vmult(&mut w, &z);
                directions.push(z);

                // modified Gram-Schmidt
                for (i, v) in basis.iter().enumerate() {
                    let h = w.dot(v);
                    hessenberg[i][k] = h;
                    w.axpy(-h, v);
                }
                let h_next = w.l2_norm();
                hessenberg[k + 1][k] = h_next;

                for (i, rot) in rotations.iter().enumerate() {
                    let (hi, hi1) = rot.apply(hessenberg[i][k], hessenberg[i + 1][k]);
                    hessenberg[i][k] = hi;
                    hessenberg[i + 1][k] = hi1;
                }
                let rot = GivensRotation::new(hessenberg[k][k], hessenberg[k + 1][k]);
                let (hk, _) = rot.apply(hessenberg[k][k], hessenberg[k + 1][k]);
                hessenberg[k][k] = hk;
                hessenberg[k + 1][k] = 0.;
                let (gk, gk1) = rot.apply(g[k], g[k + 1]);
                g[k] = gk;
                g[k + 1] = gk1;
                rotations.push(rot);

                steps += 1;
                k += 1;
                let estimate = g[k].abs();
                if h_next == 0. || self.control.converged(estimate) {
                    break;
                }
                w.scale(1. / h_next);
                basis.push(w);
            }

            // back substitution for the least squares coefficients
            let mut y = vec![0f64; k];
            for i in (0..k).rev() {
                let mut s = g[i];
                for (j, yj) in y.iter().enumerate().skip(i + 1) {
                    s -= hessenberg[i][j] * yj;
                }
                if hessenberg[i][i] == 0. {
                    return Err(Error::Breakdown {
                        solver: "FGMRES",
                        steps,
                    });
                }
                y[i] = s / hessenberg[i][i];
            }
            for (yi, z) in y.iter().zip(&directions) {
                x.axpy(*yi, z);
            }
            beta = a.residual(&mut r, x, b);
            log::debug!("FGMRES: cycle finished after {} steps, residual {:e}", steps, beta);
        }
    }
}
