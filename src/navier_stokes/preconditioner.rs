//! Block Schur preconditioner of the saddle point system
//!
//! Approximates
//! ```text
//! | A  B^T |^{-1}
//! | B  0   |
//! ```
//! by a block triangular solve. The inverse Schur complement is
//! replaced by `-(ν + γρ) M_p^{-1} - ρ/dt S^{-1}` with the pressure mass
//! `M_p` and the surrogate `S = B diag(M_u)^{-1} B^T`.
use super::schur::build_schur_surrogate;
use crate::config::VelocitySolverKind;
use crate::discretization::Physics;
use crate::error::Result;
use crate::linalg::{BlockSparseMatrix, BlockSparsityPattern, BlockVector, SparseMatrix, SparsityPattern, Vector};
use crate::mpi::Partition;
use crate::solver::{
    BandedLu, BlockPrecondition, PreconditionIdentity, Preconditioner, SolverCg, SolverControl,
    SparseIlu,
};
use ndarray::s;
use std::sync::Arc;

/// Inner tolerance of the three sub-solves, relative to their rhs
pub const INNER_REDUCTION: f64 = 1e-6;

/// Solver of the velocity block
#[derive(Debug, Clone)]
pub enum VelocitySolver {
    /// Conjugate gradients with an inner preconditioner
    Iterative(Preconditioner),
    /// Banded LU of the replicated velocity block
    Direct(BandedLu),
}

impl VelocitySolver {
    fn new(
        kind: VelocitySolverKind,
        system: &BlockSparseMatrix,
        pattern: &BlockSparsityPattern,
    ) -> Result<Self> {
        let solver = match kind {
            VelocitySolverKind::Cg => Self::Iterative(PreconditionIdentity.into()),
            VelocitySolverKind::CgIlu => {
                Self::Iterative(SparseIlu::new(system.block(0, 0)).into())
            }
            VelocitySolverKind::Direct => {
                let full = system.block(0, 0).gather(pattern.full_block(0, 0))?;
                Self::Direct(BandedLu::from_matrix(&full)?)
            }
        };
        Ok(solver)
    }
}

/// Approximate inverse of the block system.
///
/// Holds the matrices it was built from. Rebuild it whenever they change.
#[derive(Debug, Clone)]
pub struct BlockSchurPreconditioner {
    system: Arc<BlockSparseMatrix>,
    mass: Arc<BlockSparseMatrix>,
    schur: SparseMatrix,
    mass_ilu: SparseIlu,
    schur_ilu: SparseIlu,
    velocity: VelocitySolver,
    mass_scale: f64,
    schur_scale: f64,
}

impl BlockSchurPreconditioner {
    /// Build the Schur surrogate and factorize the inner preconditioners
    ///
    /// # Errors
    /// Surrogate outside of its pattern, or the direct velocity
    /// factorization failed.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        system: Arc<BlockSparseMatrix>,
        mass: Arc<BlockSparseMatrix>,
        pattern: &BlockSparsityPattern,
        schur_pattern: &Arc<SparsityPattern>,
        partitions: &[Arc<Partition>; 2],
        physics: Physics,
        time_step: f64,
        velocity_solver: VelocitySolverKind,
    ) -> Result<Self> {
        let schur = build_schur_surrogate(&system, &mass, pattern, schur_pattern, partitions)?;
        let mass_ilu = SparseIlu::new(mass.block(1, 1));
        let schur_ilu = SparseIlu::new(&schur);
        let velocity = VelocitySolver::new(velocity_solver, &system, pattern)?;
        Ok(Self {
            system,
            mass,
            schur,
            mass_ilu,
            schur_ilu,
            velocity,
            mass_scale: -(physics.viscosity + physics.grad_div * physics.rho),
            schur_scale: -physics.rho / time_step,
        })
    }

    /// Schur surrogate on the owned pressure rows
    pub fn schur(&self) -> &SparseMatrix {
        &self.schur
    }
}

impl BlockPrecondition for BlockSchurPreconditioner {
    fn vmult(&self, dst: &mut BlockVector, src: &BlockVector) -> Result<()> {
        let v0 = src.block(0);
        let v1 = src.block(1);
        let n_u = v0.size();
        let n_p = v1.size();

        // pressure mass part
        let mut mass_part = Vector::zeros(v1.partition());
        let control = SolverControl::relative(n_p, INNER_REDUCTION, v1.l2_norm());
        SolverCg::new(control, "CG for Mp").solve(
            self.mass.block(1, 1),
            &mut mass_part,
            v1,
            &self.mass_ilu,
        )?;
        mass_part.scale(self.mass_scale);

        // inertia part
        let mut schur_part = Vector::zeros(v1.partition());
        SolverCg::new(control, "CG for S").solve(&self.schur, &mut schur_part, v1, &self.schur_ilu)?;

        let u1 = dst.block_mut(1);
        u1.assign(&mass_part);
        u1.axpy(self.schur_scale, &schur_part);

        // utmp = v0 - B^T u1
        let mut utmp = Vector::zeros(v0.partition());
        self.system.block(0, 1).vmult(&mut utmp, dst.block(1));
        utmp.sadd(-1., 1., v0);

        let u0 = dst.block_mut(0);
        match &self.velocity {
            VelocitySolver::Iterative(preconditioner) => {
                u0.fill(0.);
                let control = SolverControl::relative(n_u, INNER_REDUCTION, utmp.l2_norm());
                SolverCg::new(control, "CG for A").solve(
                    self.system.block(0, 0),
                    u0,
                    &utmp,
                    preconditioner,
                )?;
            }
            VelocitySolver::Direct(lu) => {
                let x = lu.solve(&utmp.gather());
                let range = u0.partition().owned_range();
                u0.local_mut().assign(&x.slice(s![range.start..range.end]));
            }
        }
        Ok(())
    }
}
