//! Approximate Schur complement `S = B diag(M_u)^{-1} B^T`
use crate::error::Result;
use crate::linalg::{BlockSparseMatrix, BlockSparsityPattern, SparseMatrix, SparsityPattern, Vector};
use crate::mpi::Partition;
use crate::solver::PreconditionJacobi;
use std::sync::Arc;

/// Reciprocal of the velocity mass diagonal, all entries on every rank
pub fn inverse_mass_diagonal(mass: &BlockSparseMatrix, velocity: &Arc<Partition>) -> Vec<f64> {
    let jacobi = PreconditionJacobi::new(mass.block(0, 0));
    Vector::from_local(velocity, jacobi.inverse_diagonal().clone())
        .gather()
        .into_owned()
}

/// Pattern of the surrogate. Depends only on the DOF layout, so it is
/// derived once after every DOF distribution.
pub fn schur_sparsity_pattern(pattern: &BlockSparsityPattern) -> SparsityPattern {
    SparsityPattern::mmult(pattern.block(1, 0), pattern.full_block(0, 1))
}

/// Multiply out the surrogate on the owned pressure rows.
///
/// Zero diagonal entries (pressure DOFs without coupling to free
/// velocity DOFs, e.g. hanging nodes) are replaced by the mean diagonal.
///
/// # Errors
/// Product falls outside `schur_pattern`.
pub fn build_schur_surrogate(
    system: &BlockSparseMatrix,
    mass: &BlockSparseMatrix,
    pattern: &BlockSparsityPattern,
    schur_pattern: &Arc<SparsityPattern>,
    partitions: &[Arc<Partition>; 2],
) -> Result<SparseMatrix> {
    let inverse_diagonal = inverse_mass_diagonal(mass, &partitions[0]);
    let bt_full = system.block(0, 1).gather(pattern.full_block(0, 1))?;
    let mut schur = SparseMatrix::new(schur_pattern, partitions[1].comm());
    schur.mmult_into(system.block(1, 0), &bt_full, &inverse_diagonal)?;
    let regularized = schur.regularize_zero_diagonal()?;
    if regularized > 0 {
        log::warn!(
            "Schur surrogate: regularized {} zero diagonal entries",
            regularized
        );
    }
    Ok(schur)
}
