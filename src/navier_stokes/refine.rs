//! Adaptive refinement between time steps
use super::system::FluidSystem;
use crate::constraints::ConstraintKind;
use crate::discretization::{refine_and_coarsen_fixed_fraction, CellFlag};
use crate::error::Result;
use crate::linalg::BlockVector;

/// Share of the total error refined
pub const TOP_FRACTION: f64 = 0.6;

/// Share of the total error coarsened
pub const BOTTOM_FRACTION: f64 = 0.4;

/// Outcome of one refinement cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefinementReport {
    /// Cells flagged for refinement
    pub refined: usize,
    /// Cells flagged for coarsening
    pub coarsened: usize,
    /// Active cells afterwards
    pub n_cells: usize,
    /// Velocity and pressure DOFs afterwards
    pub dofs_per_block: [usize; 2],
}

/// Estimate, flag, change the mesh and carry the present solution over.
///
/// Everything that depends on the DOF layout is rebuilt, the cell
/// properties are reset, the interpolated solution gets the nonzero
/// constraints.
///
/// # Errors
/// Estimation, topology change or transfer failed.
pub fn refine_mesh(system: &mut FluidSystem, min_level: usize, max_level: usize) -> Result<RefinementReport> {
    let errors = system.discretization.estimate_error(&system.present_ghosted)?;
    let levels = system.discretization.cell_levels();
    let flags = refine_and_coarsen_fixed_fraction(
        &errors,
        &levels,
        TOP_FRACTION,
        BOTTOM_FRACTION,
        min_level,
        max_level,
    );
    let refined = flags.iter().filter(|f| **f == CellFlag::Refine).count();
    let coarsened = flags.iter().filter(|f| **f == CellFlag::Coarsen).count();

    system
        .discretization
        .prepare_coarsening_and_refinement(&system.present_ghosted);
    system.discretization.execute_coarsening_and_refinement(&flags)?;
    system.setup()?;

    let mut present = BlockVector::zeros(&system.partitions);
    system.discretization.interpolate(&mut present)?;
    system.set_present(present, ConstraintKind::Nonzero)?;

    let report = RefinementReport {
        refined,
        coarsened,
        n_cells: system.layout.n_cells,
        dofs_per_block: system.layout.dofs_per_block,
    };
    if system.is_root() {
        log::info!(
            "Refinement: {} cells refined, {} flagged for coarsening, {} active cells",
            report.refined,
            report.coarsened,
            report.n_cells
        );
    }
    Ok(report)
}
