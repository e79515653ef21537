//! # Discretization seams
//!
//! The solver core never touches shape functions or cells directly. It
//! talks to a [`Discretization`], which
//! - numbers the DOFs and builds constraints and sparsity ([`Discretization`])
//! - emits the block system, mass matrix and right hand side ([`Assembler`])
//! - estimates a per cell error and transfers fields across a topology
//!   change ([`ErrorEstimator`], [`Discretization`])
//!
//! [`crate::fem::QuadDiscretization`] is the reference implementation.
use crate::cell_property::{CellDataStorage, CellProperty};
use crate::config::BoundaryConditions;
use crate::constraints::{ConstraintSet, Constraints};
use crate::error::Result;
use crate::linalg::{BlockSparseMatrix, BlockVector, DynamicSparsityPattern, GhostedBlockVector};
use std::collections::BTreeMap;

/// Size of the DOF numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DofLayout {
    /// Velocity and pressure DOFs
    pub dofs_per_block: [usize; 2],
    /// Active cells
    pub n_cells: usize,
}

impl DofLayout {
    /// Total number of DOFs
    pub fn n_dofs(&self) -> usize {
        self.dofs_per_block[0] + self.dofs_per_block[1]
    }
}

/// How the convective term enters the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linearization {
    /// Convection explicit in the right hand side, symmetric operator
    Imex,
    /// Convection Jacobian in the operator, inertia residual `ρ/dt (u - u_old)`
    Newton,
}

/// Material parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Physics {
    /// Kinematic viscosity
    pub viscosity: f64,
    /// Density
    pub rho: f64,
    /// Grad-div parameter
    pub grad_div: f64,
}

/// Everything one assembly needs to read
#[derive(Debug)]
pub struct AssemblyRequest<'a> {
    /// Linearization point
    pub evaluation_point: &'a GhostedBlockVector,
    /// Solution of the last time step
    pub previous: &'a GhostedBlockVector,
    /// Constraints condensed during local-to-global assembly
    pub constraints: &'a ConstraintSet,
    /// Coupling data per quadrature point
    pub cell_property: &'a CellDataStorage<CellProperty>,
    /// Imex or Newton
    pub linearization: Linearization,
    /// Material parameters
    pub physics: Physics,
    /// Step size
    pub time_step: f64,
    /// Boundary id -> prescribed pressure
    pub neumann: &'a BTreeMap<usize, f64>,
}

/// Produces the discrete system
pub trait Assembler {
    /// Zero and fill `rhs`, and if given, zero and fill the system and
    /// mass matrices.
    ///
    /// # Errors
    /// Cell property storage does not match the mesh, or an entry falls
    /// outside the sparsity pattern.
    fn assemble(
        &self,
        request: &AssemblyRequest,
        system: Option<&mut BlockSparseMatrix>,
        mass: Option<&mut BlockSparseMatrix>,
        rhs: &mut BlockVector,
    ) -> Result<()>;
}

/// Per cell error indicator
pub trait ErrorEstimator {
    /// One value per active cell, computed from the velocity
    ///
    /// # Errors
    /// Field does not match the DOF layout.
    fn estimate_error(&self, field: &GhostedBlockVector) -> Result<Vec<f64>>;
}

/// Refinement decision for one active cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellFlag {
    /// Keep
    #[default]
    None,
    /// Split into children
    Refine,
    /// Merge with siblings
    Coarsen,
}

/// Mesh, DOF numbering and solution transfer
pub trait Discretization: Assembler + ErrorEstimator {
    /// Number of active cells
    fn n_active_cells(&self) -> usize;

    /// Quadrature points per cell
    fn n_q_points(&self) -> usize;

    /// Refinement level of every active cell
    fn cell_levels(&self) -> Vec<usize>;

    /// Number the DOFs of the current mesh
    fn distribute_dofs(&mut self) -> DofLayout;

    /// Global DOFs of active cell `cell`, velocity DOFs first
    fn cell_dofs(&self, cell: usize) -> Vec<usize>;

    /// Hanging node and Dirichlet constraints, nonzero and zero variant
    ///
    /// # Errors
    /// Constraints cannot be closed.
    fn make_constraints(&self, bcs: &BoundaryConditions) -> Result<Constraints>;

    /// Couplings of the condensed system
    fn make_sparsity_pattern(&self, constraints: &ConstraintSet) -> DynamicSparsityPattern;

    /// Remember `field` on the current mesh for a later [`Discretization::interpolate`]
    fn prepare_coarsening_and_refinement(&mut self, field: &GhostedBlockVector);

    /// Change the topology. The DOFs must be distributed again afterwards.
    ///
    /// # Errors
    /// Flag count differs from the number of active cells, or a cell
    /// would exceed the finest level.
    fn execute_coarsening_and_refinement(&mut self, flags: &[CellFlag]) -> Result<()>;

    /// Interpolate the remembered field onto the new DOFs
    ///
    /// # Errors
    /// No field was prepared.
    fn interpolate(&mut self, field: &mut BlockVector) -> Result<()>;

    /// Set the owned entries of `field` from functions of the position
    fn interpolate_function(
        &self,
        velocity: &dyn Fn([f64; 2]) -> [f64; 2],
        pressure: &dyn Fn([f64; 2]) -> f64,
        field: &mut BlockVector,
    );
}

/// Fixed fraction flagging.
///
/// The cells with the largest errors are flagged for refinement until
/// they hold `top_fraction` of the total error. The cells with the
/// smallest errors are flagged for coarsening while they hold at most
/// `bottom_fraction`. Refinement is cleared at `max_level`, coarsening at
/// `min_level`.
pub fn refine_and_coarsen_fixed_fraction(
    errors: &[f64],
    levels: &[usize],
    top_fraction: f64,
    bottom_fraction: f64,
    min_level: usize,
    max_level: usize,
) -> Vec<CellFlag> {
    let n = errors.len();
    let mut flags = vec![CellFlag::None; n];
    let total: f64 = errors.iter().sum();
    if n == 0 || total <= 0. {
        return flags;
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| errors[b].total_cmp(&errors[a]));

    let mut sum = 0.;
    let mut n_refine = 0;
    for &k in &order {
        if sum >= top_fraction * total {
            break;
        }
        flags[k] = CellFlag::Refine;
        sum += errors[k];
        n_refine += 1;
    }
    let mut sum = 0.;
    for &k in order.iter().rev().take(n - n_refine) {
        sum += errors[k];
        if sum > bottom_fraction * total {
            break;
        }
        flags[k] = CellFlag::Coarsen;
    }
    for (flag, &level) in flags.iter_mut().zip(levels) {
        match flag {
            CellFlag::Refine if level >= max_level => *flag = CellFlag::None,
            CellFlag::Coarsen if level <= min_level => *flag = CellFlag::None,
            _ => (),
        }
    }
    flags
}
