//! Shared solver state of the IMEX and Newton controllers
//!
//! Owns the discretization, the constraint sets, the block matrices, the
//! owned and ghosted fields and the lazily built preconditioner. Every
//! DOF dependent object is rebuilt together in [`FluidSystem::setup`].
use super::preconditioner::BlockSchurPreconditioner;
use super::schur::schur_sparsity_pattern;
use crate::cell_property::{CellDataStorage, CellProperty};
use crate::config::{BoundaryConditions, VelocitySolverKind};
use crate::constraints::{ConstraintKind, Constraints};
use crate::discretization::{AssemblyRequest, Discretization, DofLayout, Linearization, Physics};
use crate::error::{Error, Result};
use crate::linalg::{
    BlockSparseMatrix, BlockSparsityPattern, BlockVector, DynamicSparsityPattern,
    GhostedBlockVector, SparsityPattern,
};
use crate::mpi::{Communicator, Partition};
use crate::solver::{SolverControl, SolverFgmres, SolverState};
use std::sync::Arc;

/// Outer FGMRES tolerance, relative to the rhs norm
pub const OUTER_REDUCTION: f64 = 1e-8;

/// Block system of one DOF layout and the fields living on it
pub struct FluidSystem {
    pub(super) discretization: Box<dyn Discretization>,
    pub(super) comm: Arc<dyn Communicator>,
    pub(super) bcs: BoundaryConditions,
    pub(super) physics: Physics,
    pub(super) time_step: f64,
    pub(super) velocity_solver: VelocitySolverKind,
    pub(super) layout: DofLayout,
    pub(super) partitions: [Arc<Partition>; 2],
    pub(super) constraints: Constraints,
    pub(super) pattern: Arc<BlockSparsityPattern>,
    pub(super) schur_pattern: Arc<SparsityPattern>,
    pub(super) system_matrix: Arc<BlockSparseMatrix>,
    pub(super) mass_matrix: Arc<BlockSparseMatrix>,
    pub(super) rhs: BlockVector,
    pub(super) present: BlockVector,
    pub(super) present_ghosted: GhostedBlockVector,
    pub(super) evaluation: BlockVector,
    pub(super) evaluation_ghosted: GhostedBlockVector,
    pub(super) update: BlockVector,
    pub(super) cell_property: CellDataStorage<CellProperty>,
    pub(super) preconditioner: Option<BlockSchurPreconditioner>,
    pub(super) matrices_assembled: bool,
    pub(super) matrix_generation: usize,
}

impl std::fmt::Debug for FluidSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FluidSystem")
            .field("layout", &self.layout)
            .field("physics", &self.physics)
            .field("time_step", &self.time_step)
            .field("matrix_generation", &self.matrix_generation)
            .finish()
    }
}

impl FluidSystem {
    /// Distribute DOFs, build constraints and allocate the system.
    ///
    /// The present solution starts at zero.
    ///
    /// # Errors
    /// Constraints could not be built.
    pub fn new(
        discretization: Box<dyn Discretization>,
        comm: Arc<dyn Communicator>,
        bcs: BoundaryConditions,
        physics: Physics,
        time_step: f64,
        velocity_solver: VelocitySolverKind,
    ) -> Result<Self> {
        let partitions = [
            Arc::new(Partition::new(0, Arc::clone(&comm))),
            Arc::new(Partition::new(0, Arc::clone(&comm))),
        ];
        let pattern = Arc::new(BlockSparsityPattern::new(
            &DynamicSparsityPattern::new(0, 0),
            [0, 0],
            &partitions,
        ));
        let schur_pattern = Arc::new(schur_sparsity_pattern(&pattern));
        let matrix = Arc::new(BlockSparseMatrix::new(&pattern, &partitions));
        let vector = BlockVector::zeros(&partitions);
        let ghosted = GhostedBlockVector::zeros(&partitions);
        let mut system = Self {
            discretization,
            comm,
            bcs,
            physics,
            time_step,
            velocity_solver,
            layout: DofLayout::default(),
            partitions,
            constraints: Constraints::default(),
            pattern,
            schur_pattern,
            system_matrix: Arc::clone(&matrix),
            mass_matrix: matrix,
            rhs: vector.clone(),
            present: vector.clone(),
            present_ghosted: ghosted.clone(),
            evaluation: vector.clone(),
            evaluation_ghosted: ghosted,
            update: vector,
            cell_property: CellDataStorage::new(),
            preconditioner: None,
            matrices_assembled: false,
            matrix_generation: 0,
        };
        system.setup()?;
        Ok(system)
    }

    /// Rebuild every DOF dependent object from the current mesh.
    /// Fields are reset to zero.
    ///
    /// # Errors
    /// Constraints could not be built.
    pub fn setup(&mut self) -> Result<()> {
        self.setup_dofs();
        self.make_constraints()?;
        self.initialize_system();
        Ok(())
    }

    /// Number the DOFs, split them over the ranks and reset the cell
    /// property storage
    pub fn setup_dofs(&mut self) {
        self.layout = self.discretization.distribute_dofs();
        let [n_u, n_p] = self.layout.dofs_per_block;
        self.partitions = [
            Arc::new(Partition::new(n_u, Arc::clone(&self.comm))),
            Arc::new(Partition::new(n_p, Arc::clone(&self.comm))),
        ];
        self.cell_property
            .initialize(self.layout.n_cells, self.discretization.n_q_points());
        if self.is_root() {
            log::info!(
                "Number of active cells: {}, degrees of freedom: {} ({}+{})",
                self.layout.n_cells,
                self.layout.n_dofs(),
                n_u,
                n_p
            );
        }
    }

    /// Zero and nonzero constraint sets of the current DOFs
    ///
    /// # Errors
    /// Constraints are cyclic.
    pub fn make_constraints(&mut self) -> Result<()> {
        self.constraints = self.discretization.make_constraints(&self.bcs)?;
        Ok(())
    }

    /// Sparsity patterns, matrices and vectors of the current DOFs
    pub fn initialize_system(&mut self) {
        let dsp = self
            .discretization
            .make_sparsity_pattern(&self.constraints.nonzero);
        self.pattern = Arc::new(BlockSparsityPattern::new(
            &dsp,
            self.layout.dofs_per_block,
            &self.partitions,
        ));
        self.schur_pattern = Arc::new(schur_sparsity_pattern(&self.pattern));
        self.preconditioner = None;
        self.system_matrix = Arc::new(BlockSparseMatrix::new(&self.pattern, &self.partitions));
        self.mass_matrix = Arc::new(BlockSparseMatrix::new(&self.pattern, &self.partitions));
        self.matrices_assembled = false;
        let zeros = BlockVector::zeros(&self.partitions);
        self.rhs = zeros.clone();
        self.present = zeros.clone();
        self.evaluation = zeros.clone();
        self.update = zeros;
        self.present_ghosted = GhostedBlockVector::zeros(&self.partitions);
        self.evaluation_ghosted = GhostedBlockVector::zeros(&self.partitions);
    }

    /// Assemble the right hand side and, if `rebuild`, the system and
    /// mass matrices.
    ///
    /// IMEX linearizes around the present solution. Newton linearizes
    /// around the evaluation point with the present solution as the
    /// previous time level.
    ///
    /// # Errors
    /// See [`crate::discretization::Assembler::assemble`].
    pub fn assemble(
        &mut self,
        kind: ConstraintKind,
        linearization: Linearization,
        rebuild: bool,
    ) -> Result<()> {
        if rebuild {
            // drop the matrix handles held by the preconditioner first
            self.preconditioner = None;
            self.matrix_generation += 1;
            log::debug!("rebuilding system matrices (generation {})", self.matrix_generation);
        }
        let evaluation_point = match linearization {
            Linearization::Imex => &self.present_ghosted,
            Linearization::Newton => &self.evaluation_ghosted,
        };
        let request = AssemblyRequest {
            evaluation_point,
            previous: &self.present_ghosted,
            constraints: self.constraints.get(kind),
            cell_property: &self.cell_property,
            linearization,
            physics: self.physics,
            time_step: self.time_step,
            neumann: &self.bcs.neumann,
        };
        let (system, mass) = if rebuild {
            (
                Some(Arc::make_mut(&mut self.system_matrix)),
                Some(Arc::make_mut(&mut self.mass_matrix)),
            )
        } else {
            (None, None)
        };
        self.discretization
            .assemble(&request, system, mass, &mut self.rhs)?;
        if rebuild {
            self.matrices_assembled = true;
        }
        Ok(())
    }

    /// Solve for the update with FGMRES and the block preconditioner,
    /// then apply the selected constraint set to it.
    ///
    /// # Errors
    /// Outer or inner solver did not converge within its budget.
    pub fn solve(&mut self, kind: ConstraintKind) -> Result<SolverState> {
        if !self.matrices_assembled {
            return Err(Error::Invariant(
                "solve called before the system matrices were assembled".to_string(),
            ));
        }
        if self.preconditioner.is_none() {
            self.preconditioner = Some(BlockSchurPreconditioner::new(
                Arc::clone(&self.system_matrix),
                Arc::clone(&self.mass_matrix),
                &self.pattern,
                &self.schur_pattern,
                &self.partitions,
                self.physics,
                self.time_step,
                self.velocity_solver,
            )?);
        }
        let preconditioner = self
            .preconditioner
            .as_ref()
            .ok_or_else(|| Error::Invariant("missing preconditioner".to_string()))?;
        let control = SolverControl::relative(
            self.layout.dofs_per_block[0],
            OUTER_REDUCTION,
            self.rhs.l2_norm(),
        );
        let state =
            SolverFgmres::new(control).solve(&self.system_matrix, &mut self.update, &self.rhs, preconditioner)?;
        self.constraints.get(kind).distribute(&mut self.update);
        if self.is_root() {
            log::info!(
                "FGMRES steps: {}, residual: {:.3e} -> {:.3e}",
                state.steps,
                state.initial_residual,
                state.residual
            );
        }
        Ok(state)
    }

    /// update = 0
    pub fn reset_update(&mut self) {
        self.update.fill(0.);
    }

    /// present += update, then refresh the ghosted copy
    pub fn add_update_to_present(&mut self) {
        self.present.axpy(1., &self.update);
        self.present_ghosted.publish(&self.present);
    }

    /// evaluation point = present solution
    pub fn begin_newton(&mut self) {
        self.evaluation.assign(&self.present);
        self.evaluation_ghosted.publish(&self.evaluation);
    }

    /// evaluation += update, re-apply the nonzero constraints and refresh
    /// the ghosted copy
    pub fn add_update_to_evaluation(&mut self) {
        self.evaluation.axpy(1., &self.update);
        self.constraints.nonzero.distribute(&mut self.evaluation);
        self.evaluation_ghosted.publish(&self.evaluation);
    }

    /// present = evaluation point
    pub fn commit_evaluation(&mut self) {
        self.present.assign(&self.evaluation);
        self.present_ghosted.publish(&self.present);
    }

    /// Replace the present solution, applying the constraints of `kind`.
    ///
    /// Before the first step the boundary values still arrive with the
    /// first update, so initial fields take [`ConstraintKind::Zero`].
    ///
    /// # Errors
    /// `field` does not match the DOF layout.
    pub fn set_present(&mut self, mut field: BlockVector, kind: ConstraintKind) -> Result<()> {
        if field.dofs_per_block() != self.layout.dofs_per_block {
            return Err(Error::Invariant(format!(
                "field with {:?} dofs, system has {:?}",
                field.dofs_per_block(),
                self.layout.dofs_per_block
            )));
        }
        self.constraints.get(kind).distribute(&mut field);
        self.present = field;
        self.present_ghosted.publish(&self.present);
        Ok(())
    }

    /// Read-only view of the present solution, for coupled solvers
    pub fn get_current_solution(&self) -> &GhostedBlockVector {
        &self.present_ghosted
    }

    /// Owned part of the present solution
    pub fn present(&self) -> &BlockVector {
        &self.present
    }

    /// Norm of the last assembled right hand side
    pub fn rhs_norm(&self) -> f64 {
        self.rhs.l2_norm()
    }

    /// Coupling data, written by an external solver between steps
    pub fn cell_property_mut(&mut self) -> &mut CellDataStorage<CellProperty> {
        &mut self.cell_property
    }

    /// Coupling data
    pub fn cell_property(&self) -> &CellDataStorage<CellProperty> {
        &self.cell_property
    }

    /// System matrix of the last rebuild
    pub fn system_matrix(&self) -> &Arc<BlockSparseMatrix> {
        &self.system_matrix
    }

    /// Mass matrix of the last rebuild
    pub fn mass_matrix(&self) -> &Arc<BlockSparseMatrix> {
        &self.mass_matrix
    }

    /// Have the matrices been assembled since the last DOF distribution
    pub fn matrices_assembled(&self) -> bool {
        self.matrices_assembled
    }

    /// Counts matrix rebuilds
    pub fn matrix_generation(&self) -> usize {
        self.matrix_generation
    }

    /// Preconditioner of the current matrices, if built
    pub fn preconditioner(&self) -> Option<&BlockSchurPreconditioner> {
        self.preconditioner.as_ref()
    }

    /// Current DOF layout
    pub fn layout(&self) -> DofLayout {
        self.layout
    }

    /// Partitions of the velocity and pressure blocks
    pub fn partitions(&self) -> &[Arc<Partition>; 2] {
        &self.partitions
    }

    /// Both constraint sets
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Mesh, DOFs and assembly
    pub fn discretization(&self) -> &dyn Discretization {
        self.discretization.as_ref()
    }

    /// Communicator of the distributed vectors
    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    /// Time step the matrices are built for
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Only rank 0 writes per step summaries
    pub fn is_root(&self) -> bool {
        self.comm.rank() == 0
    }
}
