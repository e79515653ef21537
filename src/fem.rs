//! # Reference discretization
//!
//! Adaptive quadrilateral mesh on a rectangle with hanging nodes,
//! Q1-iso-Q2 velocity and Q1 pressure. Implements every
//! [`crate::discretization`] trait.
//!
//! ```
//! use rustfluid::config::Domain;
//! use rustfluid::discretization::Discretization;
//! use rustfluid::fem::QuadDiscretization;
//! let mut fem = QuadDiscretization::new(&Domain::default(), 1).unwrap();
//! let layout = fem.distribute_dofs();
//! assert_eq!(layout.n_cells, 16);
//! ```
pub mod assemble;
pub mod dofs;
pub mod element;
pub mod estimate;
pub mod mesh;
pub mod transfer;
use crate::config::{BoundaryConditions, Domain};
use crate::constraints::{ConstraintSet, Constraints};
use crate::discretization::{
    Assembler, AssemblyRequest, CellFlag, Discretization, DofLayout, ErrorEstimator,
};
use crate::error::{Error, Result};
use crate::linalg::{BlockSparseMatrix, BlockVector, DynamicSparsityPattern, GhostedBlockVector};
pub use dofs::DofHandler;
pub use element::ReferenceElement;
pub use mesh::QuadMesh;
use transfer::SolutionSnapshot;

/// Mesh, DOFs and element of the reference discretization
#[derive(Debug, Clone)]
pub struct QuadDiscretization {
    mesh: QuadMesh,
    dofs: DofHandler,
    element: ReferenceElement,
    snapshot: Option<SolutionSnapshot>,
}

impl QuadDiscretization {
    /// Subdivided rectangle, refined `global_refinements` times
    ///
    /// # Errors
    /// Refinement beyond the finest level.
    pub fn new(domain: &Domain, global_refinements: usize) -> Result<Self> {
        let mut mesh = QuadMesh::new(domain.origin, domain.size, domain.subdivisions);
        mesh.refine_global(global_refinements)?;
        let dofs = DofHandler::new(&mesh);
        Ok(Self {
            mesh,
            dofs,
            element: ReferenceElement::new(),
            snapshot: None,
        })
    }

    /// Current mesh
    pub fn mesh(&self) -> &QuadMesh {
        &self.mesh
    }

    /// Current DOF numbering
    pub fn dof_handler(&self) -> &DofHandler {
        &self.dofs
    }

    /// Physical center of every active cell
    pub fn cell_centers(&self) -> Vec<[f64; 2]> {
        self.mesh
            .active_cells()
            .iter()
            .map(|&c| {
                let o = self.mesh.lattice_origin(c);
                let half = self.mesh.lattice_size(c) / 2;
                self.mesh.to_physical([o[0] + half, o[1] + half])
            })
            .collect()
    }
}

impl Assembler for QuadDiscretization {
    fn assemble(
        &self,
        request: &AssemblyRequest,
        system: Option<&mut BlockSparseMatrix>,
        mass: Option<&mut BlockSparseMatrix>,
        rhs: &mut BlockVector,
    ) -> Result<()> {
        assemble::assemble_cells(&self.mesh, &self.dofs, &self.element, request, system, mass, rhs)
    }
}

impl ErrorEstimator for QuadDiscretization {
    fn estimate_error(&self, field: &GhostedBlockVector) -> Result<Vec<f64>> {
        estimate::kelly_estimate(&self.mesh, &self.dofs, field)
    }
}

impl Discretization for QuadDiscretization {
    fn n_active_cells(&self) -> usize {
        self.mesh.n_active_cells()
    }

    fn n_q_points(&self) -> usize {
        element::N_Q_POINTS
    }

    fn cell_levels(&self) -> Vec<usize> {
        self.mesh
            .active_cells()
            .iter()
            .map(|&c| self.mesh.level(c))
            .collect()
    }

    fn distribute_dofs(&mut self) -> DofLayout {
        self.dofs = DofHandler::new(&self.mesh);
        DofLayout {
            dofs_per_block: self.dofs.dofs_per_block(),
            n_cells: self.mesh.n_active_cells(),
        }
    }

    fn cell_dofs(&self, cell: usize) -> Vec<usize> {
        self.dofs.local_dof_indices(cell).to_vec()
    }

    fn make_constraints(&self, bcs: &BoundaryConditions) -> Result<Constraints> {
        self.dofs.make_constraints(&self.mesh, bcs)
    }

    fn make_sparsity_pattern(&self, constraints: &ConstraintSet) -> DynamicSparsityPattern {
        let [n_u, n_p] = self.dofs.dofs_per_block();
        let mut dsp = DynamicSparsityPattern::new(n_u + n_p, n_u + n_p);
        for k in 0..self.mesh.n_active_cells() {
            constraints.add_entries_to_pattern(&self.dofs.local_dof_indices(k), &mut dsp);
        }
        dsp
    }

    fn prepare_coarsening_and_refinement(&mut self, field: &GhostedBlockVector) {
        self.snapshot = Some(SolutionSnapshot::record(&self.mesh, &self.dofs, field));
    }

    fn execute_coarsening_and_refinement(&mut self, flags: &[CellFlag]) -> Result<()> {
        self.mesh.execute(flags)
    }

    fn interpolate(&mut self, field: &mut BlockVector) -> Result<()> {
        let snapshot = self.snapshot.take().ok_or_else(|| {
            Error::Invariant("interpolate called without a prepared solution".to_string())
        })?;
        snapshot.interpolate(&self.mesh, &self.dofs, field)
    }

    fn interpolate_function(
        &self,
        velocity: &dyn Fn([f64; 2]) -> [f64; 2],
        pressure: &dyn Fn([f64; 2]) -> f64,
        field: &mut BlockVector,
    ) {
        let n_u = self.dofs.dofs_per_block()[0];
        for node in 0..self.dofs.n_velocity_nodes() {
            let u = velocity(self.mesh.to_physical(self.dofs.velocity_position(node)));
            field.set(2 * node, u[0]);
            field.set(2 * node + 1, u[1]);
        }
        for node in 0..self.dofs.n_pressure_nodes() {
            let p = pressure(self.mesh.to_physical(self.dofs.pressure_position(node)));
            field.set(n_u + node, p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpi::Partition;
    use std::sync::Arc;

    fn approx_eq(result: f64, expected: f64) {
        let dif = 1e-10;
        if (result - expected).abs() > dif {
            panic!("Large difference of values, got {} expected {}.", result, expected)
        }
    }

    fn domain() -> Domain {
        Domain {
            origin: [0., 0.],
            size: [2., 1.],
            subdivisions: [2, 1],
        }
    }

    fn field_of(fem: &QuadDiscretization, layout: &DofLayout) -> BlockVector {
        let partitions = [
            Arc::new(Partition::serial(layout.dofs_per_block[0])),
            Arc::new(Partition::serial(layout.dofs_per_block[1])),
        ];
        let mut field = BlockVector::zeros(&partitions);
        fem.interpolate_function(
            &|x| [1. + 2. * x[0] - x[1] + 0.5 * x[0] * x[1], x[1]],
            &|x| 3. * x[0] + x[1],
            &mut field,
        );
        field
    }

    #[test]
    fn test_refine_coarsen_transfer_is_exact_for_bilinear_fields() {
        let mut fem = QuadDiscretization::new(&domain(), 1).unwrap();
        let layout = fem.distribute_dofs();
        let field = field_of(&fem, &layout);

        let mut flags = vec![CellFlag::None; layout.n_cells];
        flags[0] = CellFlag::Refine;
        flags[5] = CellFlag::Refine;
        fem.prepare_coarsening_and_refinement(&GhostedBlockVector::from_owned(&field));
        fem.execute_coarsening_and_refinement(&flags).unwrap();
        let refined = fem.distribute_dofs();
        assert_eq!(refined.n_cells, layout.n_cells + 6);
        let mut transferred = field_of(&fem, &refined);
        let expected = transferred.clone();
        transferred.fill(0.);
        fem.interpolate(&mut transferred).unwrap();
        for i in 0..refined.dofs_per_block[0] + refined.dofs_per_block[1] {
            approx_eq(transferred.get(i).unwrap(), expected.get(i).unwrap());
        }

        // coarsen back to the original mesh
        let mut flags = vec![CellFlag::None; refined.n_cells];
        flags[0..4].fill(CellFlag::Coarsen);
        fem.prepare_coarsening_and_refinement(&GhostedBlockVector::from_owned(&transferred));
        fem.execute_coarsening_and_refinement(&flags).unwrap();
        let coarse = fem.distribute_dofs();
        assert_eq!(coarse.n_cells, layout.n_cells + 3);
        let mut back = field_of(&fem, &coarse);
        let expected = back.clone();
        back.fill(0.);
        fem.interpolate(&mut back).unwrap();
        for i in 0..coarse.dofs_per_block[0] + coarse.dofs_per_block[1] {
            approx_eq(back.get(i).unwrap(), expected.get(i).unwrap());
        }
        assert!(fem.interpolate(&mut back).is_err());
    }

    #[test]
    fn test_kelly_vanishes_for_linear_field() {
        let mut fem = QuadDiscretization::new(&domain(), 1).unwrap();
        let mut flags = vec![CellFlag::None; 8];
        flags[2] = CellFlag::Refine;
        fem.execute_coarsening_and_refinement(&flags).unwrap();
        let layout = fem.distribute_dofs();
        let partitions = [
            Arc::new(Partition::serial(layout.dofs_per_block[0])),
            Arc::new(Partition::serial(layout.dofs_per_block[1])),
        ];
        let mut field = BlockVector::zeros(&partitions);
        fem.interpolate_function(&|x| [x[0] - 2. * x[1], 3. * x[0]], &|_| 0., &mut field);
        let errors = fem.estimate_error(&GhostedBlockVector::from_owned(&field)).unwrap();
        assert_eq!(errors.len(), layout.n_cells);
        for e in &errors {
            approx_eq(*e, 0.);
        }

        // a kink at x = 1 is seen only by the cells touching it
        fem.interpolate_function(&|x| [(x[0] - 1.).abs(), 0.], &|_| 0., &mut field);
        let errors = fem.estimate_error(&GhostedBlockVector::from_owned(&field)).unwrap();
        let centers = fem.cell_centers();
        for (e, c) in errors.iter().zip(&centers) {
            let touches = (c[0] - 1.).abs() < 0.5;
            assert_eq!(*e > 1e-12, touches, "cell at {:?}", c);
        }
    }

    #[test]
    fn test_sparsity_and_assembly_shapes() {
        use crate::cell_property::{CellDataStorage, CellProperty};
        use crate::discretization::{Linearization, Physics};
        use crate::linalg::BlockSparsityPattern;

        let mut fem = QuadDiscretization::new(&domain(), 1).unwrap();
        let layout = fem.distribute_dofs();
        let bcs = BoundaryConditions::channel([0., 0.], [2., 1.]);
        let constraints = fem.make_constraints(&bcs).unwrap();
        let dsp = fem.make_sparsity_pattern(&constraints.nonzero);
        let partitions = [
            Arc::new(Partition::serial(layout.dofs_per_block[0])),
            Arc::new(Partition::serial(layout.dofs_per_block[1])),
        ];
        let pattern = BlockSparsityPattern::new(&dsp, layout.dofs_per_block, &partitions);
        let mut system = BlockSparseMatrix::new(&pattern, &partitions);
        let mut mass = BlockSparseMatrix::new(&pattern, &partitions);
        let mut rhs = BlockVector::zeros(&partitions);
        let zero = GhostedBlockVector::zeros(&partitions);
        let mut cell_property = CellDataStorage::<CellProperty>::new();
        cell_property.initialize(layout.n_cells, fem.n_q_points());
        let neumann = Default::default();
        let request = AssemblyRequest {
            evaluation_point: &zero,
            previous: &zero,
            constraints: &constraints.nonzero,
            cell_property: &cell_property,
            linearization: Linearization::Imex,
            physics: Physics {
                viscosity: 1e-3,
                rho: 1.,
                grad_div: 1.,
            },
            time_step: 0.1,
            neumann: &neumann,
        };
        fem.assemble(&request, Some(&mut system), Some(&mut mass), &mut rhs)
            .unwrap();

        // velocity mass of one component
        let n_u = layout.dofs_per_block[0];
        let free: Vec<usize> = (0..n_u).filter(|i| i % 2 == 0).collect();
        let mut area = 0.;
        for &i in &free {
            for &j in &free {
                area += mass.el(i, j);
            }
        }
        assert!(area > 0.);
        // symmetric velocity block
        for i in 0..n_u {
            for j in 0..n_u {
                approx_eq(system.el(i, j), system.el(j, i));
            }
        }
        // zero state: only the lifted inflow drives the rhs
        assert!(rhs.l2_norm() > 0.);

        let mut wrong = CellDataStorage::<CellProperty>::new();
        wrong.initialize(layout.n_cells + 1, fem.n_q_points());
        let request = AssemblyRequest {
            cell_property: &wrong,
            ..request
        };
        assert!(fem.assemble(&request, None, None, &mut rhs).is_err());
    }
    /// Right hand side at the zero state without constraints
    fn rhs_at_rest(
        fem: &QuadDiscretization,
        layout: &DofLayout,
        cell_property: &crate::cell_property::CellDataStorage<crate::cell_property::CellProperty>,
        neumann: &std::collections::BTreeMap<usize, f64>,
    ) -> BlockVector {
        use crate::discretization::{Linearization, Physics};

        let partitions = [
            Arc::new(Partition::serial(layout.dofs_per_block[0])),
            Arc::new(Partition::serial(layout.dofs_per_block[1])),
        ];
        let zero = GhostedBlockVector::zeros(&partitions);
        let constraints = ConstraintSet::new();
        let request = AssemblyRequest {
            evaluation_point: &zero,
            previous: &zero,
            constraints: &constraints,
            cell_property,
            linearization: Linearization::Imex,
            physics: Physics {
                viscosity: 1e-3,
                rho: 2.,
                grad_div: 0.,
            },
            time_step: 0.1,
            neumann,
        };
        let mut rhs = BlockVector::zeros(&partitions);
        fem.assemble(&request, None, None, &mut rhs).unwrap();
        rhs
    }

    /// Sums of the x and y velocity entries
    fn component_sums(rhs: &BlockVector, n_u: usize) -> [f64; 2] {
        let mut sums = [0.; 2];
        for i in 0..n_u {
            sums[i % 2] += rhs.get(i).unwrap();
        }
        sums
    }

    #[test]
    fn test_coupled_forcing_enters_the_rhs() {
        use crate::cell_property::{CellDataStorage, CellProperty, Phase};

        let mut fem = QuadDiscretization::new(&domain(), 1).unwrap();
        let layout = fem.distribute_dofs();
        let n_u = layout.dofs_per_block[0];
        let mut cell_property = CellDataStorage::<CellProperty>::new();
        cell_property.initialize(layout.n_cells, fem.n_q_points());
        let neumann = Default::default();
        let rest = rhs_at_rest(&fem, &layout, &cell_property, &neumann);
        approx_eq(rest.l2_norm(), 0.);

        // rho * a on one cell of area 0.25, rho = 2
        for point in cell_property.get_mut(0).unwrap() {
            point.indicator = Phase::Coupled;
            point.fsi_acceleration = [1., 0.];
        }
        let accelerated = rhs_at_rest(&fem, &layout, &cell_property, &neumann);
        let [sx, sy] = component_sums(&accelerated, n_u);
        approx_eq(sx, 0.5);
        approx_eq(sy, 0.);
        let cell_dofs = fem.cell_dofs(0);
        for i in 0..n_u {
            let value = accelerated.get(i).unwrap();
            if !cell_dofs.contains(&i) {
                approx_eq(value, 0.);
            }
        }

        // a constant stress moves load between nodes, not its total
        for point in cell_property.get_mut(0).unwrap() {
            point.fsi_stress = [[1., 0.], [0., 0.]];
        }
        let stressed = rhs_at_rest(&fem, &layout, &cell_property, &neumann);
        let [sx, _] = component_sums(&stressed, n_u);
        approx_eq(sx, 0.5);
        let mut change = stressed.clone();
        change.axpy(-1., &accelerated);
        assert!(change.l2_norm() > 1e-3);
        // fluid points ignore the coupling data
        for point in cell_property.get_mut(0).unwrap() {
            point.indicator = Phase::Fluid;
        }
        let fluid = rhs_at_rest(&fem, &layout, &cell_property, &neumann);
        approx_eq(fluid.l2_norm(), 0.);
    }

    #[test]
    fn test_neumann_pressure_acts_against_the_normal() {
        use crate::cell_property::{CellDataStorage, CellProperty};

        let mut fem = QuadDiscretization::new(&domain(), 1).unwrap();
        let layout = fem.distribute_dofs();
        let n_u = layout.dofs_per_block[0];
        let mut cell_property = CellDataStorage::<CellProperty>::new();
        cell_property.initialize(layout.n_cells, fem.n_q_points());
        let neumann = [(0, 2.), (1, 1.)].into_iter().collect();
        let rhs = rhs_at_rest(&fem, &layout, &cell_property, &neumann);

        // per boundary: -p n integrated over a face of height 1
        let mut left = 0.;
        let mut right = 0.;
        for node in 0..n_u / 2 {
            let x = fem.mesh().to_physical(fem.dof_handler().velocity_position(node));
            let fx = rhs.get(2 * node).unwrap();
            approx_eq(rhs.get(2 * node + 1).unwrap(), 0.);
            if x[0] < 1e-12 {
                left += fx;
            } else if (x[0] - 2.).abs() < 1e-12 {
                right += fx;
            } else {
                approx_eq(fx, 0.);
            }
        }
        approx_eq(left, 2.);
        approx_eq(right, -1.);
    }
}
