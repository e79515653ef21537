//! # Channel flow simulation
//! Solver for the 2-dimensional incompressible Navier-Stokes equations
//! on an adaptively refined mesh.
//!
//! # Example
//! Flow past a channel with parabolic inflow
//! ```
//! use rustfluid::config::Parameters;
//! use rustfluid::mpi::SerialComm;
//! use rustfluid::navier_stokes::Navier2D;
//! use rustfluid::{integrate, Integrate};
//! use std::sync::Arc;
//!
//! let parameters = Parameters::from_toml(
//!     r#"
//!     end_time = 0.02
//!     time_step = 0.01
//!     output_interval = 0.01
//!     use_hard_coded_values = true
//!
//!     [dirichlet_bcs.0]
//!     flag = "xy"
//!     [dirichlet_bcs.2]
//!     flag = "xy"
//!     [dirichlet_bcs.3]
//!     flag = "xy"
//!     "#,
//! )
//! .unwrap();
//! let mut navier = Navier2D::new(&parameters, Arc::new(SerialComm)).unwrap();
//! integrate(&mut navier, 0.02).unwrap();
//! assert_eq!(navier.history().entries().len(), 3);
//! ```
use super::controller::{NonlinearController, NonlinearStep, StepReport};
use super::output::{OutputHistory, Snapshot};
use super::refine::refine_mesh;
use super::system::FluidSystem;
use crate::config::{ControllerKind, Parameters, VelocitySolverKind};
use crate::constraints::ConstraintKind;
use crate::discretization::Physics;
use crate::error::Result;
use crate::fem::QuadDiscretization;
use crate::linalg::{BlockVector, GhostedBlockVector};
use crate::mpi::Communicator;
use crate::time::TimeState;
use crate::Integrate;
use ndarray::Array1;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use std::sync::Arc;

/// Implicit Navier-Stokes solver with adaptive refinement
#[derive(Debug)]
pub struct Navier2D {
    system: FluidSystem,
    controller: NonlinearController,
    time: TimeState,
    min_level: usize,
    max_level: usize,
    history: OutputHistory,
    last_snapshot: Option<Snapshot>,
    reports: Vec<StepReport>,
}

impl Navier2D {
    /// Build mesh, DOFs and system from a validated parameter set.
    ///
    /// The Newton controller always factorizes the velocity block
    /// directly, its operator is not symmetric.
    ///
    /// # Errors
    /// Invalid boundary conditions, or the mesh cannot be refined to
    /// `global_refinements`.
    pub fn new(parameters: &Parameters, comm: Arc<dyn Communicator>) -> Result<Self> {
        let bcs = parameters.boundary_conditions()?;
        let discretization =
            QuadDiscretization::new(&parameters.domain, parameters.global_refinements)?;
        let physics = Physics {
            viscosity: parameters.viscosity,
            rho: parameters.fluid_rho,
            grad_div: parameters.grad_div,
        };
        let mut velocity_solver = parameters.velocity_solver;
        if parameters.controller == ControllerKind::Newton
            && velocity_solver != VelocitySolverKind::Direct
        {
            log::info!("Newton controller: using the direct velocity solver");
            velocity_solver = VelocitySolverKind::Direct;
        }
        let system = FluidSystem::new(
            Box::new(discretization),
            comm,
            bcs,
            physics,
            parameters.time_step,
            velocity_solver,
        )?;
        Ok(Self {
            system,
            controller: NonlinearController::from_parameters(parameters),
            time: TimeState::from_parameters(parameters),
            min_level: parameters.min_level,
            max_level: parameters.max_level(),
            history: OutputHistory::new(),
            last_snapshot: None,
            reports: Vec::new(),
        })
    }

    /// Shared solver state
    pub fn system(&self) -> &FluidSystem {
        &self.system
    }

    /// Mutable solver state, e.g. to set the cell properties of a
    /// coupled solver between steps
    pub fn system_mut(&mut self) -> &mut FluidSystem {
        &mut self.system
    }

    /// Simulation clock
    pub fn time(&self) -> &TimeState {
        &self.time
    }

    /// Read-only view of the present solution
    pub fn get_current_solution(&self) -> &GhostedBlockVector {
        self.system.get_current_solution()
    }

    /// Every output written so far
    pub fn history(&self) -> &OutputHistory {
        &self.history
    }

    /// Most recent snapshot
    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last_snapshot.as_ref()
    }

    /// One report per completed time step
    pub fn reports(&self) -> &[StepReport] {
        &self.reports
    }

    fn initial_constraints(&self) -> ConstraintKind {
        ConstraintKind::select(self.time.step() > 0)
    }

    /// Set the present solution from functions of the position
    ///
    /// # Errors
    /// Field does not fit the DOF layout.
    pub fn set_initial(
        &mut self,
        velocity: &dyn Fn([f64; 2]) -> [f64; 2],
        pressure: &dyn Fn([f64; 2]) -> f64,
    ) -> Result<()> {
        let mut field = BlockVector::zeros(self.system.partitions());
        self.system
            .discretization()
            .interpolate_function(velocity, pressure, &mut field);
        let kind = self.initial_constraints();
        self.system.set_present(field, kind)
    }

    /// Add uniform noise in `[-amp, amp]` to the free velocity DOFs
    ///
    /// # Errors
    /// Field does not fit the DOF layout.
    pub fn random_disturbance(&mut self, amp: f64) -> Result<()> {
        if amp <= 0. {
            return Ok(());
        }
        let mut field = self.system.present().clone();
        let velocity = field.block_mut(0);
        let first = velocity.partition().first_owned();
        let noise = Array1::random(velocity.local().len(), Uniform::new(-amp, amp));
        let constraints = &self.system.constraints().nonzero;
        for (i, (v, n)) in velocity.local_mut().iter_mut().zip(noise.iter()).enumerate() {
            if !constraints.is_constrained(first + i) {
                *v += n;
            }
        }
        let kind = self.initial_constraints();
        self.system.set_present(field, kind)
    }
}

impl Integrate for Navier2D {
    fn update(&mut self) -> Result<()> {
        self.time.increment();
        if self.system.is_root() {
            log::info!(
                "Time step {} at t={:.6}",
                self.time.step(),
                self.time.current()
            );
        }
        let report = self.controller.run_one_step(&mut self.system, &self.time)?;
        self.reports.push(report);
        Ok(())
    }

    fn get_time(&self) -> f64 {
        self.time.current()
    }

    fn get_dt(&self) -> f64 {
        self.time.dt()
    }

    fn output_due(&self) -> bool {
        self.time.time_to_output()
    }

    fn callback(&mut self) {
        let snapshot = Snapshot::new(&self.system, &self.time);
        self.history.push(&snapshot);
        if self.system.is_root() {
            log::info!("Output {} at t={:.6}", snapshot.name(), snapshot.time);
        }
        self.last_snapshot = Some(snapshot);
    }

    fn adapt(&mut self) -> Result<()> {
        if self.time.time_to_refine() {
            refine_mesh(&mut self.system, self.min_level, self.max_level)?;
        }
        Ok(())
    }

    fn exit(&mut self) -> bool {
        !self.time.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrate;
    use crate::mpi::SerialComm;

    const CHANNEL: &str = r#"
        viscosity = 1e-3
        fluid_rho = 1.0
        end_time = 0.03
        time_step = 0.01
        output_interval = 0.01
        global_refinements = 1
        controller = "imex"
        velocity_solver = "cg_ilu"
        use_hard_coded_values = true

        [domain]
        origin = [0.0, 0.0]
        size = [2.2, 0.41]
        subdivisions = [4, 1]

        [dirichlet_bcs.0]
        flag = "xy"
        [dirichlet_bcs.2]
        flag = "xy"
        [dirichlet_bcs.3]
        flag = "xy"
    "#;

    fn channel(parameters: &Parameters) -> Navier2D {
        Navier2D::new(parameters, Arc::new(SerialComm)).unwrap()
    }

    #[test]
    fn test_three_step_channel() {
        let parameters = Parameters::from_toml(CHANNEL).unwrap();
        let mut navier = channel(&parameters);
        let n_u = navier.system().layout().dofs_per_block[0];
        integrate(&mut navier, 0.03).unwrap();

        let reports = navier.reports();
        assert_eq!(reports.len(), 3);
        assert!(reports[0].rebuilt && reports[1].rebuilt);
        assert!(!reports[2].rebuilt);
        assert_eq!(reports[2].matrix_generation, reports[1].matrix_generation);
        for report in reports {
            let state = report.linear_solves[0];
            assert!(state.residual < state.initial_residual);
            assert!(state.steps < n_u);
        }

        // step 0 and every step afterwards
        let names: Vec<&str> = navier
            .history()
            .entries()
            .iter()
            .map(|(_, name)| name.as_str())
            .collect();
        assert_eq!(names, ["fluid-00000", "fluid-00001", "fluid-00002", "fluid-00003"]);
        assert_eq!(navier.last_snapshot().map(|s| s.step), Some(3));
    }

    #[test]
    fn test_refinement_during_run() {
        let mut parameters = Parameters::from_toml(CHANNEL).unwrap();
        parameters.refinement_interval = 0.02;
        parameters.output_interval = 1.;
        let mut navier = channel(&parameters);
        let cells = navier.system().layout().n_cells;
        integrate(&mut navier, 0.03).unwrap();
        assert_ne!(navier.system().layout().n_cells, cells);
        // the step after the refinement starts from fresh matrices
        assert!(navier.reports()[2].rebuilt);
        assert_eq!(navier.history().entries().len(), 1);
    }

    #[test]
    fn test_newton_uses_direct_solver() {
        let mut parameters = Parameters::from_toml(CHANNEL).unwrap();
        parameters.controller = ControllerKind::Newton;
        let navier = channel(&parameters);
        assert_eq!(navier.system().velocity_solver, VelocitySolverKind::Direct);
    }

    #[test]
    fn test_random_disturbance_keeps_boundary_values() {
        let parameters = Parameters::from_toml(CHANNEL).unwrap();
        let mut navier = channel(&parameters);
        navier.random_disturbance(1e-3).unwrap();
        let present = navier.system().present().clone();
        let n_u = present.dofs_per_block()[0];
        let constraints = navier.system().constraints().nonzero.clone();
        let mut free = 0.;
        for i in 0..n_u {
            let value = present.get(i).unwrap();
            if constraints.is_constrained(i) {
                assert!(value == 0., "constrained dof {} got {}", i, value);
            } else {
                free += value.abs();
            }
        }
        assert!(free > 0.);

        // boundary values arrive with the first step
        navier.update().unwrap();
        for line in constraints.lines().filter(|l| l.index < n_u && l.entries.is_empty()) {
            let value = navier.system().present().get(line.index).unwrap();
            assert!((value - line.inhomogeneity).abs() < 1e-12);
        }
    }

    #[test]
    fn test_set_initial_from_functions() {
        let parameters = Parameters::from_toml(CHANNEL).unwrap();
        let mut navier = channel(&parameters);
        navier
            .set_initial(&|_: [f64; 2]| [0.1, 0.], &|x: [f64; 2]| x[0])
            .unwrap();
        let solution = navier.get_current_solution();
        let n_p = solution.dofs_per_block()[1];
        assert!(solution.block(1).iter().any(|p| *p > 1.));
        assert_eq!(solution.block(1).len(), n_p);
        assert!(solution.block(0).iter().any(|u| (u - 0.1).abs() < 1e-14));
    }
}
