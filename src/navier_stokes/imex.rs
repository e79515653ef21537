//! Implicit-explicit time step
//!
//! Convection is taken from the present solution, so the operator
//! `ν∇² + γρ∇(∇·) + ρ/dt` does not change between steps. It is assembled
//! on step 1 (with the boundary values) and step 2 (with homogeneous
//! constraints) and reused afterwards, until the mesh changes.
use super::controller::{NonlinearStep, StepReport};
use super::system::FluidSystem;
use crate::constraints::ConstraintKind;
use crate::discretization::Linearization;
use crate::error::Result;
use crate::time::TimeState;

/// IMEX step controller
#[derive(Debug, Clone, Copy, Default)]
pub struct ImexController;

impl NonlinearStep for ImexController {
    fn run_one_step(&mut self, system: &mut FluidSystem, time: &TimeState) -> Result<StepReport> {
        let apply_nonzero = time.step() == 1;
        let rebuild = time.step() < 3 || !system.matrices_assembled();
        let kind = ConstraintKind::select(apply_nonzero);
        system.reset_update();
        system.assemble(kind, Linearization::Imex, rebuild)?;
        let state = system.solve(kind)?;
        system.add_update_to_present();
        Ok(StepReport {
            step: time.step(),
            rebuilt: rebuild,
            matrix_generation: system.matrix_generation(),
            linear_solves: vec![state],
            residuals: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::channel_system;
    use super::*;
    use crate::config::VelocitySolverKind;
    use crate::mpi::SerialComm;
    use std::sync::Arc;

    #[test]
    fn test_three_imex_steps() {
        let mut system = channel_system(Arc::new(SerialComm), VelocitySolverKind::CgIlu);
        let n_u = system.layout().dofs_per_block[0];
        let mut time = TimeState::new(0.03, 0.01, 0.01, 1.);
        let mut controller = ImexController;
        let mut reports = Vec::new();
        let mut matrices = Vec::new();
        for _ in 0..3 {
            time.increment();
            reports.push(controller.run_one_step(&mut system, &time).unwrap());
            matrices.push(Arc::clone(system.system_matrix()));
        }
        assert!(!time.is_running());

        assert!(reports[0].rebuilt && reports[1].rebuilt);
        assert!(!reports[2].rebuilt);
        assert_eq!(reports[2].matrix_generation, reports[1].matrix_generation);
        assert!(Arc::ptr_eq(&matrices[1], &matrices[2]));
        for report in &reports {
            let state = report.linear_solves[0];
            assert!(state.steps < n_u);
            assert!(state.residual < state.initial_residual);
        }
        // inflow is in the solution
        assert!(system.get_current_solution().l2_norm() > 0.);
    }
}
