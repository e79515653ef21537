//! Newton iteration within one time step
use super::controller::{NonlinearStep, StepReport};
use super::system::FluidSystem;
use crate::constraints::ConstraintKind;
use crate::discretization::Linearization;
use crate::error::{Error, Result};
use crate::time::TimeState;

/// Residual norm below which the iteration stops regardless of the
/// relative reduction
pub const ABSOLUTE_FLOOR: f64 = 1e-14;

/// Newton step controller
#[derive(Debug, Clone, Copy)]
pub struct NewtonController {
    /// Target of `‖r_k‖ / ‖r_0‖`
    pub tolerance: f64,
    /// Iterations before the step is declared divergent
    pub max_iterations: usize,
}

impl Default for NewtonController {
    fn default() -> Self {
        Self::new(1e-8, 8)
    }
}

impl NewtonController {
    /// New controller
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }
}

impl NonlinearStep for NewtonController {
    fn run_one_step(&mut self, system: &mut FluidSystem, time: &TimeState) -> Result<StepReport> {
        let apply_nonzero = time.step() == 1;
        system.begin_newton();

        let mut iteration = 0;
        let mut initial_residual = 1.;
        let mut current_residual = 1.;
        let mut relative_residual = 1.;
        let mut linear_solves = Vec::new();
        let mut residuals = Vec::new();
        while relative_residual > self.tolerance && current_residual > ABSOLUTE_FLOOR {
            if iteration >= self.max_iterations {
                return Err(Error::NewtonDivergence {
                    iterations: iteration,
                    relative_residual,
                });
            }
            let kind = ConstraintKind::select(apply_nonzero && iteration == 0);
            system.reset_update();
            system.assemble(kind, Linearization::Newton, true)?;
            current_residual = system.rhs_norm();
            linear_solves.push(system.solve(kind)?);
            system.add_update_to_evaluation();

            if iteration == 0 {
                initial_residual = current_residual;
            }
            relative_residual = if initial_residual > 0. {
                current_residual / initial_residual
            } else {
                0.
            };
            residuals.push(relative_residual);
            if system.is_root() {
                log::info!(
                    "Newton iteration {}: ||r|| = {:.3e}, ||r||/||r0|| = {:.3e}",
                    iteration,
                    current_residual,
                    relative_residual
                );
            }
            iteration += 1;
        }
        system.commit_evaluation();
        Ok(StepReport {
            step: time.step(),
            rebuilt: true,
            matrix_generation: system.matrix_generation(),
            linear_solves,
            residuals,
        })
    }
}
