//! One physical time step of the nonlinear problem
use super::imex::ImexController;
use super::newton::NewtonController;
use super::system::FluidSystem;
use crate::config::{ControllerKind, Parameters};
use crate::error::Result;
use crate::solver::SolverState;
use crate::time::TimeState;

/// What happened during one time step
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Step index after the clock advanced
    pub step: usize,
    /// Were the system and mass matrices rebuilt
    pub rebuilt: bool,
    /// Generation of the matrices the last solve used
    pub matrix_generation: usize,
    /// One entry per outer FGMRES solve
    pub linear_solves: Vec<SolverState>,
    /// Relative Newton residual per iteration (empty for IMEX)
    pub residuals: Vec<f64>,
}

/// Advance the solution of `system` by one step of `time`
#[enum_dispatch]
pub trait NonlinearStep {
    /// `time` has already been incremented to the step being solved.
    ///
    /// # Errors
    /// A linear solve failed or the nonlinear iteration diverged.
    fn run_one_step(&mut self, system: &mut FluidSystem, time: &TimeState) -> Result<StepReport>;
}

/// Linearization strategies
#[enum_dispatch(NonlinearStep)]
#[derive(Debug, Clone)]
pub enum NonlinearController {
    /// Frozen operator after the first steps
    Imex(ImexController),
    /// Full Newton iteration per step
    Newton(NewtonController),
}

impl NonlinearController {
    /// Controller selected in the parameter file
    pub fn from_parameters(p: &Parameters) -> Self {
        match p.controller {
            ControllerKind::Imex => ImexController::default().into(),
            ControllerKind::Newton => NewtonController::new(p.tolerance, p.max_iterations).into(),
        }
    }
}
