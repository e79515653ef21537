//! Stopping criteria and solver reports

/// Iteration budget and absolute residual tolerance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverControl {
    /// Maximum number of iterations
    pub max_steps: usize,
    /// Stop when the residual norm drops to this value
    pub tolerance: f64,
}

impl SolverControl {
    /// New control
    pub fn new(max_steps: usize, tolerance: f64) -> Self {
        Self {
            max_steps,
            tolerance,
        }
    }

    /// Tolerance relative to the norm of the right hand side
    pub fn relative(max_steps: usize, reduction: f64, rhs_norm: f64) -> Self {
        Self::new(max_steps, reduction * rhs_norm)
    }

    /// Is `residual` small enough
    pub fn converged(&self, residual: f64) -> bool {
        residual <= self.tolerance
    }
}

/// Outcome of a converged solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverState {
    /// Iterations taken
    pub steps: usize,
    /// Residual norm at start
    pub initial_residual: f64,
    /// Final residual norm
    pub residual: f64,
}

impl SolverState {
    /// Final residual relative to the initial one
    pub fn relative_residual(&self) -> f64 {
        if self.initial_residual > 0. {
            self.residual / self.initial_residual
        } else {
            0.
        }
    }
}
