//! Error type shared by all solver components
//!
//! Every failure is fatal for the run. There is no retry anywhere,
//! the only iteration that is allowed to fail and continue is the
//! Newton loop itself.
use thiserror::Error;

/// Errors raised by configuration, solvers and mesh bookkeeping
#[derive(Error, Debug)]
pub enum Error {
    /// Unrecognized boundary condition flag, malformed mask, ...
    #[error("configuration error: {0}")]
    Config(String),
    /// Parameter file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the file
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Parameter file is not valid toml
    #[error("failed to parse parameter file: {0}")]
    Parse(#[from] toml::de::Error),
    /// Iterative solver exceeded its iteration budget
    #[error("{solver} did not converge in {steps} iterations (residual {residual:e}, target {tolerance:e})")]
    NoConvergence {
        /// Name of the solver
        solver: &'static str,
        /// Iterations taken
        steps: usize,
        /// Last residual
        residual: f64,
        /// Requested tolerance
        tolerance: f64,
    },
    /// Krylov iteration broke down before reaching the tolerance
    #[error("{solver} broke down after {steps} iterations")]
    Breakdown {
        /// Name of the solver
        solver: &'static str,
        /// Iterations taken
        steps: usize,
    },
    /// Newton loop exceeded its maximum number of iterations
    #[error("Too many Newton iterations! ({iterations}, relative residual {relative_residual:e})")]
    NewtonDivergence {
        /// Iterations taken
        iterations: usize,
        /// Relative residual at abort
        relative_residual: f64,
    },
    /// Direct factorization hit a zero pivot
    #[error("zero pivot in row {row} of the direct factorization")]
    ZeroPivot {
        /// Row of the pivot
        row: usize,
    },
    /// Mesh/DOF bookkeeping is inconsistent
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Result alias with the crate error
pub type Result<T> = std::result::Result<T, Error>;
