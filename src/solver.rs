//! # Collection of linear algebra Solver
//!
//! Iterative solvers work on the distributed vectors of [`crate::linalg`],
//! every inner product is a collective.
//!
//! - [`SolverCg`]: preconditioned conjugate gradients for the symmetric
//!   blocks (pressure mass, Schur surrogate, IMEX velocity block)
//! - [`SolverFgmres`]: flexible restarted GMRES for the saddle-point
//!   system, tolerates a preconditioner that changes between calls
//! - [`BandedLu`]: direct solver for the velocity block
#![allow(clippy::module_name_repetitions)]
pub mod banded;
pub mod cg;
pub mod control;
pub mod fgmres;
pub mod ilu;
pub mod precondition;
pub use banded::BandedLu;
pub use cg::SolverCg;
pub use control::{SolverControl, SolverState};
pub use fgmres::{BlockPrecondition, SolverFgmres};
pub use ilu::SparseIlu;
pub use precondition::{Precondition, PreconditionIdentity, PreconditionJacobi, Preconditioner};
