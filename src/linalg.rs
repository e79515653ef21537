//! # Distributed linear algebra
//!
//! Vectors and sparse matrices whose rows are split over the ranks of a
//! [`Partition`](crate::mpi::Partition).
//!
//! Owned vectors ([`Vector`], [`BlockVector`]) hold the entries this rank
//! owns and are the only mutable copies. A [`GhostedBlockVector`] holds a
//! read-only replica of all entries. The only way to fill one is
//! [`GhostedBlockVector::publish`].
pub mod block;
pub mod ghosted;
pub mod sparse;
pub mod sparsity;
pub mod vector;
pub use block::{BlockSparseMatrix, BlockSparsityPattern};
pub use ghosted::GhostedBlockVector;
pub use sparse::SparseMatrix;
pub use sparsity::{DynamicSparsityPattern, SparsityPattern};
pub use vector::{BlockVector, Vector};
