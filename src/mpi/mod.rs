//! MPI Routines
//!
//! Every collective used by the solvers goes through the [`Communicator`]
//! trait. The serial communicator is the default, [`ThreadComm`] runs
//! several ranks as threads of one process and `MpiComm` (feature `mpi`)
//! wraps a real MPI world.
pub mod comm;
pub mod partition;
#[cfg(feature = "mpi")]
pub use comm::MpiComm;
pub use comm::{Communicator, SerialComm, ThreadComm};
pub use partition::Partition;
