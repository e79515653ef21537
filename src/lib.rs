//! # `rustfluid`: Block-preconditioned Navier-Stokes solver
//!
//! Solves the 2-dimensional incompressible Navier-Stokes equations
//! with stable finite elements on adaptively refined quadrilateral
//! meshes.
//!
//! # Details
//!
//! The saddle point system of every time step is solved with FGMRES,
//! preconditioned by a block triangular Schur complement approximation
//! (see [`navier_stokes::preconditioner`]). Two nonlinear strategies share
//! the solver stack:
//! - `IMEX`: convection explicit, the operator is frozen after the
//!   second step, see [`navier_stokes::imex`]
//! - `Newton`: full Newton iteration per step, runs distributed, see
//!   [`navier_stokes::newton`]
//!
//! The mesh is adapted every `refinement_interval` with a Kelly type
//! estimator and fixed fraction flagging, the solution is carried over
//! to the new mesh.
//!
//! Mesh, DOF numbering and assembly sit behind the traits of
//! [`discretization`]. [`fem`] is the reference implementation.
//!
//! # Example
//! Run a parameter file
//!
//! `cargo run --release -- channel.toml`
//!
//! Log output is controlled with `RUST_LOG` (default `info`).
//!
//! ## Parallel runs
//!
//! Build with the `mpi` feature and run with
//!
//! `cargo mpirun --np 2 --bin rustfluid --features mpi -- channel.toml`
#![warn(missing_docs)]
#![allow(clippy::unnecessary_cast)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#[macro_use]
extern crate enum_dispatch;
pub mod cell_property;
pub mod config;
pub mod constraints;
pub mod discretization;
pub mod error;
pub mod fem;
pub mod linalg;
pub mod mpi;
pub mod navier_stokes;
pub mod solver;
pub mod time;
pub use error::{Error, Result};

const MAX_TIMESTEP: usize = 10_000_000;

/// Integrate trait, step forward in time, and write results
pub trait Integrate {
    /// Update solution
    ///
    /// # Errors
    /// Solver failure, fatal for the run.
    fn update(&mut self) -> Result<()>;
    /// Receive current time
    fn get_time(&self) -> f64;
    /// Get timestep
    fn get_dt(&self) -> f64;
    /// Is an output due after the last update
    fn output_due(&self) -> bool {
        false
    }
    /// Callback function (can be used for i/o)
    fn callback(&mut self);
    /// Change the mesh after the output, if due
    ///
    /// # Errors
    /// Refinement failed.
    fn adapt(&mut self) -> Result<()> {
        Ok(())
    }
    /// Additional break criteria
    fn exit(&mut self) -> bool;
}

/// Integrade pde, that implements the Integrate trait.
///
/// `callback` is called once before the first step and then whenever
/// [`Integrate::output_due`] says so.
///
/// Stop Criteria:
/// 1. Timestep limit
/// 2. Time limit
/// 3. [`Integrate::exit`]
///
/// # Errors
/// First error of [`Integrate::update`] or [`Integrate::adapt`].
pub fn integrate<T: Integrate>(pde: &mut T, max_time: f64) -> Result<()> {
    let mut timestep: usize = 0;
    let eps_dt = pde.get_dt() * 1e-4;
    pde.callback();
    loop {
        // Update
        pde.update()?;
        timestep += 1;

        // Save
        if pde.output_due() {
            pde.callback();
        }

        // Refine
        pde.adapt()?;

        // Break
        if pde.get_time() + eps_dt >= max_time {
            log::info!("time limit reached: {:?}", pde.get_time());
            break;
        }
        if timestep >= MAX_TIMESTEP {
            log::info!("timestep limit reached: {:?}", timestep);
            break;
        }
        if pde.exit() {
            log::info!("break criteria triggered");
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        time: f64,
        outputs: usize,
        adapts: usize,
    }

    impl Integrate for Counter {
        fn update(&mut self) -> Result<()> {
            self.time += 0.1;
            Ok(())
        }
        fn get_time(&self) -> f64 {
            self.time
        }
        fn get_dt(&self) -> f64 {
            0.1
        }
        fn output_due(&self) -> bool {
            true
        }
        fn callback(&mut self) {
            self.outputs += 1;
        }
        fn adapt(&mut self) -> Result<()> {
            self.adapts += 1;
            Ok(())
        }
        fn exit(&mut self) -> bool {
            false
        }
    }

    #[test]
    fn test_integrate_stops_at_time_limit() {
        let mut pde = Counter {
            time: 0.,
            outputs: 0,
            adapts: 0,
        };
        integrate(&mut pde, 0.5).unwrap();
        assert_eq!(pde.adapts, 5);
        assert_eq!(pde.outputs, 6);
    }
}
