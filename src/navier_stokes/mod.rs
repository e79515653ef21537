//! Incompressible Navier--Stokes solver
pub mod controller;
pub mod imex;
pub mod navier;
pub mod newton;
pub mod output;
pub mod preconditioner;
pub mod refine;
pub mod schur;
pub mod system;
pub use controller::{NonlinearController, NonlinearStep, StepReport};
pub use imex::ImexController;
pub use navier::Navier2D;
pub use newton::NewtonController;
pub use output::{OutputHistory, Snapshot};
pub use preconditioner::BlockSchurPreconditioner;
pub use refine::{refine_mesh, RefinementReport};
pub use system::FluidSystem;

#[cfg(test)]
pub(crate) mod tests {
    use super::system::FluidSystem;
    use crate::config::{BoundaryConditions, Domain, VelocitySolverKind};
    use crate::discretization::Physics;
    use crate::fem::QuadDiscretization;
    use crate::mpi::Communicator;
    use std::sync::Arc;

    /// Channel with parabolic inflow on 16 cells
    pub(crate) fn channel_system(
        comm: Arc<dyn Communicator>,
        velocity_solver: VelocitySolverKind,
    ) -> FluidSystem {
        let domain = Domain::default();
        let discretization = QuadDiscretization::new(&domain, 1).unwrap();
        let physics = Physics {
            viscosity: 1e-3,
            rho: 1.,
            grad_div: 0.,
        };
        FluidSystem::new(
            Box::new(discretization),
            comm,
            BoundaryConditions::channel(domain.origin, domain.size),
            physics,
            0.01,
            velocity_solver,
        )
        .unwrap()
    }
}
