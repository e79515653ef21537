//! Run a simulation from a parameter file:
//!
//! cargo run --release -- channel.toml
//!
//! Parallel:
//!
//! cargo mpirun --np 2 --bin rustfluid --features mpi -- channel.toml
use rustfluid::config::Parameters;
use rustfluid::integrate;
use rustfluid::mpi::Communicator;
use rustfluid::navier_stokes::Navier2D;
use std::sync::Arc;

#[cfg(feature = "mpi")]
fn communicator() -> Arc<dyn Communicator> {
    match rustfluid::mpi::MpiComm::initialize() {
        Some(comm) => Arc::new(comm),
        None => {
            log::error!("mpi is already initialized");
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "mpi"))]
fn communicator() -> Arc<dyn Communicator> {
    Arc::new(rustfluid::mpi::SerialComm)
}

fn run(path: &str) -> rustfluid::Result<()> {
    let parameters = Parameters::from_file(path)?;
    let mut navier = Navier2D::new(&parameters, communicator())?;
    integrate(&mut navier, parameters.end_time)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "parameters.toml".to_string());
    if let Err(e) = run(&path) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
