//! Snapshots handed to an output writer
use super::system::FluidSystem;
use crate::linalg::GhostedBlockVector;
use crate::mpi::Partition;
use crate::time::TimeState;

/// Solution and per cell data at one output time
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Simulation time
    pub time: f64,
    /// Step index
    pub step: usize,
    /// Replicated solution
    pub solution: GhostedBlockVector,
    /// 1 if any quadrature point of the cell is coupled
    pub indicator: Vec<u8>,
    /// Rank owning the lowest velocity DOF of the cell
    pub subdomain: Vec<usize>,
}

impl Snapshot {
    /// Take a snapshot of the present solution
    pub fn new(system: &FluidSystem, time: &TimeState) -> Self {
        let indicator = system
            .cell_property()
            .cells()
            .map(|cell| u8::from(cell.iter().any(|p| p.is_coupled())))
            .collect::<Vec<_>>();
        let velocity = &system.partitions()[0];
        let subdomain = (0..indicator.len())
            .map(|k| cell_owner(&system.discretization().cell_dofs(k), velocity))
            .collect();
        Self {
            time: time.current(),
            step: time.step(),
            solution: system.get_current_solution().clone(),
            indicator,
            subdomain,
        }
    }

    /// File stem an output writer should use
    pub fn name(&self) -> String {
        format!("fluid-{:05}", self.step)
    }
}

fn cell_owner(dofs: &[usize], velocity: &Partition) -> usize {
    dofs.iter()
        .filter(|&&d| d < velocity.size())
        .min()
        .map_or(0, |&d| velocity.owner(d))
}

/// Append-only list of `(time, name)` of every snapshot of the run
#[derive(Debug, Clone, Default)]
pub struct OutputHistory {
    entries: Vec<(f64, String)>,
}

impl OutputHistory {
    /// Empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot
    pub fn push(&mut self, snapshot: &Snapshot) {
        self.entries.push((snapshot.time, snapshot.name()));
    }

    /// All recorded `(time, name)` pairs
    pub fn entries(&self) -> &[(f64, String)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::channel_system;
    use super::*;
    use crate::cell_property::Phase;
    use crate::config::VelocitySolverKind;
    use crate::fem::element::VELOCITY_DOFS;
    use crate::mpi::{SerialComm, ThreadComm};
    use std::sync::Arc;

    #[test]
    fn test_snapshot_indicator() {
        let mut system = channel_system(Arc::new(SerialComm), VelocitySolverKind::CgIlu);
        system.cell_property_mut().get_mut(3).unwrap()[5].indicator = Phase::Coupled;
        let time = TimeState::new(1., 0.1, 0.1, 1.);
        let snapshot = Snapshot::new(&system, &time);
        assert_eq!(snapshot.indicator.len(), system.layout().n_cells);
        assert_eq!(snapshot.indicator.iter().map(|&i| i as usize).sum::<usize>(), 1);
        assert_eq!(snapshot.indicator[3], 1);
        assert!(snapshot.subdomain.iter().all(|&r| r == 0));

        let mut history = OutputHistory::new();
        history.push(&snapshot);
        assert_eq!(history.entries(), &[(0., "fluid-00000".to_string())]);
    }
    #[test]
    fn test_subdomain_follows_dof_ownership() {
        let handles: Vec<_> = ThreadComm::create(2)
            .into_iter()
            .map(|comm| {
                std::thread::spawn(move || {
                    let system = channel_system(Arc::new(comm), VelocitySolverKind::Direct);
                    let time = TimeState::new(1., 0.1, 0.1, 1.);
                    let snapshot = Snapshot::new(&system, &time);
                    let velocity = &system.partitions()[0];
                    for (k, &rank) in snapshot.subdomain.iter().enumerate() {
                        let dofs = system.discretization().cell_dofs(k);
                        let first = dofs.iter().take(VELOCITY_DOFS).min().unwrap();
                        assert_eq!(rank, velocity.owner(*first));
                    }
                    snapshot.subdomain
                })
            })
            .collect();
        let subdomains: Vec<Vec<usize>> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();
        // every rank sees the same map, and both ranks own cells
        assert_eq!(subdomains[0], subdomains[1]);
        assert!(subdomains[0].contains(&0) && subdomains[0].contains(&1));
    }
}
