//! Communicators
use std::fmt::Debug;
use std::sync::{Arc, Barrier, Mutex, PoisonError};

/// Collective operations needed by distributed vectors and solvers.
///
/// All methods are blocking and must be called by every rank in the
/// same order.
pub trait Communicator: Debug {
    /// Rank of this process
    fn rank(&self) -> usize;

    /// Number of processes
    fn size(&self) -> usize;

    /// Concatenate the local slices of all ranks, ordered by rank
    fn all_gather(&self, local: &[f64]) -> Vec<f64>;

    /// Same as [`Communicator::all_gather`] for indices
    fn all_gather_indices(&self, local: &[usize]) -> Vec<usize>;

    /// Block until every rank arrives
    fn barrier(&self);

    /// Global sum.
    ///
    /// Partial sums are added in rank order, so every rank sees
    /// the same bits.
    fn sum(&self, local: f64) -> f64 {
        self.all_gather(&[local]).iter().sum()
    }

    /// Global maximum
    fn max(&self, local: f64) -> f64 {
        self.all_gather(&[local])
            .iter()
            .fold(f64::NEG_INFINITY, |a, &b| a.max(b))
    }
}

/// Single process, all collectives are trivial
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather(&self, local: &[f64]) -> Vec<f64> {
        local.to_vec()
    }

    fn all_gather_indices(&self, local: &[usize]) -> Vec<usize> {
        local.to_vec()
    }

    fn barrier(&self) {}

    fn sum(&self, local: f64) -> f64 {
        local
    }
}

#[derive(Debug)]
struct ThreadShared {
    size: usize,
    barrier: Barrier,
    values: Mutex<Vec<Vec<f64>>>,
    indices: Mutex<Vec<Vec<usize>>>,
}

/// Ranks running as threads of one process.
///
/// Create all ranks with [`ThreadComm::create`] and move one into
/// each worker thread.
#[derive(Debug, Clone)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<ThreadShared>,
}

impl ThreadComm {
    /// Communicators for `size` ranks
    pub fn create(size: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(ThreadShared {
            size,
            barrier: Barrier::new(size),
            values: Mutex::new(vec![Vec::new(); size]),
            indices: Mutex::new(vec![Vec::new(); size]),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    fn exchange<T: Clone>(&self, slots: &Mutex<Vec<Vec<T>>>, local: &[T]) -> Vec<T> {
        {
            let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots[self.rank] = local.to_vec();
        }
        self.shared.barrier.wait();
        let gathered = {
            let slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.iter().flatten().cloned().collect()
        };
        // slots may only be overwritten after everybody has read them
        self.shared.barrier.wait();
        gathered
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn all_gather(&self, local: &[f64]) -> Vec<f64> {
        self.exchange(&self.shared.values, local)
    }

    fn all_gather_indices(&self, local: &[usize]) -> Vec<usize> {
        self.exchange(&self.shared.indices, local)
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}

#[cfg(feature = "mpi")]
pub use self::mpi_comm::MpiComm;

#[cfg(feature = "mpi")]
mod mpi_comm {
    use super::Communicator;
    use mpi::datatype::PartitionMut;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use mpi::Count;

    /// Communicator backed by the MPI world
    pub struct MpiComm {
        world: SimpleCommunicator,
        _universe: Universe,
    }

    impl MpiComm {
        /// Initialize MPI. Returns `None` if MPI was already initialized.
        pub fn initialize() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            Some(Self {
                world,
                _universe: universe,
            })
        }

        fn gather_varcount<T>(&self, local: &[T], zero: T) -> Vec<T>
        where
            T: Equivalence + Clone,
        {
            let count = local.len() as Count;
            let mut counts = vec![0 as Count; self.world.size() as usize];
            self.world.all_gather_into(&count, &mut counts[..]);
            let displs: Vec<Count> = counts
                .iter()
                .scan(0, |acc, &c| {
                    let d = *acc;
                    *acc += c;
                    Some(d)
                })
                .collect();
            let total = counts.iter().sum::<Count>() as usize;
            let mut buf = vec![zero; total];
            {
                let mut partition = PartitionMut::new(&mut buf[..], counts, &displs[..]);
                self.world.all_gather_varcount_into(local, &mut partition);
            }
            buf
        }
    }

    impl std::fmt::Debug for MpiComm {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MpiComm")
                .field("rank", &self.world.rank())
                .field("size", &self.world.size())
                .finish()
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.world.rank() as usize
        }

        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn all_gather(&self, local: &[f64]) -> Vec<f64> {
            self.gather_varcount(local, 0.)
        }

        fn all_gather_indices(&self, local: &[usize]) -> Vec<usize> {
            let local: Vec<u64> = local.iter().map(|&i| i as u64).collect();
            self.gather_varcount(&local, 0)
                .into_iter()
                .map(|i| i as usize)
                .collect()
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}
