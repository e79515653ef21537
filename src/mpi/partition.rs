//! Contiguous distribution of an index range across ranks
use super::{Communicator, SerialComm};
use std::ops::Range;
use std::sync::Arc;

/// Each rank owns one contiguous slice of `0..size`, ranks in order.
#[derive(Debug, Clone)]
pub struct Partition {
    size: usize,
    offsets: Vec<usize>,
    comm: Arc<dyn Communicator>,
}

impl Partition {
    /// Split `size` indices as evenly as possible over all ranks of `comm`
    pub fn new(size: usize, comm: Arc<dyn Communicator>) -> Self {
        let nprocs = comm.size();
        let offsets = (0..=nprocs).map(|r| r * size / nprocs).collect();
        Self {
            size,
            offsets,
            comm,
        }
    }

    /// Single rank owning everything
    pub fn serial(size: usize) -> Self {
        Self::new(size, Arc::new(SerialComm))
    }

    /// Global number of indices
    pub fn size(&self) -> usize {
        self.size
    }

    /// Rank of this process
    pub fn nrank(&self) -> usize {
        self.comm.rank()
    }

    /// Number of processes
    pub fn nprocs(&self) -> usize {
        self.comm.size()
    }

    /// Communicator shared by all vectors on this partition
    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    /// Indices owned by `rank`
    pub fn range_of(&self, rank: usize) -> Range<usize> {
        self.offsets[rank]..self.offsets[rank + 1]
    }

    /// Indices owned by this rank
    pub fn owned_range(&self) -> Range<usize> {
        self.range_of(self.nrank())
    }

    /// Number of indices owned by this rank
    pub fn n_owned(&self) -> usize {
        let r = self.owned_range();
        r.end - r.start
    }

    /// First owned index
    pub fn first_owned(&self) -> usize {
        self.offsets[self.nrank()]
    }

    /// Is the global index owned here
    pub fn is_owned(&self, index: usize) -> bool {
        self.owned_range().contains(&index)
    }

    /// Rank owning a global index
    pub fn owner(&self, index: usize) -> usize {
        // offsets is sorted, the owner is the last offset <= index
        match self.offsets.binary_search(&index) {
            Ok(mut r) => {
                // skip ranks owning nothing
                while r + 1 < self.offsets.len() - 1 && self.offsets[r + 1] == index {
                    r += 1;
                }
                r
            }
            Err(r) => r - 1,
        }
    }

    /// Same size and same rank layout
    pub fn is_compatible(&self, other: &Partition) -> bool {
        self.size == other.size && self.offsets == other.offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpi::ThreadComm;

    #[test]
    fn test_serial_partition_owns_everything() {
        let p = Partition::serial(7);
        assert_eq!(p.owned_range(), 0..7);
        assert_eq!(p.owner(6), 0);
        assert!(p.is_owned(3));
    }

    #[test]
    fn test_split_is_contiguous_and_complete() {
        let comms = ThreadComm::create(3);
        let p = Partition::new(10, Arc::new(comms[1].clone()));
        assert_eq!(p.range_of(0), 0..3);
        assert_eq!(p.owned_range(), 3..6);
        assert_eq!(p.range_of(2), 6..10);
        assert_eq!(p.owner(5), 1);
        assert_eq!(p.owner(6), 2);
        assert_eq!(p.owner(0), 0);
    }
}
