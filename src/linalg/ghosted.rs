//! Read-only replicated vectors
use super::{BlockVector, Vector};
use crate::mpi::Partition;
use ndarray::{Array1, ArrayView1};
use std::sync::Arc;

/// Every entry of a block vector, replicated on this rank.
///
/// There is no mutable access. The content changes only through
/// [`GhostedBlockVector::publish`] from an owned [`BlockVector`].
#[derive(Debug, Clone)]
pub struct GhostedBlockVector {
    partitions: [Arc<Partition>; 2],
    values: [Array1<f64>; 2],
}

impl GhostedBlockVector {
    /// Zero vector with one partition per block
    pub fn zeros(partitions: &[Arc<Partition>; 2]) -> Self {
        Self {
            partitions: [Arc::clone(&partitions[0]), Arc::clone(&partitions[1])],
            values: [
                Array1::zeros(partitions[0].size()),
                Array1::zeros(partitions[1].size()),
            ],
        }
    }

    /// Replicate an owned vector
    pub fn from_owned(owned: &BlockVector) -> Self {
        let mut ghosted = Self::zeros(&owned.partitions());
        ghosted.publish(owned);
        ghosted
    }

    /// Refresh all entries from the owned copy. Collective.
    pub fn publish(&mut self, owned: &BlockVector) {
        self.partitions = owned.partitions();
        for b in 0..2 {
            self.values[b] = Array1::from(owned.block(b).gather().into_owned());
        }
    }

    /// Partitions of both blocks
    pub fn partitions(&self) -> &[Arc<Partition>; 2] {
        &self.partitions
    }

    /// Global size of each block
    pub fn dofs_per_block(&self) -> [usize; 2] {
        [self.values[0].len(), self.values[1].len()]
    }

    /// All entries of block 0 (velocity) or 1 (pressure)
    pub fn block(&self, i: usize) -> ArrayView1<'_, f64> {
        self.values[i].view()
    }

    /// Value at a global index
    pub fn get(&self, index: usize) -> f64 {
        let n0 = self.values[0].len();
        if index < n0 {
            self.values[0][index]
        } else {
            self.values[1][index - n0]
        }
    }

    /// New owned vector holding the entries this rank owns
    pub fn owned_copy(&self) -> BlockVector {
        let block = |b: usize| {
            let range = self.partitions[b].owned_range();
            let local = self.values[b].slice(ndarray::s![range.start..range.end]).to_owned();
            Vector::from_local(&self.partitions[b], local)
        };
        BlockVector::from_blocks(block(0), block(1))
    }

    /// Euclidean norm, computed locally
    pub fn l2_norm(&self) -> f64 {
        self.values
            .iter()
            .map(|v| v.dot(v))
            .sum::<f64>()
            .sqrt()
    }
}
