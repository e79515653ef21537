//! Owned vectors
use crate::mpi::Partition;
use ndarray::{Array1, Zip};
use std::borrow::Cow;
use std::sync::Arc;

/// Entries of one distributed vector owned by this rank
#[derive(Debug, Clone)]
pub struct Vector {
    partition: Arc<Partition>,
    values: Array1<f64>,
}

impl Vector {
    /// Zero vector on `partition`
    pub fn zeros(partition: &Arc<Partition>) -> Self {
        Self {
            partition: Arc::clone(partition),
            values: Array1::zeros(partition.n_owned()),
        }
    }

    /// Vector from the owned entries
    ///
    /// # Panics
    /// Length of `values` differs from the number of owned entries.
    pub fn from_local(partition: &Arc<Partition>, values: Array1<f64>) -> Self {
        assert_eq!(values.len(), partition.n_owned(), "local length mismatch");
        Self {
            partition: Arc::clone(partition),
            values,
        }
    }

    /// Partition of the entries
    pub fn partition(&self) -> &Arc<Partition> {
        &self.partition
    }

    /// Global size
    pub fn size(&self) -> usize {
        self.partition.size()
    }

    /// Owned entries
    pub fn local(&self) -> &Array1<f64> {
        &self.values
    }

    /// Owned entries, mutable
    pub fn local_mut(&mut self) -> &mut Array1<f64> {
        &mut self.values
    }

    /// Value at a global index, `None` if not owned
    pub fn get(&self, index: usize) -> Option<f64> {
        if self.partition.is_owned(index) {
            Some(self.values[index - self.partition.first_owned()])
        } else {
            None
        }
    }

    /// Set value at a global index, ignored if not owned
    pub fn set(&mut self, index: usize, value: f64) {
        if self.partition.is_owned(index) {
            let first = self.partition.first_owned();
            self.values[index - first] = value;
        }
    }

    /// Add to value at a global index, ignored if not owned
    pub fn add(&mut self, index: usize, value: f64) {
        if self.partition.is_owned(index) {
            let first = self.partition.first_owned();
            self.values[index - first] += value;
        }
    }

    /// Set all entries to `value`
    pub fn fill(&mut self, value: f64) {
        self.values.fill(value);
    }

    /// Global inner product
    pub fn dot(&self, other: &Vector) -> f64 {
        self.partition.comm().sum(self.values.dot(&other.values))
    }

    /// Local part of the squared norm (no communication)
    pub(crate) fn local_norm_sqr(&self) -> f64 {
        self.values.dot(&self.values)
    }

    /// Global euclidean norm
    pub fn l2_norm(&self) -> f64 {
        self.partition.comm().sum(self.local_norm_sqr()).sqrt()
    }

    /// self += a * x
    pub fn axpy(&mut self, a: f64, x: &Vector) {
        self.values.scaled_add(a, &x.values);
    }

    /// self = s * self + a * x
    pub fn sadd(&mut self, s: f64, a: f64, x: &Vector) {
        Zip::from(&mut self.values)
            .and(&x.values)
            .for_each(|v, &x| *v = s * *v + a * x);
    }

    /// self *= a
    pub fn scale(&mut self, a: f64) {
        self.values *= a;
    }

    /// Copy values of `other`
    pub fn assign(&mut self, other: &Vector) {
        self.values.assign(&other.values);
    }

    /// All entries of the vector on every rank.
    ///
    /// Borrows when this rank owns everything.
    pub fn gather(&self) -> Cow<'_, [f64]> {
        if self.partition.nprocs() == 1 {
            if let Some(slice) = self.values.as_slice() {
                return Cow::Borrowed(slice);
            }
        }
        Cow::Owned(self.partition.comm().all_gather(&self.values.to_vec()))
    }
}

/// Velocity block followed by pressure block
#[derive(Debug, Clone)]
pub struct BlockVector {
    blocks: [Vector; 2],
}

impl BlockVector {
    /// Zero vector with one partition per block
    pub fn zeros(partitions: &[Arc<Partition>; 2]) -> Self {
        Self {
            blocks: [Vector::zeros(&partitions[0]), Vector::zeros(&partitions[1])],
        }
    }

    /// Combine velocity and pressure vectors
    pub fn from_blocks(velocity: Vector, pressure: Vector) -> Self {
        Self {
            blocks: [velocity, pressure],
        }
    }

    /// Block 0 (velocity) or 1 (pressure)
    pub fn block(&self, i: usize) -> &Vector {
        &self.blocks[i]
    }

    /// Block 0 (velocity) or 1 (pressure), mutable
    pub fn block_mut(&mut self, i: usize) -> &mut Vector {
        &mut self.blocks[i]
    }

    /// Partitions of both blocks
    pub fn partitions(&self) -> [Arc<Partition>; 2] {
        [
            Arc::clone(self.blocks[0].partition()),
            Arc::clone(self.blocks[1].partition()),
        ]
    }

    /// Global size of each block
    pub fn dofs_per_block(&self) -> [usize; 2] {
        [self.blocks[0].size(), self.blocks[1].size()]
    }

    /// Global size
    pub fn size(&self) -> usize {
        self.blocks[0].size() + self.blocks[1].size()
    }

    fn locate(&self, index: usize) -> (usize, usize) {
        let n0 = self.blocks[0].size();
        if index < n0 {
            (0, index)
        } else {
            (1, index - n0)
        }
    }

    /// Value at a global index, `None` if not owned
    pub fn get(&self, index: usize) -> Option<f64> {
        let (b, i) = self.locate(index);
        self.blocks[b].get(i)
    }

    /// Set value at a global index, ignored if not owned
    pub fn set(&mut self, index: usize, value: f64) {
        let (b, i) = self.locate(index);
        self.blocks[b].set(i, value);
    }

    /// Add to value at a global index, ignored if not owned
    pub fn add(&mut self, index: usize, value: f64) {
        let (b, i) = self.locate(index);
        self.blocks[b].add(i, value);
    }

    /// Set all entries to `value`
    pub fn fill(&mut self, value: f64) {
        for b in &mut self.blocks {
            b.fill(value);
        }
    }

    /// Global inner product
    pub fn dot(&self, other: &BlockVector) -> f64 {
        let local: f64 = self
            .blocks
            .iter()
            .zip(&other.blocks)
            .map(|(a, b)| a.local().dot(b.local()))
            .sum();
        self.blocks[0].partition().comm().sum(local)
    }

    /// Global euclidean norm
    pub fn l2_norm(&self) -> f64 {
        let local: f64 = self.blocks.iter().map(Vector::local_norm_sqr).sum();
        self.blocks[0].partition().comm().sum(local).sqrt()
    }

    /// self += a * x
    pub fn axpy(&mut self, a: f64, x: &BlockVector) {
        for (v, x) in self.blocks.iter_mut().zip(&x.blocks) {
            v.axpy(a, x);
        }
    }

    /// self = s * self + a * x
    pub fn sadd(&mut self, s: f64, a: f64, x: &BlockVector) {
        for (v, x) in self.blocks.iter_mut().zip(&x.blocks) {
            v.sadd(s, a, x);
        }
    }

    /// self *= a
    pub fn scale(&mut self, a: f64) {
        for b in &mut self.blocks {
            b.scale(a);
        }
    }

    /// Copy values of `other`
    pub fn assign(&mut self, other: &BlockVector) {
        for (v, x) in self.blocks.iter_mut().zip(&other.blocks) {
            v.assign(x);
        }
    }

    /// All entries, velocity block first
    pub fn gather(&self) -> Vec<f64> {
        let mut full = self.blocks[0].gather().into_owned();
        full.extend_from_slice(&self.blocks[1].gather());
        full
    }
}
