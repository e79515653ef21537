//! 2x2 block matrices (velocity, pressure)
use super::{BlockVector, DynamicSparsityPattern, SparseMatrix, SparsityPattern};
use crate::error::Result;
use crate::mpi::Partition;
use std::sync::Arc;

/// Pattern of a 2x2 block matrix.
///
/// Keeps the owned rows of every block for the matrices and the
/// full rows for replicated products (Schur surrogate, direct solver).
#[derive(Debug, Clone)]
pub struct BlockSparsityPattern {
    owned: [[Arc<SparsityPattern>; 2]; 2],
    full: [[Arc<SparsityPattern>; 2]; 2],
    dofs_per_block: [usize; 2],
}

impl BlockSparsityPattern {
    /// Split a pattern over all DOFs into blocks
    pub fn new(
        dsp: &DynamicSparsityPattern,
        dofs_per_block: [usize; 2],
        partitions: &[Arc<Partition>; 2],
    ) -> Self {
        let n = dofs_per_block;
        let mut blocks = [
            [
                DynamicSparsityPattern::new(n[0], n[0]),
                DynamicSparsityPattern::new(n[0], n[1]),
            ],
            [
                DynamicSparsityPattern::new(n[1], n[0]),
                DynamicSparsityPattern::new(n[1], n[1]),
            ],
        ];
        let split = |i: usize| if i < n[0] { (0, i) } else { (1, i - n[0]) };
        for (row, col) in dsp.entries() {
            let (rb, rl) = split(row);
            let (cb, cl) = split(col);
            blocks[rb][cb].add(rl, cl);
        }
        let freeze = |r: usize, c: usize, rows: std::ops::Range<usize>| {
            Arc::new(SparsityPattern::from_dynamic(&blocks[r][c], rows))
        };
        let owned_rows = |r: usize| partitions[r].owned_range();
        let owned = [
            [freeze(0, 0, owned_rows(0)), freeze(0, 1, owned_rows(0))],
            [freeze(1, 0, owned_rows(1)), freeze(1, 1, owned_rows(1))],
        ];
        let full = [
            [freeze(0, 0, 0..n[0]), freeze(0, 1, 0..n[0])],
            [freeze(1, 0, 0..n[1]), freeze(1, 1, 0..n[1])],
        ];
        Self {
            owned,
            full,
            dofs_per_block,
        }
    }

    /// Owned rows of block (r, c)
    pub fn block(&self, r: usize, c: usize) -> &Arc<SparsityPattern> {
        &self.owned[r][c]
    }

    /// All rows of block (r, c)
    pub fn full_block(&self, r: usize, c: usize) -> &Arc<SparsityPattern> {
        &self.full[r][c]
    }

    /// Number of DOFs per block
    pub fn dofs_per_block(&self) -> [usize; 2] {
        self.dofs_per_block
    }
}

/// Block matrix {A, B^T; B, C} with rows split like the block vectors
#[derive(Debug, Clone)]
pub struct BlockSparseMatrix {
    blocks: [[SparseMatrix; 2]; 2],
    partitions: [Arc<Partition>; 2],
}

impl BlockSparseMatrix {
    /// Zero matrix on a block pattern
    pub fn new(pattern: &BlockSparsityPattern, partitions: &[Arc<Partition>; 2]) -> Self {
        let comm = partitions[0].comm();
        let block = |r: usize, c: usize| SparseMatrix::new(pattern.block(r, c), comm);
        Self {
            blocks: [[block(0, 0), block(0, 1)], [block(1, 0), block(1, 1)]],
            partitions: [Arc::clone(&partitions[0]), Arc::clone(&partitions[1])],
        }
    }

    /// Block (r, c)
    pub fn block(&self, r: usize, c: usize) -> &SparseMatrix {
        &self.blocks[r][c]
    }

    /// Block (r, c), mutable
    pub fn block_mut(&mut self, r: usize, c: usize) -> &mut SparseMatrix {
        &mut self.blocks[r][c]
    }

    /// Number of DOFs per block
    pub fn dofs_per_block(&self) -> [usize; 2] {
        [self.partitions[0].size(), self.partitions[1].size()]
    }

    /// Global number of rows
    pub fn m(&self) -> usize {
        self.partitions[0].size() + self.partitions[1].size()
    }

    /// Zero all values
    pub fn set_zero(&mut self) {
        for row in &mut self.blocks {
            for b in row {
                b.set_zero();
            }
        }
    }

    fn split(&self, index: usize) -> (usize, usize) {
        let n0 = self.partitions[0].size();
        if index < n0 {
            (0, index)
        } else {
            (1, index - n0)
        }
    }

    /// Add to entry (row, col) given in global DOF numbering.
    ///
    /// Rows owned by another rank are skipped, that rank adds them itself.
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let (rb, rl) = self.split(row);
        if !self.partitions[rb].is_owned(rl) {
            return Ok(());
        }
        let (cb, cl) = self.split(col);
        self.blocks[rb][cb].add(rl, cl, value)
    }

    /// Entry (row, col) in global numbering, zero if not stored here
    pub fn el(&self, row: usize, col: usize) -> f64 {
        let (rb, rl) = self.split(row);
        let (cb, cl) = self.split(col);
        self.blocks[rb][cb].el(rl, cl)
    }

    /// dst = M src
    pub fn vmult(&self, dst: &mut BlockVector, src: &BlockVector) {
        for r in 0..2 {
            let out = dst.block_mut(r);
            self.blocks[r][0].vmult(out, src.block(0));
            self.blocks[r][1].vmult_add(out, src.block(1));
        }
    }

    /// dst = rhs - M x
    pub fn residual(&self, dst: &mut BlockVector, x: &BlockVector, rhs: &BlockVector) -> f64 {
        self.vmult(dst, x);
        dst.sadd(-1., 1., rhs);
        dst.l2_norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_split_and_vmult() {
        // 2 velocity, 1 pressure dof
        let mut dsp = DynamicSparsityPattern::new(3, 3);
        for (i, j) in [(0, 0), (1, 1), (0, 2), (2, 0), (1, 2), (2, 1), (2, 2)] {
            dsp.add(i, j);
        }
        let p = [Arc::new(Partition::serial(2)), Arc::new(Partition::serial(1))];
        let pattern = BlockSparsityPattern::new(&dsp, [2, 1], &p);
        assert_eq!(pattern.block(0, 1).row(0), &[0]);
        assert_eq!(pattern.block(1, 0).row(0), &[0, 1]);

        let mut m = BlockSparseMatrix::new(&pattern, &p);
        m.add(0, 0, 1.).unwrap();
        m.add(1, 1, 2.).unwrap();
        m.add(0, 2, -1.).unwrap();
        m.add(2, 0, -1.).unwrap();
        m.add(2, 1, -3.).unwrap();
        assert!(m.add(1, 0, 1.).is_err());

        let mut x = BlockVector::zeros(&p);
        x.set(0, 1.);
        x.set(1, 1.);
        x.set(2, 2.);
        let mut y = BlockVector::zeros(&p);
        m.vmult(&mut y, &x);
        assert_eq!(y.gather(), vec![-1., 2., -4.]);
        assert_eq!(m.el(2, 1), -3.);
    }
}
