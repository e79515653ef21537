//! # Affine constraints on degrees of freedom
//!
//! A constrained DOF `i` satisfies `x_i = sum_j w_ij x_j + g_i`. Dirichlet
//! data has no entries and inhomogeneity `g_i`, a hanging node has the
//! weights of its parent edge. Two sets are kept side by side: the
//! nonzero set carries the boundary values, the zero set has the same
//! lines with `g_i = 0` and is used for increments.
use crate::error::{Error, Result};
use crate::linalg::{BlockSparseMatrix, BlockVector, DynamicSparsityPattern};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// One constrained DOF
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintLine {
    /// Constrained DOF
    pub index: usize,
    /// (master DOF, weight)
    pub entries: Vec<(usize, f64)>,
    /// Constant part
    pub inhomogeneity: f64,
}

/// Set of affine constraints
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    lines: BTreeMap<usize, ConstraintLine>,
    closed: bool,
}

impl ConstraintSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all lines
    pub fn clear(&mut self) {
        self.lines.clear();
        self.closed = false;
    }

    /// Add a line for `index`. Returns false (and keeps the old line)
    /// if `index` is already constrained.
    pub fn add_line(&mut self, index: usize) -> bool {
        if self.lines.contains_key(&index) {
            return false;
        }
        self.lines.insert(
            index,
            ConstraintLine {
                index,
                entries: Vec::new(),
                inhomogeneity: 0.,
            },
        );
        self.closed = false;
        true
    }

    /// Add a master to an existing line
    pub fn add_entry(&mut self, index: usize, column: usize, weight: f64) {
        if let Some(line) = self.lines.get_mut(&index) {
            line.entries.push((column, weight));
            self.closed = false;
        }
    }

    /// Set the constant part of an existing line
    pub fn set_inhomogeneity(&mut self, index: usize, value: f64) {
        if let Some(line) = self.lines.get_mut(&index) {
            line.inhomogeneity = value;
        }
    }

    /// Is `index` constrained
    pub fn is_constrained(&self, index: usize) -> bool {
        self.lines.contains_key(&index)
    }

    /// Line of a constrained DOF
    pub fn line(&self, index: usize) -> Option<&ConstraintLine> {
        self.lines.get(&index)
    }

    /// All lines, sorted by DOF
    pub fn lines(&self) -> impl Iterator<Item = &ConstraintLine> {
        self.lines.values()
    }

    /// Number of constrained DOFs
    pub fn n_constraints(&self) -> usize {
        self.lines.len()
    }

    /// Has [`ConstraintSet::close`] been called since the last change
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Copy with every inhomogeneity set to zero
    pub fn homogenized(&self) -> ConstraintSet {
        let mut zero = self.clone();
        for line in zero.lines.values_mut() {
            line.inhomogeneity = 0.;
        }
        zero
    }

    /// Resolve chains: afterwards no master is itself constrained.
    ///
    /// # Errors
    /// The constraints are cyclic.
    pub fn close(&mut self) -> Result<()> {
        let keys: Vec<usize> = self.lines.keys().copied().collect();
        for _ in 0..=keys.len() {
            let mut changed = false;
            for &i in &keys {
                let line = &self.lines[&i];
                if !line.entries.iter().any(|(j, _)| self.lines.contains_key(j)) {
                    continue;
                }
                let mut entries: BTreeMap<usize, f64> = BTreeMap::new();
                let mut inhomogeneity = line.inhomogeneity;
                for &(j, w) in &line.entries {
                    if let Some(master) = self.lines.get(&j) {
                        inhomogeneity += w * master.inhomogeneity;
                        for &(k, wk) in &master.entries {
                            *entries.entry(k).or_insert(0.) += w * wk;
                        }
                    } else {
                        *entries.entry(j).or_insert(0.) += w;
                    }
                }
                let resolved = ConstraintLine {
                    index: i,
                    entries: entries.into_iter().filter(|(_, w)| *w != 0.).collect(),
                    inhomogeneity,
                };
                self.lines.insert(i, resolved);
                changed = true;
            }
            if !changed {
                self.closed = true;
                return Ok(());
            }
        }
        Err(Error::Invariant("constraints are cyclic".into()))
    }

    /// Overwrite every owned constrained entry of `v` with the value
    /// implied by its masters. Collective.
    pub fn distribute(&self, v: &mut BlockVector) {
        let full = v.gather();
        for line in self.lines.values() {
            let value = line.inhomogeneity
                + line
                    .entries
                    .iter()
                    .map(|&(j, w)| w * full[j])
                    .sum::<f64>();
            v.set(line.index, value);
        }
    }

    /// Zero every owned constrained entry
    pub fn set_zero(&self, v: &mut BlockVector) {
        for &i in self.lines.keys() {
            v.set(i, 0.);
        }
    }

    fn expand(&self, dof: usize) -> Vec<(usize, f64)> {
        match self.lines.get(&dof) {
            Some(line) => line.entries.clone(),
            None => vec![(dof, 1.)],
        }
    }

    fn inhomogeneity(&self, dof: usize) -> f64 {
        self.lines.get(&dof).map_or(0., |l| l.inhomogeneity)
    }

    /// Add a cell contribution, eliminating constrained DOFs.
    ///
    /// Rows and columns of constrained DOFs are distributed to their
    /// masters. A constrained DOF keeps a diagonal entry equal to the mean
    /// absolute local diagonal, and the right hand side of that row gets
    /// the matching multiple of its inhomogeneity. Inhomogeneities are
    /// lifted into the right hand side of the free rows. Without a local
    /// matrix only the right hand side is distributed.
    pub fn distribute_local_to_global(
        &self,
        local_matrix: Option<&Array2<f64>>,
        local_rhs: &Array1<f64>,
        dofs: &[usize],
        matrix: Option<&mut BlockSparseMatrix>,
        rhs: &mut BlockVector,
    ) -> Result<()> {
        let expanded: Vec<Vec<(usize, f64)>> = dofs.iter().map(|&d| self.expand(d)).collect();
        for (i, ei) in expanded.iter().enumerate() {
            for &(gi, wi) in ei {
                rhs.add(gi, wi * local_rhs[i]);
            }
        }
        let (local, matrix) = match (local_matrix, matrix) {
            (Some(local), Some(matrix)) => (local, matrix),
            (Some(local), None) => {
                self.lift_inhomogeneities(local, dofs, &expanded, rhs);
                return Ok(());
            }
            _ => return Ok(()),
        };
        for (i, ei) in expanded.iter().enumerate() {
            for (j, ej) in expanded.iter().enumerate() {
                let kij = local[[i, j]];
                if kij == 0. {
                    continue;
                }
                for &(gi, wi) in ei {
                    for &(gj, wj) in ej {
                        matrix.add(gi, gj, wi * wj * kij)?;
                    }
                }
            }
        }
        self.lift_inhomogeneities(local, dofs, &expanded, rhs);
        self.add_constrained_diagonal(local, dofs, Some(rhs), matrix)
    }

    /// Add a cell matrix without right hand side
    pub fn distribute_local_to_global_matrix(
        &self,
        local: &Array2<f64>,
        dofs: &[usize],
        matrix: &mut BlockSparseMatrix,
    ) -> Result<()> {
        let expanded: Vec<Vec<(usize, f64)>> = dofs.iter().map(|&d| self.expand(d)).collect();
        for (i, ei) in expanded.iter().enumerate() {
            for (j, ej) in expanded.iter().enumerate() {
                let kij = local[[i, j]];
                if kij == 0. {
                    continue;
                }
                for &(gi, wi) in ei {
                    for &(gj, wj) in ej {
                        matrix.add(gi, gj, wi * wj * kij)?;
                    }
                }
            }
        }
        self.add_constrained_diagonal(local, dofs, None, matrix)
    }

    fn lift_inhomogeneities(
        &self,
        local: &Array2<f64>,
        dofs: &[usize],
        expanded: &[Vec<(usize, f64)>],
        rhs: &mut BlockVector,
    ) {
        for (j, &dj) in dofs.iter().enumerate() {
            let g = self.inhomogeneity(dj);
            if g == 0. {
                continue;
            }
            for (i, ei) in expanded.iter().enumerate() {
                let kij = local[[i, j]];
                for &(gi, wi) in ei {
                    rhs.add(gi, -wi * kij * g);
                }
            }
        }
    }

    fn add_constrained_diagonal(
        &self,
        local: &Array2<f64>,
        dofs: &[usize],
        mut rhs: Option<&mut BlockVector>,
        matrix: &mut BlockSparseMatrix,
    ) -> Result<()> {
        if !dofs.iter().any(|d| self.is_constrained(*d)) {
            return Ok(());
        }
        let n = dofs.len().max(1);
        let mean = local.diag().iter().map(|d| d.abs()).sum::<f64>() / n as f64;
        let mean = if mean > 0. { mean } else { 1. };
        for &d in dofs.iter().filter(|d| self.is_constrained(**d)) {
            matrix.add(d, d, mean)?;
            if let Some(rhs) = rhs.as_deref_mut() {
                rhs.add(d, mean * self.inhomogeneity(d));
            }
        }
        Ok(())
    }

    /// Couplings created by a cell with these DOFs, after elimination
    pub fn add_entries_to_pattern(&self, dofs: &[usize], dsp: &mut DynamicSparsityPattern) {
        let mut free: Vec<usize> = Vec::with_capacity(dofs.len());
        for &d in dofs {
            dsp.add(d, d);
            match self.lines.get(&d) {
                Some(line) => free.extend(line.entries.iter().map(|(j, _)| *j)),
                None => free.push(d),
            }
        }
        free.sort_unstable();
        free.dedup();
        for &i in &free {
            for &j in &free {
                dsp.add(i, j);
            }
        }
    }
}

/// Which of the two constraint sets a call site applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Homogeneous, for increments and Newton updates
    Zero,
    /// Carries the boundary values
    Nonzero,
}

impl ConstraintKind {
    /// `Nonzero` if `apply_nonzero`, else `Zero`
    pub fn select(apply_nonzero: bool) -> Self {
        if apply_nonzero {
            Self::Nonzero
        } else {
            Self::Zero
        }
    }
}

/// The zero and nonzero constraint sets of one DOF layout
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// Homogeneous set
    pub zero: ConstraintSet,
    /// Set with boundary values
    pub nonzero: ConstraintSet,
}

impl Constraints {
    /// Set selected by `kind`
    pub fn get(&self, kind: ConstraintKind) -> &ConstraintSet {
        match kind {
            ConstraintKind::Zero => &self.zero,
            ConstraintKind::Nonzero => &self.nonzero,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::BlockSparsityPattern;
    use crate::mpi::Partition;
    use ndarray::{arr1, arr2};
    use std::sync::Arc;

    fn approx_eq(result: f64, expected: f64) {
        let dif = 1e-12;
        if (result - expected).abs() > dif {
            panic!("Large difference of values, got {} expected {}.", result, expected)
        }
    }

    #[test]
    fn test_close_resolves_chains() {
        let mut c = ConstraintSet::new();
        // x1 = 0.5 x0 + 0.5 x2, x2 = 0.5 x3 + 0.5 x4 + 1
        c.add_line(1);
        c.add_entry(1, 0, 0.5);
        c.add_entry(1, 2, 0.5);
        c.add_line(2);
        c.add_entry(2, 3, 0.5);
        c.add_entry(2, 4, 0.5);
        c.set_inhomogeneity(2, 1.);
        c.close().unwrap();
        let line = c.line(1).unwrap();
        assert_eq!(line.entries, vec![(0, 0.5), (3, 0.25), (4, 0.25)]);
        approx_eq(line.inhomogeneity, 0.5);
        assert!(!c.add_line(1));
    }

    #[test]
    fn test_cycle_is_an_error() {
        let mut c = ConstraintSet::new();
        c.add_line(0);
        c.add_entry(0, 1, 1.);
        c.add_line(1);
        c.add_entry(1, 0, 1.);
        assert!(c.close().is_err());
    }

    #[test]
    fn test_distribute_and_homogenize() {
        let p = [Arc::new(Partition::serial(3)), Arc::new(Partition::serial(1))];
        let mut c = ConstraintSet::new();
        c.add_line(0);
        c.set_inhomogeneity(0, 2.);
        c.add_line(1);
        c.add_entry(1, 2, 0.5);
        c.add_entry(1, 3, 0.5);
        c.close().unwrap();
        let mut v = BlockVector::zeros(&p);
        v.set(2, 4.);
        v.set(3, 6.);
        c.distribute(&mut v);
        assert_eq!(v.gather(), vec![2., 5., 4., 6.]);
        c.homogenized().distribute(&mut v);
        assert_eq!(v.gather(), vec![0., 5., 4., 6.]);
    }

    #[test]
    fn test_local_to_global_condenses_dirichlet_row() {
        // 1D two-element Laplace on 3 velocity dofs, x0 = 1 fixed
        let p = [Arc::new(Partition::serial(3)), Arc::new(Partition::serial(1))];
        let mut c = ConstraintSet::new();
        c.add_line(0);
        c.set_inhomogeneity(0, 1.);
        c.close().unwrap();
        let mut dsp = DynamicSparsityPattern::new(4, 4);
        c.add_entries_to_pattern(&[0, 1], &mut dsp);
        c.add_entries_to_pattern(&[1, 2], &mut dsp);
        dsp.add(3, 3);
        let pattern = BlockSparsityPattern::new(&dsp, [3, 1], &p);
        let mut m = BlockSparseMatrix::new(&pattern, &p);
        let mut rhs = BlockVector::zeros(&p);
        let k = arr2(&[[1., -1.], [-1., 1.]]);
        let f = arr1(&[0., 0.]);
        c.distribute_local_to_global(Some(&k), &f, &[0, 1], Some(&mut m), &mut rhs)
            .unwrap();
        c.distribute_local_to_global(Some(&k), &f, &[1, 2], Some(&mut m), &mut rhs)
            .unwrap();
        // constrained row: only the diagonal, rhs = diag * 1
        approx_eq(m.el(0, 0), 1.);
        approx_eq(m.el(0, 1), 0.);
        approx_eq(m.el(1, 0), 0.);
        approx_eq(rhs.get(0).unwrap(), 1.);
        // lifted boundary value
        approx_eq(rhs.get(1).unwrap(), 1.);
        approx_eq(m.el(1, 1), 2.);
    }
}
