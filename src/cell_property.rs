//! # Per quadrature point data of the active cells
//!
//! The coupling partner writes accelerations and stresses into a
//! [`CellDataStorage`] between steps, the assembler reads them. Storage is
//! one dense arena indexed by the active cell index of the current mesh,
//! so it is reset whenever the topology changes.
use crate::error::{Error, Result};

/// Region a quadrature point belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Pure fluid
    #[default]
    Fluid,
    /// Overlapped by the structure, forcing from the coupling partner
    Coupled,
}

/// Coupling data of one quadrature point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CellProperty {
    /// Fluid or coupled
    pub indicator: Phase,
    /// Acceleration supplied by the structure solver
    pub fsi_acceleration: [f64; 2],
    /// Stress supplied by the structure solver
    pub fsi_stress: [[f64; 2]; 2],
}

impl CellProperty {
    /// Is this point inside the coupled region
    pub fn is_coupled(&self) -> bool {
        self.indicator == Phase::Coupled
    }
}

/// `n_q_points` records for each active cell
#[derive(Debug, Clone, Default)]
pub struct CellDataStorage<T> {
    n_q_points: usize,
    data: Vec<T>,
}

impl<T: Default + Clone> CellDataStorage<T> {
    /// Empty storage
    pub fn new() -> Self {
        Self {
            n_q_points: 0,
            data: Vec::new(),
        }
    }

    /// Drop all records and allocate default ones for a new mesh
    pub fn initialize(&mut self, n_cells: usize, n_q_points: usize) {
        self.n_q_points = n_q_points;
        self.data.clear();
        self.data.resize(n_cells * n_q_points, T::default());
    }

    /// Number of cells
    pub fn n_cells(&self) -> usize {
        if self.n_q_points == 0 {
            0
        } else {
            self.data.len() / self.n_q_points
        }
    }

    /// Records per cell
    pub fn n_q_points(&self) -> usize {
        self.n_q_points
    }

    /// Verify the storage matches the mesh
    ///
    /// # Errors
    /// Cell or quadrature point count differs.
    pub fn check(&self, n_cells: usize, n_q_points: usize) -> Result<()> {
        if self.n_q_points != n_q_points || self.n_cells() != n_cells {
            return Err(Error::Invariant(format!(
                "Wrong number of cell property! storage has {} cells x {} points, mesh has {} x {}",
                self.n_cells(),
                self.n_q_points,
                n_cells,
                n_q_points
            )));
        }
        Ok(())
    }

    /// Records of one cell
    ///
    /// # Errors
    /// Cell index out of range.
    pub fn get(&self, cell: usize) -> Result<&[T]> {
        let q = self.n_q_points;
        self.data
            .get(cell * q..(cell + 1) * q)
            .ok_or_else(|| Error::Invariant(format!("no cell property for cell {}", cell)))
    }

    /// Records of one cell, mutable
    ///
    /// # Errors
    /// Cell index out of range.
    pub fn get_mut(&mut self, cell: usize) -> Result<&mut [T]> {
        let q = self.n_q_points;
        self.data
            .get_mut(cell * q..(cell + 1) * q)
            .ok_or_else(|| Error::Invariant(format!("no cell property for cell {}", cell)))
    }

    /// Records grouped by cell
    pub fn cells(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks(self.n_q_points.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_on_initialize() {
        let mut storage = CellDataStorage::<CellProperty>::new();
        storage.initialize(3, 4);
        storage.get_mut(1).unwrap()[2].indicator = Phase::Coupled;
        assert!(storage.get(1).unwrap()[2].is_coupled());
        assert_eq!(storage.cells().filter(|c| c.iter().any(CellProperty::is_coupled)).count(), 1);

        storage.initialize(5, 4);
        assert!(storage.cells().all(|c| c.iter().all(|p| *p == CellProperty::default())));
        assert!(storage.check(5, 4).is_ok());
    }

    #[test]
    fn test_count_mismatch_is_invariant_violation() {
        let mut storage = CellDataStorage::<CellProperty>::new();
        storage.initialize(2, 16);
        assert!(matches!(storage.check(3, 16), Err(Error::Invariant(_))));
        assert!(matches!(storage.get(2), Err(Error::Invariant(_))));
    }
}
