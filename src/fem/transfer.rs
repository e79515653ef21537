//! Solution transfer across coarsening and refinement
use super::dofs::DofHandler;
use super::element::{
    pressure_shape, velocity_shape, DOFS_PER_CELL, N_PRESSURE_NODES, N_VELOCITY_NODES,
    VELOCITY_DOFS,
};
use super::mesh::{CellHandle, QuadMesh};
use crate::error::{Error, Result};
use crate::linalg::{BlockVector, GhostedBlockVector};
use std::collections::HashMap;

/// Local values of every active cell of the old mesh
#[derive(Debug, Clone, Default)]
pub struct SolutionSnapshot {
    cells: HashMap<CellHandle, [f64; DOFS_PER_CELL]>,
}

impl SolutionSnapshot {
    /// Record `field` cell by cell
    pub fn record(mesh: &QuadMesh, dofs: &DofHandler, field: &GhostedBlockVector) -> Self {
        let cells = mesh
            .active_cells()
            .iter()
            .enumerate()
            .map(|(k, &cell)| (cell, dofs.local_dof_indices(k).map(|d| field.get(d))))
            .collect();
        Self { cells }
    }

    /// Cell of the old mesh holding lattice point `p`, searching from a
    /// cell of the new mesh through its ancestors, then its descendants.
    fn source(&self, mesh: &QuadMesh, cell: CellHandle, p: [usize; 2]) -> Option<CellHandle> {
        let mut up = Some(cell);
        while let Some(c) = up {
            if self.cells.contains_key(&c) {
                return Some(c);
            }
            up = mesh.parent(c);
        }
        let mut down = cell;
        loop {
            if self.cells.contains_key(&down) {
                return Some(down);
            }
            down = mesh.children(down)?[mesh.child_index(down, p)];
        }
    }

    fn evaluate(&self, mesh: &QuadMesh, source: CellHandle, p: [usize; 2]) -> ([f64; 2], f64) {
        let values = &self.cells[&source];
        let o = mesh.lattice_origin(source);
        let s = mesh.lattice_size(source) as f64;
        let xi = [
            (p[0] as f64 - o[0] as f64) / s,
            (p[1] as f64 - o[1] as f64) / s,
        ];
        let velocity = velocity_shape(xi);
        let mut u = [0.; 2];
        for n in 0..N_VELOCITY_NODES {
            for c in 0..2 {
                u[c] += velocity.value[n] * values[2 * n + c];
            }
        }
        let pressure = pressure_shape(xi);
        let p: f64 = (0..N_PRESSURE_NODES)
            .map(|m| pressure[m] * values[VELOCITY_DOFS + m])
            .sum();
        (u, p)
    }

    /// Owned entries of `field` on the new DOFs
    ///
    /// # Errors
    /// A node has no cell of the old mesh above or below it.
    pub fn interpolate(&self, mesh: &QuadMesh, dofs: &DofHandler, field: &mut BlockVector) -> Result<()> {
        let n_u = dofs.dofs_per_block()[0];
        for (k, &cell) in mesh.active_cells().iter().enumerate() {
            let missing = || Error::Invariant(format!("no recorded values for cell {}", k));
            for &node in dofs.velocity_nodes(k) {
                let p = dofs.velocity_position(node);
                let source = self.source(mesh, cell, p).ok_or_else(missing)?;
                let (u, _) = self.evaluate(mesh, source, p);
                field.set(2 * node, u[0]);
                field.set(2 * node + 1, u[1]);
            }
            for &node in dofs.pressure_nodes(k) {
                let p = dofs.pressure_position(node);
                let source = self.source(mesh, cell, p).ok_or_else(missing)?;
                let (_, value) = self.evaluate(mesh, source, p);
                field.set(n_u + node, value);
            }
        }
        Ok(())
    }
}
