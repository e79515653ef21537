//! DOF numbering and constraints on a [`QuadMesh`]
use super::element::{DOFS_PER_CELL, N_PRESSURE_NODES, N_VELOCITY_NODES, VELOCITY_DOFS};
use super::mesh::{CellHandle, QuadMesh};
use crate::config::BoundaryConditions;
use crate::constraints::{ConstraintSet, Constraints};
use crate::error::Result;
use std::collections::BTreeMap;

/// Node numbering of one field
#[derive(Debug, Clone, Default)]
struct NodeSet {
    /// Lattice position of each node
    positions: Vec<[usize; 2]>,
    /// (y, x) -> node, rows first
    by_row: BTreeMap<(usize, usize), usize>,
    /// (x, y) -> node, columns first
    by_column: BTreeMap<(usize, usize), usize>,
}

impl NodeSet {
    /// Number nodes lexicographically in (y, x), which keeps the
    /// bandwidth of the system proportional to the mesh width.
    fn new(points: impl Iterator<Item = [usize; 2]>) -> Self {
        let mut by_row: BTreeMap<(usize, usize), usize> =
            points.map(|p| ((p[1], p[0]), 0)).collect();
        let mut positions = Vec::with_capacity(by_row.len());
        for (k, ((y, x), node)) in by_row.iter_mut().enumerate() {
            *node = k;
            positions.push([*x, *y]);
        }
        let by_column = by_row.iter().map(|(&(y, x), &n)| ((x, y), n)).collect();
        Self {
            positions,
            by_row,
            by_column,
        }
    }

    fn node(&self, p: [usize; 2]) -> usize {
        self.by_row[&(p[1], p[0])]
    }

    /// Nodes strictly inside the segment from `a` to `b` (axis aligned)
    fn between(&self, a: [usize; 2], b: [usize; 2]) -> Vec<(usize, f64)> {
        let (map, fixed, lo, hi) = if a[1] == b[1] {
            (&self.by_row, a[1], a[0], b[0])
        } else {
            (&self.by_column, a[0], a[1], b[1])
        };
        if hi <= lo + 1 {
            return Vec::new();
        }
        map.range((fixed, lo + 1)..(fixed, hi))
            .map(|(&(_, t), &n)| (n, (t - lo) as f64 / (hi - lo) as f64))
            .collect()
    }
}

/// Global DOF indices of the active cells.
///
/// Velocity DOF `2 n + c` for node `n`, pressure DOF `n_u + m`.
#[derive(Debug, Clone, Default)]
pub struct DofHandler {
    velocity: NodeSet,
    pressure: NodeSet,
    cell_velocity_nodes: Vec<[usize; N_VELOCITY_NODES]>,
    cell_pressure_nodes: Vec<[usize; N_PRESSURE_NODES]>,
}

fn velocity_points(mesh: &QuadMesh, cell: CellHandle) -> [[usize; 2]; N_VELOCITY_NODES] {
    let o = mesh.lattice_origin(cell);
    let half = mesh.lattice_size(cell) / 2;
    let mut points = [[0; 2]; N_VELOCITY_NODES];
    for (n, p) in points.iter_mut().enumerate() {
        *p = [o[0] + (n % 3) * half, o[1] + (n / 3) * half];
    }
    points
}

fn pressure_points(mesh: &QuadMesh, cell: CellHandle) -> [[usize; 2]; N_PRESSURE_NODES] {
    let o = mesh.lattice_origin(cell);
    let s = mesh.lattice_size(cell);
    let mut points = [[0; 2]; N_PRESSURE_NODES];
    for (m, p) in points.iter_mut().enumerate() {
        *p = [o[0] + (m % 2) * s, o[1] + (m / 2) * s];
    }
    points
}

impl DofHandler {
    /// Number the nodes of all active cells
    pub fn new(mesh: &QuadMesh) -> Self {
        let cells = mesh.active_cells();
        let velocity = NodeSet::new(cells.iter().flat_map(|&c| velocity_points(mesh, c)));
        let pressure = NodeSet::new(cells.iter().flat_map(|&c| pressure_points(mesh, c)));
        let cell_velocity_nodes = cells
            .iter()
            .map(|&c| velocity_points(mesh, c).map(|p| velocity.node(p)))
            .collect();
        let cell_pressure_nodes = cells
            .iter()
            .map(|&c| pressure_points(mesh, c).map(|p| pressure.node(p)))
            .collect();
        Self {
            velocity,
            pressure,
            cell_velocity_nodes,
            cell_pressure_nodes,
        }
    }

    /// Velocity and pressure DOFs
    pub fn dofs_per_block(&self) -> [usize; 2] {
        [2 * self.velocity.positions.len(), self.pressure.positions.len()]
    }

    /// Velocity nodes of active cell `k`
    pub fn velocity_nodes(&self, k: usize) -> &[usize; N_VELOCITY_NODES] {
        &self.cell_velocity_nodes[k]
    }

    /// Pressure nodes of active cell `k`
    pub fn pressure_nodes(&self, k: usize) -> &[usize; N_PRESSURE_NODES] {
        &self.cell_pressure_nodes[k]
    }

    /// Lattice position of a velocity node
    pub fn velocity_position(&self, node: usize) -> [usize; 2] {
        self.velocity.positions[node]
    }

    /// Lattice position of a pressure node
    pub fn pressure_position(&self, node: usize) -> [usize; 2] {
        self.pressure.positions[node]
    }

    /// Number of velocity nodes
    pub fn n_velocity_nodes(&self) -> usize {
        self.velocity.positions.len()
    }

    /// Number of pressure nodes
    pub fn n_pressure_nodes(&self) -> usize {
        self.pressure.positions.len()
    }

    /// Global DOFs of active cell `k` in local DOF order
    pub fn local_dof_indices(&self, k: usize) -> [usize; DOFS_PER_CELL] {
        let n_u = self.dofs_per_block()[0];
        let mut dofs = [0; DOFS_PER_CELL];
        for (n, &node) in self.cell_velocity_nodes[k].iter().enumerate() {
            dofs[2 * n] = 2 * node;
            dofs[2 * n + 1] = 2 * node + 1;
        }
        for (m, &node) in self.cell_pressure_nodes[k].iter().enumerate() {
            dofs[VELOCITY_DOFS + m] = n_u + node;
        }
        dofs
    }

    /// Hanging node constraints: a node inside an edge segment of a
    /// coarser neighbor follows the linear interpolation along it.
    pub fn make_hanging_node_constraints(&self, mesh: &QuadMesh, constraints: &mut ConstraintSet) {
        let n_u = self.dofs_per_block()[0];
        let mut cells = mesh.active_cells().to_vec();
        cells.sort_by_key(|&c| mesh.level(c));
        let mut constrain = |node: usize, weights: [(usize, f64); 2], offset: usize, stride: usize, components: usize| {
            for c in 0..components {
                let dof = offset + stride * node + c;
                if constraints.add_line(dof) {
                    for (master, w) in weights {
                        if w != 0. {
                            constraints.add_entry(dof, offset + stride * master + c, w);
                        }
                    }
                }
            }
        };
        for &cell in &cells {
            let v = velocity_points(mesh, cell);
            // half edges: bottom, top, left, right
            let segments = [(0, 1), (1, 2), (6, 7), (7, 8), (0, 3), (3, 6), (2, 5), (5, 8)];
            for (a, b) in segments {
                let (na, nb) = (self.velocity.node(v[a]), self.velocity.node(v[b]));
                for (node, t) in self.velocity.between(v[a], v[b]) {
                    constrain(node, [(na, 1. - t), (nb, t)], 0, 2, 2);
                }
            }
            let p = pressure_points(mesh, cell);
            for (a, b) in [(0, 1), (2, 3), (0, 2), (1, 3)] {
                let (na, nb) = (self.pressure.node(p[a]), self.pressure.node(p[b]));
                for (node, t) in self.pressure.between(p[a], p[b]) {
                    constrain(node, [(na, 1. - t), (nb, t)], n_u, 1, 1);
                }
            }
        }
    }

    /// Dirichlet lines on the velocity. A DOF that is already
    /// constrained keeps its first constraint.
    pub fn make_dirichlet_constraints(
        &self,
        mesh: &QuadMesh,
        bcs: &BoundaryConditions,
        constraints: &mut ConstraintSet,
    ) {
        for (node, &p) in self.velocity.positions.iter().enumerate() {
            for id in mesh.boundary_ids(p) {
                for c in 0..2 {
                    if let Some(value) = bcs.velocity_value(id, c, mesh.to_physical(p)) {
                        let dof = 2 * node + c;
                        if constraints.add_line(dof) {
                            constraints.set_inhomogeneity(dof, value);
                        }
                    }
                }
            }
        }
    }

    /// Both constraint sets, closed
    ///
    /// # Errors
    /// Constraints are cyclic.
    pub fn make_constraints(&self, mesh: &QuadMesh, bcs: &BoundaryConditions) -> Result<Constraints> {
        let mut nonzero = ConstraintSet::new();
        self.make_hanging_node_constraints(mesh, &mut nonzero);
        self.make_dirichlet_constraints(mesh, bcs, &mut nonzero);
        nonzero.close()?;
        let zero = nonzero.homogenized();
        Ok(Constraints { zero, nonzero })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::CellFlag;

    #[test]
    fn test_numbering_on_uniform_mesh() {
        let mut mesh = QuadMesh::new([0., 0.], [1., 1.], [1, 1]);
        mesh.refine_global(1).unwrap();
        let dofs = DofHandler::new(&mesh);
        // 5x5 velocity nodes, 3x3 pressure nodes
        assert_eq!(dofs.dofs_per_block(), [50, 9]);
        assert_eq!(dofs.velocity_nodes(0), &[0, 1, 2, 5, 6, 7, 10, 11, 12]);
        assert_eq!(&dofs.local_dof_indices(3)[18..], &[54, 55, 57, 58]);
        let mut c = ConstraintSet::new();
        dofs.make_hanging_node_constraints(&mesh, &mut c);
        assert_eq!(c.n_constraints(), 0);
    }

    #[test]
    fn test_hanging_nodes() {
        let mut mesh = QuadMesh::new([0., 0.], [2., 1.], [2, 1]);
        let mut flags = vec![CellFlag::None; 2];
        flags[0] = CellFlag::Refine;
        mesh.execute(&flags).unwrap();
        let dofs = DofHandler::new(&mesh);
        let mut c = ConstraintSet::new();
        dofs.make_hanging_node_constraints(&mesh, &mut c);
        // left coarse cell refined: on x = 1 the fine cells add velocity
        // nodes at y = 1/4 and 3/4 (coarse has 0, 1/2, 1) and one
        // pressure node at y = 1/2
        assert_eq!(c.n_constraints(), 2 * 2 + 1);
        let quarter = crate::fem::mesh::COARSE_CELL / 4;
        let node = dofs.velocity.node([4 * quarter, quarter]);
        let line = c.line(2 * node).unwrap();
        let lower = dofs.velocity.node([4 * quarter, 0]);
        let middle = dofs.velocity.node([4 * quarter, 2 * quarter]);
        assert_eq!(line.entries, vec![(2 * lower, 0.5), (2 * middle, 0.5)]);
    }
}
