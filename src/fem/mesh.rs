//! Forest of quadtrees on a rectangle
//!
//! Positions are integer lattice points. A coarse cell spans
//! [`COARSE_CELL`] lattice units, a cell on level `l` spans
//! `COARSE_CELL >> l`.
use crate::discretization::CellFlag;
use crate::error::{Error, Result};

/// Number of lattice bits per coarse cell
pub const LATTICE_DEPTH: usize = 12;

/// Lattice units per coarse cell
pub const COARSE_CELL: usize = 1 << LATTICE_DEPTH;

/// Finest level; velocity nodes sit at half the cell size
pub const MAX_LEVEL: usize = LATTICE_DEPTH - 1;

/// Stable index of a cell in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellHandle(usize);

#[derive(Debug, Clone)]
struct Cell {
    parent: Option<CellHandle>,
    children: Option<[CellHandle; 4]>,
    level: usize,
    origin: [usize; 2],
    active: bool,
}

/// Adaptive quadrilateral mesh.
///
/// Cells are never removed from the arena. Coarsening deactivates the
/// children, refining a cell again reactivates them.
#[derive(Debug, Clone)]
pub struct QuadMesh {
    origin: [f64; 2],
    size: [f64; 2],
    subdivisions: [usize; 2],
    cells: Vec<Cell>,
    roots: Vec<CellHandle>,
    active: Vec<CellHandle>,
}

impl QuadMesh {
    /// Rectangle `[origin, origin + size]` with `subdivisions` coarse cells
    pub fn new(origin: [f64; 2], size: [f64; 2], subdivisions: [usize; 2]) -> Self {
        let mut cells = Vec::with_capacity(subdivisions[0] * subdivisions[1]);
        for j in 0..subdivisions[1] {
            for i in 0..subdivisions[0] {
                cells.push(Cell {
                    parent: None,
                    children: None,
                    level: 0,
                    origin: [i * COARSE_CELL, j * COARSE_CELL],
                    active: true,
                });
            }
        }
        let roots: Vec<CellHandle> = (0..cells.len()).map(CellHandle).collect();
        let mut mesh = Self {
            origin,
            size,
            subdivisions,
            cells,
            roots,
            active: Vec::new(),
        };
        mesh.collect_active();
        mesh
    }

    /// Refine every active cell `times` times
    ///
    /// # Errors
    /// Cells would exceed [`MAX_LEVEL`].
    pub fn refine_global(&mut self, times: usize) -> Result<()> {
        for _ in 0..times {
            let flags = vec![CellFlag::Refine; self.n_active_cells()];
            self.execute(&flags)?;
        }
        Ok(())
    }

    /// Active cells, coarse cells row by row, children depth first
    pub fn active_cells(&self) -> &[CellHandle] {
        &self.active
    }

    /// Number of active cells
    pub fn n_active_cells(&self) -> usize {
        self.active.len()
    }

    /// Refinement level
    pub fn level(&self, cell: CellHandle) -> usize {
        self.cells[cell.0].level
    }

    /// Lower left corner in lattice units
    pub fn lattice_origin(&self, cell: CellHandle) -> [usize; 2] {
        self.cells[cell.0].origin
    }

    /// Edge length in lattice units
    pub fn lattice_size(&self, cell: CellHandle) -> usize {
        COARSE_CELL >> self.cells[cell.0].level
    }

    /// Parent cell
    pub fn parent(&self, cell: CellHandle) -> Option<CellHandle> {
        self.cells[cell.0].parent
    }

    /// Children, also if currently inactive
    pub fn children(&self, cell: CellHandle) -> Option<[CellHandle; 4]> {
        self.cells[cell.0].children
    }

    /// Is the cell part of the current mesh
    pub fn is_active(&self, cell: CellHandle) -> bool {
        self.cells[cell.0].active
    }

    /// Extent of the domain in lattice units
    pub fn lattice_extent(&self) -> [usize; 2] {
        [
            self.subdivisions[0] * COARSE_CELL,
            self.subdivisions[1] * COARSE_CELL,
        ]
    }

    /// Physical size of one lattice unit
    pub fn lattice_spacing(&self) -> [f64; 2] {
        let extent = self.lattice_extent();
        [
            self.size[0] / extent[0] as f64,
            self.size[1] / extent[1] as f64,
        ]
    }

    /// Physical position of a lattice point
    pub fn to_physical(&self, p: [usize; 2]) -> [f64; 2] {
        let h = self.lattice_spacing();
        [
            self.origin[0] + p[0] as f64 * h[0],
            self.origin[1] + p[1] as f64 * h[1],
        ]
    }

    /// Physical edge lengths of a cell
    pub fn cell_extent(&self, cell: CellHandle) -> [f64; 2] {
        let h = self.lattice_spacing();
        let s = self.lattice_size(cell) as f64;
        [s * h[0], s * h[1]]
    }

    /// Boundary ids (0 left, 1 right, 2 bottom, 3 top) a lattice point lies on
    pub fn boundary_ids(&self, p: [usize; 2]) -> impl Iterator<Item = usize> {
        let extent = self.lattice_extent();
        let on = [p[0] == 0, p[0] == extent[0], p[1] == 0, p[1] == extent[1]];
        (0..4).filter(move |&id| on[id])
    }

    /// Active cell whose half open box `[o, o + s)` holds `p`
    pub fn locate(&self, p: [usize; 2]) -> Option<CellHandle> {
        let extent = self.lattice_extent();
        if p[0] >= extent[0] || p[1] >= extent[1] {
            return None;
        }
        let root = (p[1] / COARSE_CELL) * self.subdivisions[0] + p[0] / COARSE_CELL;
        let mut cell = self.roots[root];
        while !self.is_active(cell) {
            let children = self.children(cell)?;
            cell = children[self.child_index(cell, p)];
        }
        Some(cell)
    }

    /// Child of `cell` whose closed box holds `p`, upper child on ties
    pub fn child_index(&self, cell: CellHandle, p: [usize; 2]) -> usize {
        let o = self.lattice_origin(cell);
        let half = self.lattice_size(cell) / 2;
        usize::from(p[0] >= o[0] + half) + 2 * usize::from(p[1] >= o[1] + half)
    }

    /// Refine and coarsen according to one flag per active cell.
    ///
    /// A parent is coarsened only if all of its children are active and
    /// flagged for coarsening.
    ///
    /// # Errors
    /// Flag count mismatch, or refinement beyond [`MAX_LEVEL`].
    pub fn execute(&mut self, flags: &[CellFlag]) -> Result<()> {
        if flags.len() != self.active.len() {
            return Err(Error::Invariant(format!(
                "got {} refinement flags for {} active cells",
                flags.len(),
                self.active.len()
            )));
        }
        let active = self.active.clone();
        let coarsen: std::collections::HashSet<CellHandle> = active
            .iter()
            .zip(flags)
            .filter(|(_, f)| **f == CellFlag::Coarsen)
            .map(|(c, _)| *c)
            .collect();
        let mut parents: Vec<CellHandle> = coarsen.iter().filter_map(|&c| self.parent(c)).collect();
        parents.sort_unstable();
        parents.dedup();
        for parent in parents {
            if let Some(children) = self.children(parent) {
                if children.iter().all(|c| coarsen.contains(c)) {
                    for c in children {
                        self.cells[c.0].active = false;
                    }
                    self.cells[parent.0].active = true;
                }
            }
        }
        for (&cell, flag) in active.iter().zip(flags) {
            if *flag == CellFlag::Refine {
                self.refine_cell(cell)?;
            }
        }
        self.collect_active();
        Ok(())
    }

    fn refine_cell(&mut self, cell: CellHandle) -> Result<()> {
        let level = self.level(cell);
        if level >= MAX_LEVEL {
            return Err(Error::Invariant(format!(
                "cannot refine beyond level {}",
                MAX_LEVEL
            )));
        }
        let children = match self.children(cell) {
            Some(children) => children,
            None => {
                let o = self.lattice_origin(cell);
                let half = self.lattice_size(cell) / 2;
                let mut children = [CellHandle(0); 4];
                for (k, child) in children.iter_mut().enumerate() {
                    *child = CellHandle(self.cells.len());
                    self.cells.push(Cell {
                        parent: Some(cell),
                        children: None,
                        level: level + 1,
                        origin: [o[0] + (k % 2) * half, o[1] + (k / 2) * half],
                        active: false,
                    });
                }
                self.cells[cell.0].children = Some(children);
                children
            }
        };
        self.cells[cell.0].active = false;
        for c in children {
            self.cells[c.0].active = true;
        }
        Ok(())
    }

    fn collect_active(&mut self) {
        let mut active = Vec::new();
        let mut stack = Vec::new();
        for &root in &self.roots {
            stack.push(root);
            while let Some(cell) = stack.pop() {
                if self.is_active(cell) {
                    active.push(cell);
                } else if let Some(children) = self.children(cell) {
                    stack.extend(children.iter().rev());
                }
            }
        }
        self.active = active;
    }
}
