//! Kelly error indicator
use super::assemble::FACES;
use super::dofs::DofHandler;
use super::element::{gauss_2, velocity_shape, N_VELOCITY_NODES};
use super::mesh::{CellHandle, QuadMesh};
use crate::error::{Error, Result};
use crate::linalg::GhostedBlockVector;
use std::collections::HashMap;

/// Velocity gradient `G[c][d] = d u_c / d x_d` of active cell `k` at a
/// lattice position (fractional) inside or on the boundary of the cell.
fn velocity_gradient(
    mesh: &QuadMesh,
    dofs: &DofHandler,
    field: &GhostedBlockVector,
    cell: CellHandle,
    k: usize,
    p: [f64; 2],
) -> [[f64; 2]; 2] {
    let o = mesh.lattice_origin(cell);
    let s = mesh.lattice_size(cell) as f64;
    let xi = [(p[0] - o[0] as f64) / s, (p[1] - o[1] as f64) / s];
    let xi = [xi[0].clamp(0., 1.), xi[1].clamp(0., 1.)];
    let [hx, hy] = mesh.cell_extent(cell);
    let shape = velocity_shape(xi);
    let nodes = dofs.velocity_nodes(k);
    let mut grad = [[0.; 2]; 2];
    for n in 0..N_VELOCITY_NODES {
        let g = [shape.grad[n][0] / hx, shape.grad[n][1] / hy];
        for c in 0..2 {
            let u = field.get(2 * nodes[n] + c);
            grad[c][0] += u * g[0];
            grad[c][1] += u * g[1];
        }
    }
    grad
}

/// `η_K = sqrt(h / 24 ∫_∂K |[∇u · n]|²)` over the interior faces of each
/// active cell, where `[.]` is the jump to the neighbor.
pub(super) fn kelly_estimate(
    mesh: &QuadMesh,
    dofs: &DofHandler,
    field: &GhostedBlockVector,
) -> Result<Vec<f64>> {
    let n_u = dofs.dofs_per_block()[0];
    if field.dofs_per_block()[0] != n_u {
        return Err(Error::Invariant(format!(
            "field has {} velocity dofs, mesh has {}",
            field.dofs_per_block()[0],
            n_u
        )));
    }
    let cells = mesh.active_cells();
    let index: HashMap<CellHandle, usize> = cells.iter().enumerate().map(|(k, &c)| (c, k)).collect();
    let extent = mesh.lattice_extent();
    let spacing = mesh.lattice_spacing();

    let mut estimate = Vec::with_capacity(cells.len());
    for (k, &cell) in cells.iter().enumerate() {
        let o = mesh.lattice_origin(cell);
        let s = mesh.lattice_size(cell);
        let mut eta_sqr = 0.;
        for (face, &(normal, axis, fixed)) in FACES.iter().enumerate() {
            // lattice coordinate across the face, and the first lattice point inside the neighbor
            let across = axis;
            let along = 1 - axis;
            let position = o[across] + if fixed > 0. { s } else { 0 };
            let inside = match face % 2 {
                0 if position == 0 => continue,
                0 => position - 1,
                _ if position == extent[across] => continue,
                _ => position,
            };
            let h_face = s as f64 * spacing[along];
            let mut integral = 0.;
            let mut t = o[along];
            let end = o[along] + s;
            while t < end {
                let mut lattice = [0; 2];
                lattice[across] = inside;
                lattice[along] = t;
                let neighbor = mesh
                    .locate(lattice)
                    .ok_or_else(|| Error::Invariant(format!("no cell at {:?}", lattice)))?;
                let no = mesh.lattice_origin(neighbor);
                let ns = mesh.lattice_size(neighbor);
                // stop at the neighbor's end and at both midlines
                let mut stop = end.min(no[along] + ns);
                for mid in [o[along] + s / 2, no[along] + ns / 2] {
                    if mid > t && mid < stop {
                        stop = mid;
                    }
                }
                let nk = index[&neighbor];
                let length = (stop - t) as f64;
                for g in gauss_2() {
                    let mut p = [0.; 2];
                    p[across] = position as f64;
                    p[along] = t as f64 + g * length;
                    let own = velocity_gradient(mesh, dofs, field, cell, k, p);
                    let other = velocity_gradient(mesh, dofs, field, neighbor, nk, p);
                    for c in 0..2 {
                        let jump = (own[c][0] - other[c][0]) * normal[0]
                            + (own[c][1] - other[c][1]) * normal[1];
                        integral += 0.5 * jump * jump * length * spacing[along];
                    }
                }
                t = stop;
            }
            eta_sqr += h_face / 24. * integral;
        }
        estimate.push(eta_sqr.sqrt());
    }
    Ok(estimate)
}
