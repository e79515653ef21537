//! Cell integrals of the Navier-Stokes system
use super::dofs::DofHandler;
use super::element::{
    gauss_2, velocity_shape, ReferenceElement, DOFS_PER_CELL, N_PRESSURE_NODES,
    N_Q_POINTS, N_VELOCITY_NODES, VELOCITY_DOFS,
};
use super::mesh::QuadMesh;
use crate::discretization::{AssemblyRequest, Linearization};
use crate::error::Result;
use crate::linalg::{BlockSparseMatrix, BlockVector, GhostedBlockVector};
use ndarray::{Array1, Array2};

/// Nodal values of one cell
struct CellValues {
    velocity: [[f64; 2]; N_VELOCITY_NODES],
    pressure: [f64; N_PRESSURE_NODES],
}

impl CellValues {
    fn gather(field: &GhostedBlockVector, dofs: &[usize; DOFS_PER_CELL]) -> Self {
        let mut values = Self {
            velocity: [[0.; 2]; N_VELOCITY_NODES],
            pressure: [0.; N_PRESSURE_NODES],
        };
        for n in 0..N_VELOCITY_NODES {
            for c in 0..2 {
                values.velocity[n][c] = field.get(dofs[2 * n + c]);
            }
        }
        for m in 0..N_PRESSURE_NODES {
            values.pressure[m] = field.get(dofs[VELOCITY_DOFS + m]);
        }
        values
    }
}

/// Outward normal and reference coordinates of the four faces
pub(super) const FACES: [([f64; 2], usize, f64); 4] = [
    ([-1., 0.], 0, 0.),
    ([1., 0.], 0, 1.),
    ([0., -1.], 1, 0.),
    ([0., 1.], 1, 1.),
];

/// Reference points and weights of a face rule, 2 Gauss points on each
/// half of the face (the velocity is linear on each half).
pub(super) fn face_points(face: usize) -> Vec<([f64; 2], f64)> {
    let (_, axis, fixed) = FACES[face];
    let mut points = Vec::with_capacity(4);
    for half in 0..2 {
        for g in gauss_2() {
            let t = (half as f64 + g) / 2.;
            let xi = if axis == 0 { [fixed, t] } else { [t, fixed] };
            points.push((xi, 0.25));
        }
    }
    points
}

/// Assemble all active cells into `rhs` and, if given, the system and
/// mass matrices.
pub(super) fn assemble_cells(
    mesh: &QuadMesh,
    dof_handler: &DofHandler,
    element: &ReferenceElement,
    request: &AssemblyRequest,
    mut system: Option<&mut BlockSparseMatrix>,
    mut mass: Option<&mut BlockSparseMatrix>,
    rhs: &mut BlockVector,
) -> Result<()> {
    let n_cells = mesh.n_active_cells();
    request.cell_property.check(n_cells, N_Q_POINTS)?;
    rhs.fill(0.);
    if let Some(m) = system.as_deref_mut() {
        m.set_zero();
    }
    if let Some(m) = mass.as_deref_mut() {
        m.set_zero();
    }
    let rebuild = system.is_some();

    let nu = request.physics.viscosity;
    let rho = request.physics.rho;
    let gamma = request.physics.grad_div;
    let dt = request.time_step;
    let newton = request.linearization == Linearization::Newton;

    let mut local_matrix = Array2::<f64>::zeros((DOFS_PER_CELL, DOFS_PER_CELL));
    let mut local_mass = Array2::<f64>::zeros((DOFS_PER_CELL, DOFS_PER_CELL));
    let mut local_rhs = Array1::<f64>::zeros(DOFS_PER_CELL);

    for (k, &cell) in mesh.active_cells().iter().enumerate() {
        let [hx, hy] = mesh.cell_extent(cell);
        let dofs = dof_handler.local_dof_indices(k);
        let current = CellValues::gather(request.evaluation_point, &dofs);
        let previous = CellValues::gather(request.previous, &dofs);
        let properties = request.cell_property.get(k)?;

        local_matrix.fill(0.);
        local_mass.fill(0.);
        local_rhs.fill(0.);

        for (qp, property) in element.points.iter().zip(properties) {
            let jxw = qp.weight * hx * hy;
            let phi = &qp.velocity.value;
            let grad: Vec<[f64; 2]> = qp
                .velocity
                .grad
                .iter()
                .map(|g| [g[0] / hx, g[1] / hy])
                .collect();
            let psi = &qp.pressure;

            let mut u = [0.; 2];
            let mut u_old = [0.; 2];
            let mut du = [[0.; 2]; 2];
            for n in 0..N_VELOCITY_NODES {
                for c in 0..2 {
                    u[c] += phi[n] * current.velocity[n][c];
                    u_old[c] += phi[n] * previous.velocity[n][c];
                    for d in 0..2 {
                        du[c][d] += current.velocity[n][c] * grad[n][d];
                    }
                }
            }
            let div = du[0][0] + du[1][1];
            let p: f64 = (0..N_PRESSURE_NODES)
                .map(|m| psi[m] * current.pressure[m])
                .sum();
            let convection = [
                du[0][0] * u[0] + du[0][1] * u[1],
                du[1][0] * u[0] + du[1][1] * u[1],
            ];

            // residual, rhs = -R
            for n in 0..N_VELOCITY_NODES {
                for c in 0..2 {
                    let i = 2 * n + c;
                    let mut r = nu * (du[c][0] * grad[n][0] + du[c][1] * grad[n][1])
                        + gamma * rho * div * grad[n][c]
                        + rho * convection[c] * phi[n]
                        - p * grad[n][c];
                    if newton {
                        r += rho / dt * (u[c] - u_old[c]) * phi[n];
                    }
                    local_rhs[i] -= r * jxw;
                    if property.is_coupled() {
                        let sigma = property.fsi_stress[c];
                        local_rhs[i] += (grad[n][0] * sigma[0]
                            + grad[n][1] * sigma[1]
                            + rho * property.fsi_acceleration[c] * phi[n])
                            * jxw;
                    }
                }
            }
            for m in 0..N_PRESSURE_NODES {
                local_rhs[VELOCITY_DOFS + m] += div * psi[m] * jxw;
            }

            if !rebuild {
                continue;
            }
            for n in 0..N_VELOCITY_NODES {
                for c in 0..2 {
                    let i = 2 * n + c;
                    for m in 0..N_VELOCITY_NODES {
                        let nn = phi[n] * phi[m];
                        let gg = grad[n][0] * grad[m][0] + grad[n][1] * grad[m][1];
                        let u_grad = u[0] * grad[m][0] + u[1] * grad[m][1];
                        for d in 0..2 {
                            let j = 2 * m + d;
                            let mut a = gamma * rho * grad[n][c] * grad[m][d];
                            if c == d {
                                a += nu * gg + rho / dt * nn;
                                local_mass[[i, j]] += nn * jxw;
                            }
                            if newton {
                                if c == d {
                                    a += rho * u_grad * phi[n];
                                }
                                a += rho * du[c][d] * nn;
                            }
                            local_matrix[[i, j]] += a * jxw;
                        }
                    }
                    for l in 0..N_PRESSURE_NODES {
                        let b = -grad[n][c] * psi[l] * jxw;
                        local_matrix[[i, VELOCITY_DOFS + l]] += b;
                        local_matrix[[VELOCITY_DOFS + l, i]] += b;
                    }
                }
            }
            for l in 0..N_PRESSURE_NODES {
                for m in 0..N_PRESSURE_NODES {
                    local_mass[[VELOCITY_DOFS + l, VELOCITY_DOFS + m]] += psi[l] * psi[m] * jxw;
                }
            }
        }

        // traction -p n on Neumann boundaries
        let o = mesh.lattice_origin(cell);
        let s = mesh.lattice_size(cell);
        let extent = mesh.lattice_extent();
        let at_boundary = [o[0] == 0, o[0] + s == extent[0], o[1] == 0, o[1] + s == extent[1]];
        for (face, &(normal, axis, _)) in FACES.iter().enumerate() {
            let pressure = match request.neumann.get(&face) {
                Some(p) if at_boundary[face] => *p,
                _ => continue,
            };
            let length = if axis == 0 { hy } else { hx };
            for (xi, w) in face_points(face) {
                let shape = velocity_shape(xi);
                for n in 0..N_VELOCITY_NODES {
                    for c in 0..2 {
                        local_rhs[2 * n + c] -= shape.value[n] * normal[c] * pressure * w * length;
                    }
                }
            }
        }

        match (system.as_deref_mut(), mass.as_deref_mut()) {
            (Some(system), Some(mass)) => {
                request.constraints.distribute_local_to_global(
                    Some(&local_matrix),
                    &local_rhs,
                    &dofs,
                    Some(system),
                    rhs,
                )?;
                request
                    .constraints
                    .distribute_local_to_global_matrix(&local_mass, &dofs, mass)?;
            }
            (Some(system), None) => {
                request.constraints.distribute_local_to_global(
                    Some(&local_matrix),
                    &local_rhs,
                    &dofs,
                    Some(system),
                    rhs,
                )?;
            }
            _ => {
                request
                    .constraints
                    .distribute_local_to_global(None, &local_rhs, &dofs, None, rhs)?;
            }
        }
    }
    Ok(())
}
