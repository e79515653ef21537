//! Q1-iso-Q2 velocity / Q1 pressure element on the unit square
//!
//! Velocity nodes form a 3x3 grid, node `a + 3 b` sits at `(a/2, b/2)`,
//! and the velocity is bilinear on each of the four sub-squares.
//! Pressure corner `i + 2 j` sits at `(i, j)`.
//!
//! Local DOF `2 n + c` is component `c` of velocity node `n`,
//! local DOF `18 + m` is pressure corner `m`.

/// Velocity nodes per cell
pub const N_VELOCITY_NODES: usize = 9;

/// Pressure nodes per cell
pub const N_PRESSURE_NODES: usize = 4;

/// Velocity DOFs per cell
pub const VELOCITY_DOFS: usize = 2 * N_VELOCITY_NODES;

/// DOFs per cell
pub const DOFS_PER_CELL: usize = VELOCITY_DOFS + N_PRESSURE_NODES;

/// Quadrature points per cell, 2x2 Gauss on each sub-square
pub const N_Q_POINTS: usize = 16;

/// Velocity shape values and reference gradients at one point
#[derive(Debug, Clone, Copy)]
pub struct VelocityShape {
    /// Value of each node function
    pub value: [f64; N_VELOCITY_NODES],
    /// d/dxi of each node function
    pub grad: [[f64; 2]; N_VELOCITY_NODES],
}

/// Velocity shape functions at a reference point in `[0, 1]^2`.
///
/// On the sub-square midlines the lower/left sub-square is used for
/// points below 0.5, the upper/right one otherwise.
pub fn velocity_shape(xi: [f64; 2]) -> VelocityShape {
    let sub = [usize::from(xi[0] >= 0.5), usize::from(xi[1] >= 0.5)];
    let eta = [2. * xi[0] - sub[0] as f64, 2. * xi[1] - sub[1] as f64];
    let mut shape = VelocityShape {
        value: [0.; N_VELOCITY_NODES],
        grad: [[0.; 2]; N_VELOCITY_NODES],
    };
    for j in 0..2 {
        for i in 0..2 {
            let n = (sub[0] + i) + 3 * (sub[1] + j);
            let (lx, dx) = linear(i, eta[0]);
            let (ly, dy) = linear(j, eta[1]);
            shape.value[n] = lx * ly;
            // chain rule d eta / d xi = 2
            shape.grad[n] = [2. * dx * ly, 2. * lx * dy];
        }
    }
    shape
}

/// Pressure shape values at a reference point
pub fn pressure_shape(xi: [f64; 2]) -> [f64; N_PRESSURE_NODES] {
    let mut value = [0.; N_PRESSURE_NODES];
    for j in 0..2 {
        for i in 0..2 {
            value[i + 2 * j] = linear(i, xi[0]).0 * linear(j, xi[1]).0;
        }
    }
    value
}

fn linear(i: usize, t: f64) -> (f64, f64) {
    if i == 0 {
        (1. - t, -1.)
    } else {
        (t, 1.)
    }
}

/// Shape data at one quadrature point
#[derive(Debug, Clone, Copy)]
pub struct QuadraturePoint {
    /// Reference coordinates
    pub xi: [f64; 2],
    /// Weight on the unit square
    pub weight: f64,
    /// Velocity shape functions
    pub velocity: VelocityShape,
    /// Pressure shape functions
    pub pressure: [f64; N_PRESSURE_NODES],
}

/// Tabulated shape functions at the cell quadrature points
#[derive(Debug, Clone)]
pub struct ReferenceElement {
    /// Quadrature points, sub-square by sub-square
    pub points: Vec<QuadraturePoint>,
}

impl Default for ReferenceElement {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceElement {
    /// Tabulate all quadrature points
    pub fn new() -> Self {
        let g = gauss_2();
        let mut points = Vec::with_capacity(N_Q_POINTS);
        for sb in 0..2 {
            for sa in 0..2 {
                for gy in g {
                    for gx in g {
                        let xi = [(sa as f64 + gx) / 2., (sb as f64 + gy) / 2.];
                        points.push(QuadraturePoint {
                            xi,
                            weight: 1. / N_Q_POINTS as f64,
                            velocity: velocity_shape(xi),
                            pressure: pressure_shape(xi),
                        });
                    }
                }
            }
        }
        Self { points }
    }
}

/// Two point Gauss rule on `[0, 1]`, equal weights 1/2
pub fn gauss_2() -> [f64; 2] {
    let d = 0.5 / 3f64.sqrt();
    [0.5 - d, 0.5 + d]
}

/// Reference position of velocity node `n`
pub fn velocity_node_position(n: usize) -> [f64; 2] {
    [(n % 3) as f64 / 2., (n / 3) as f64 / 2.]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(result: f64, expected: f64) {
        let dif = 1e-12;
        if (result - expected).abs() > dif {
            panic!("Large difference of values, got {} expected {}.", result, expected)
        }
    }

    #[test]
    fn test_partition_of_unity() {
        let element = ReferenceElement::new();
        assert_eq!(element.points.len(), N_Q_POINTS);
        for q in &element.points {
            approx_eq(q.velocity.value.iter().sum(), 1.);
            approx_eq(q.pressure.iter().sum(), 1.);
            approx_eq(q.velocity.grad.iter().map(|g| g[0]).sum(), 0.);
        }
        approx_eq(element.points.iter().map(|q| q.weight).sum(), 1.);
    }

    #[test]
    fn test_nodal_interpolation() {
        for n in 0..N_VELOCITY_NODES {
            let shape = velocity_shape(velocity_node_position(n));
            for m in 0..N_VELOCITY_NODES {
                approx_eq(shape.value[m], if m == n { 1. } else { 0. });
            }
        }
        // x reproduced exactly, gradient 1
        let shape = velocity_shape([0.3, 0.8]);
        let x: f64 = (0..9).map(|n| shape.value[n] * velocity_node_position(n)[0]).sum();
        let dx: f64 = (0..9).map(|n| shape.grad[n][0] * velocity_node_position(n)[0]).sum();
        approx_eq(x, 0.3);
        approx_eq(dx, 1.);
    }
}
