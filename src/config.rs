//! # Parameter file
//!
//! Simulation parameters are read from a toml file:
//! ```toml
//! viscosity = 1e-3
//! fluid_rho = 1.0
//! end_time = 0.03
//! time_step = 0.01
//! output_interval = 0.01
//! refinement_interval = 0.02
//! global_refinements = 2
//! controller = "imex"
//! velocity_solver = "cg_ilu"
//! use_hard_coded_values = true
//!
//! [domain]
//! origin = [0.0, 0.0]
//! size = [2.2, 0.41]
//! subdivisions = [4, 1]
//!
//! [dirichlet_bcs.0]
//! flag = "xy"
//! values = [0.0, 0.0]
//!
//! [neumann_bcs]
//! 1 = 0.0
//! ```
//! Boundary ids are 0 (left), 1 (right), 2 (bottom) and 3 (top).
use crate::error::{Error, Result};
use crate::fem::mesh::MAX_LEVEL;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Spatial dimension of the discretization
pub const DIM: usize = 2;

/// Peak inflow velocity of the hard coded profile
pub const INFLOW_PEAK: f64 = 0.45;

/// Nonlinear controller
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    /// Linearize once, freeze the operator after step 2
    Imex,
    /// Full Newton iteration in every step
    Newton,
}

/// Inner solver for the velocity block of the preconditioner
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VelocitySolverKind {
    /// CG without preconditioner
    Cg,
    /// CG with ILU(0)
    CgIlu,
    /// Banded LU
    Direct,
}

/// Rectangular domain split into coarse cells
#[derive(Deserialize, Debug, Clone)]
pub struct Domain {
    /// Lower left corner
    pub origin: [f64; 2],
    /// Extent in x and y
    pub size: [f64; 2],
    /// Number of coarse cells in x and y
    pub subdivisions: [usize; 2],
}

impl Default for Domain {
    fn default() -> Self {
        Self {
            origin: [0., 0.],
            size: [2.2, 0.41],
            subdivisions: [4, 1],
        }
    }
}

/// Mask flag as written in the file, name or numeric code
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum FlagValue {
    /// "x", "xy", ...
    Name(String),
    /// 1 (x) to 7 (xyz)
    Code(u32),
}

/// Dirichlet entry as written in the file
#[derive(Deserialize, Debug, Clone)]
pub struct DirichletEntry {
    /// Constrained components
    pub flag: FlagValue,
    /// One value per selected component
    #[serde(default)]
    pub values: Vec<f64>,
}

/// Simulation parameters
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Parameters {
    /// Kinematic viscosity
    pub viscosity: f64,
    /// Density
    pub fluid_rho: f64,
    /// Grad-div stabilization parameter
    pub grad_div: f64,
    /// End of simulation
    pub end_time: f64,
    /// Step size
    pub time_step: f64,
    /// Time between outputs
    pub output_interval: f64,
    /// Time between mesh adaptions
    pub refinement_interval: f64,
    /// Domain geometry
    pub domain: Domain,
    /// Uniform refinements of the coarse mesh
    pub global_refinements: usize,
    /// Cells at this level are never coarsened
    pub min_level: usize,
    /// Cells at this level are never refined, defaults to `global_refinements + 1`
    pub max_level: Option<usize>,
    /// Nonlinear controller
    pub controller: ControllerKind,
    /// Relative residual of the Newton loop
    pub tolerance: f64,
    /// Maximum number of Newton iterations
    pub max_iterations: usize,
    /// Velocity solver of the preconditioner
    pub velocity_solver: VelocitySolverKind,
    /// Use the parabolic inflow profile instead of constant values
    pub use_hard_coded_values: bool,
    /// Boundary id (as string key) -> Dirichlet entry
    pub dirichlet_bcs: BTreeMap<String, DirichletEntry>,
    /// Boundary id (as string key) -> pressure
    pub neumann_bcs: BTreeMap<String, f64>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            viscosity: 1e-3,
            fluid_rho: 1.,
            grad_div: 0.,
            end_time: 1.,
            time_step: 1e-2,
            output_interval: 1e-1,
            refinement_interval: 0.,
            domain: Domain::default(),
            global_refinements: 1,
            min_level: 0,
            max_level: None,
            controller: ControllerKind::Imex,
            tolerance: 1e-8,
            max_iterations: 8,
            velocity_solver: VelocitySolverKind::CgIlu,
            use_hard_coded_values: false,
            dirichlet_bcs: BTreeMap::new(),
            neumann_bcs: BTreeMap::new(),
        }
    }
}

impl Parameters {
    /// Read and validate a parameter file
    ///
    /// # Errors
    /// File not readable, not valid toml, or invalid boundary conditions.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate toml content
    ///
    /// # Errors
    /// Not valid toml, or invalid boundary conditions.
    pub fn from_toml(content: &str) -> Result<Self> {
        let parameters: Parameters = toml::from_str(content)?;
        parameters.validate()?;
        Ok(parameters)
    }

    /// Check values that serde cannot check
    ///
    /// # Errors
    /// First invalid entry.
    pub fn validate(&self) -> Result<()> {
        if self.time_step <= 0. {
            return Err(Error::Config(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if self.domain.subdivisions.iter().any(|&n| n == 0) {
            return Err(Error::Config("domain needs at least one cell per direction".into()));
        }
        if self.min_level > self.max_level() {
            return Err(Error::Config(format!(
                "min_level {} exceeds max_level {}",
                self.min_level,
                self.max_level()
            )));
        }
        if self.max_level() > MAX_LEVEL {
            return Err(Error::Config(format!(
                "max_level {} exceeds the deepest mesh level {}",
                self.max_level(),
                MAX_LEVEL
            )));
        }
        self.boundary_conditions().map(|_| ())
    }

    /// Finest level allowed by adaptive refinement
    pub fn max_level(&self) -> usize {
        self.max_level.unwrap_or(self.global_refinements + 1)
    }

    /// Parsed boundary conditions
    ///
    /// # Errors
    /// Unrecognized flag, bad boundary id or wrong number of values.
    pub fn boundary_conditions(&self) -> Result<BoundaryConditions> {
        let mut dirichlet = BTreeMap::new();
        for (key, entry) in &self.dirichlet_bcs {
            let id = parse_boundary_id(key)?;
            let mask = ComponentMask::from_flag(&entry.flag)?;
            if !self.use_hard_coded_values && entry.values.len() != mask.n_selected() {
                return Err(Error::Config(format!(
                    "boundary {}: flag {} needs {} values, got {}",
                    id,
                    mask,
                    mask.n_selected(),
                    entry.values.len()
                )));
            }
            dirichlet.insert(
                id,
                DirichletBc {
                    mask,
                    values: entry.values.clone(),
                },
            );
        }
        let mut neumann = BTreeMap::new();
        for (key, value) in &self.neumann_bcs {
            neumann.insert(parse_boundary_id(key)?, *value);
        }
        Ok(BoundaryConditions {
            dirichlet,
            neumann,
            hard_coded: self.use_hard_coded_values,
            origin: self.domain.origin,
            height: self.domain.size[1],
        })
    }
}

fn parse_boundary_id(key: &str) -> Result<usize> {
    match key.trim().parse::<usize>() {
        Ok(id) if id < 4 => Ok(id),
        _ => Err(Error::Config(format!("unknown boundary id {}", key))),
    }
}

/// Selected velocity components, bit c for component c
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentMask(u8);

impl ComponentMask {
    /// Parse a flag, 1-x, 2-y, 3-xy, 4-z, 5-xz, 6-yz, 7-xyz
    ///
    /// # Errors
    /// Unrecognized flag, or a component the 2D discretization lacks.
    pub fn from_flag(flag: &FlagValue) -> Result<Self> {
        let code = match flag {
            FlagValue::Code(c) => *c,
            FlagValue::Name(name) => match name.trim() {
                "x" | "1" => 1,
                "y" | "2" => 2,
                "xy" | "3" => 3,
                "z" | "4" => 4,
                "xz" | "5" => 5,
                "yz" | "6" => 6,
                "xyz" | "7" => 7,
                other => {
                    return Err(Error::Config(format!(
                        "Unrecognized component flag {:?}",
                        other
                    )))
                }
            },
        };
        if code == 0 || code > 7 {
            return Err(Error::Config(format!("Unrecognized component flag {}", code)));
        }
        if code >> DIM != 0 {
            return Err(Error::Config(format!(
                "component flag {} selects z, which does not exist in {}D",
                code, DIM
            )));
        }
        Ok(Self(code as u8))
    }

    /// Mask of all velocity components
    pub fn all() -> Self {
        Self((1 << DIM) - 1)
    }

    /// Is component `c` selected
    pub fn selects(&self, c: usize) -> bool {
        self.0 & (1 << c) != 0
    }

    /// Number of selected components
    pub fn n_selected(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Position of component `c` among the selected ones
    fn slot(&self, c: usize) -> usize {
        (self.0 & ((1 << c) - 1)).count_ones() as usize
    }
}

impl std::fmt::Display for ComponentMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (c, name) in ["x", "y", "z"].iter().enumerate() {
            if self.selects(c) {
                write!(f, "{}", name)?;
            }
        }
        Ok(())
    }
}

/// Dirichlet condition of one boundary
#[derive(Debug, Clone)]
pub struct DirichletBc {
    /// Constrained components
    pub mask: ComponentMask,
    /// One value per selected component
    pub values: Vec<f64>,
}

/// Validated boundary conditions
#[derive(Debug, Clone)]
pub struct BoundaryConditions {
    /// Boundary id -> Dirichlet condition
    pub dirichlet: BTreeMap<usize, DirichletBc>,
    /// Boundary id -> prescribed pressure
    pub neumann: BTreeMap<usize, f64>,
    hard_coded: bool,
    origin: [f64; 2],
    height: f64,
}

impl BoundaryConditions {
    /// Channel with parabolic inflow on the left and no-slip walls
    /// at bottom and top. The right boundary is free.
    pub fn channel(origin: [f64; 2], size: [f64; 2]) -> Self {
        let mut dirichlet = BTreeMap::new();
        for id in [0, 2, 3] {
            dirichlet.insert(
                id,
                DirichletBc {
                    mask: ComponentMask::all(),
                    values: vec![0.; DIM],
                },
            );
        }
        Self {
            dirichlet,
            neumann: BTreeMap::new(),
            hard_coded: true,
            origin,
            height: size[1],
        }
    }

    /// Value of velocity component `c` at a point of boundary `id`,
    /// `None` if the component is free there.
    pub fn velocity_value(&self, id: usize, c: usize, point: [f64; 2]) -> Option<f64> {
        let bc = self.dirichlet.get(&id)?;
        if !bc.mask.selects(c) {
            return None;
        }
        if self.hard_coded {
            return Some(self.inflow(c, point));
        }
        bc.values.get(bc.mask.slot(c)).copied()
    }

    /// Parabolic profile `4 U y (H - y) / H^2` in x on the left boundary
    fn inflow(&self, c: usize, point: [f64; 2]) -> f64 {
        if c == 0 && (point[0] - self.origin[0]).abs() < 1e-10 {
            let y = point[1] - self.origin[1];
            let h = self.height;
            4. * INFLOW_PEAK * y * (h - y) / (h * h)
        } else {
            0.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let name = |s: &str| FlagValue::Name(s.to_string());
        assert_eq!(ComponentMask::from_flag(&name("xy")).unwrap(), ComponentMask::all());
        assert_eq!(ComponentMask::from_flag(&name("2")).unwrap().to_string(), "y");
        assert_eq!(ComponentMask::from_flag(&FlagValue::Code(1)).unwrap().n_selected(), 1);
        assert!(matches!(ComponentMask::from_flag(&name("w")), Err(Error::Config(_))));
        assert!(matches!(ComponentMask::from_flag(&name("xz")), Err(Error::Config(_))));
        assert!(ComponentMask::from_flag(&FlagValue::Code(8)).is_err());
    }

    #[test]
    fn test_read_parameters() {
        let content = r#"
            viscosity = 1e-2
            time_step = 0.01
            global_refinements = 2

            [dirichlet_bcs.2]
            flag = "xy"
            values = [0.0, 0.0]

            [dirichlet_bcs.0]
            flag = 2
            values = [1.5]

            [neumann_bcs]
            1 = 0.5
        "#;
        let p = Parameters::from_toml(content).unwrap();
        assert_eq!(p.max_level(), 3);
        assert_eq!(p.tolerance, 1e-8);
        assert_eq!(p.controller, ControllerKind::Imex);
        let bcs = p.boundary_conditions().unwrap();
        assert_eq!(bcs.velocity_value(0, 1, [0., 0.2]), Some(1.5));
        assert_eq!(bcs.velocity_value(0, 0, [0., 0.2]), None);
        assert_eq!(bcs.velocity_value(2, 0, [1., 0.]), Some(0.));
        assert_eq!(bcs.neumann.get(&1), Some(&0.5));
    }

    #[test]
    fn test_bad_flag_is_fatal() {
        let content = r#"
            [dirichlet_bcs.0]
            flag = "q"
            values = [0.0]
        "#;
        assert!(matches!(Parameters::from_toml(content), Err(Error::Config(_))));
        let content = r#"
            [dirichlet_bcs.0]
            flag = "xy"
            values = [0.0]
        "#;
        assert!(matches!(Parameters::from_toml(content), Err(Error::Config(_))));
    }

    #[test]
    fn test_level_limits() {
        let content = format!("max_level = {}", MAX_LEVEL);
        assert_eq!(Parameters::from_toml(&content).unwrap().max_level(), MAX_LEVEL);
        let content = format!("max_level = {}", MAX_LEVEL + 1);
        assert!(matches!(Parameters::from_toml(&content), Err(Error::Config(_))));
        // the default follows global_refinements
        let content = format!("global_refinements = {}", MAX_LEVEL);
        assert!(matches!(Parameters::from_toml(&content), Err(Error::Config(_))));
        assert!(matches!(
            Parameters::from_toml("min_level = 3\nmax_level = 2"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_hard_coded_inflow() {
        let bcs = BoundaryConditions::channel([0., 0.], [2.2, 0.41]);
        let peak = bcs.velocity_value(0, 0, [0., 0.205]).unwrap();
        assert!((peak - INFLOW_PEAK).abs() < 1e-12);
        assert_eq!(bcs.velocity_value(0, 1, [0., 0.205]), Some(0.));
        assert_eq!(bcs.velocity_value(2, 0, [1., 0.]), Some(0.));
        assert_eq!(bcs.velocity_value(1, 0, [2.2, 0.1]), None);
    }
}
