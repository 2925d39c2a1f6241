// Centralized configuration for simulation parameters

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PicError, Result};
use crate::grid::Decomposition;
use crate::io::SaveFormat;
use crate::solver::PoissonMethod;
use crate::units::Units;

// ====================
// Grid Parameters
// ====================
/// Global true grid (nodes per spatial axis).
pub const DEFAULT_TRUE_SIZE: [usize; 3] = [16, 16, 16];
pub const DEFAULT_SUBDOMAINS: [usize; 3] = [1, 1, 1];
/// Ghost layers [before x, y, z, after x, y, z]. The ghost test counts one layer before.
pub const DEFAULT_GHOST_LAYERS: [usize; 6] = [1, 1, 1, 1, 1, 1];

// ====================
// Poisson Solver Parameters
// ====================
pub const SOR_OMEGA: f64 = 1.8;
/// Relative max-norm residual.
pub const SOR_TOLERANCE: f64 = 1e-8;
pub const SOR_MAX_ITERATIONS: usize = 20_000;

// ====================
// Object / Photoemission Parameters
// ====================
/// One astronomical unit in metres.
pub const DEFAULT_DISTANCE_FROM_SUN: f64 = 1.496e11;
/// Effective solar photosphere temperature in kelvin.
pub const DEFAULT_BLACK_BODY_TEMP: f64 = 5778.0;

// ====================
// Time Parameters
// ====================
pub const DEFAULT_TIME_STEPS: usize = 10;
/// Normalised timestep used by the pusher.
pub const DEFAULT_DT: f64 = 1.0;
/// Seconds per timestep.
pub const DEFAULT_UNIT_TIME: f64 = 1.0e-8;

// ====================
// Population Parameters
// ====================
pub const DEFAULT_CHARGE: [f64; 2] = [-1.0, 1.0];
pub const DEFAULT_MASS: [f64; 2] = [1.0, 1836.0];
pub const DEFAULT_CAPACITY: usize = 100_000;
pub const DEFAULT_THERMAL_VELOCITY: [f64; 2] = [0.05, 0.001];
pub const DEFAULT_SEED: u64 = 0x5eed;

// ====================
// Output Parameters
// ====================
pub const DEFAULT_OUTPUT_DIR: &str = "output";
/// Steps between snapshots; 0 disables output.
pub const DEFAULT_OUTPUT_INTERVAL: usize = 0;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub methods: MethodsConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub objects: ObjectsConfig,
    #[serde(default)]
    pub spectrum: SpectrumConfig,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub population: PopulationConfig,
    #[serde(default)]
    pub units: Units,
    #[serde(default)]
    pub output: OutputConfig,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_true_size")]
    pub true_size: Vec<usize>,
    #[serde(default = "default_subdomains")]
    pub n_subdomains: Vec<usize>,
    #[serde(default = "default_ghost_layers")]
    pub n_ghost_layers: Vec<usize>,
}

fn default_true_size() -> Vec<usize> {
    DEFAULT_TRUE_SIZE.to_vec()
}

fn default_subdomains() -> Vec<usize> {
    DEFAULT_SUBDOMAINS.to_vec()
}

fn default_ghost_layers() -> Vec<usize> {
    DEFAULT_GHOST_LAYERS.to_vec()
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            true_size: default_true_size(),
            n_subdomains: default_subdomains(),
            n_ghost_layers: default_ghost_layers(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodsConfig {
    #[serde(default)]
    pub poisson: PoissonMethod,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_omega")]
    pub omega: f64,
}

fn default_tolerance() -> f64 {
    SOR_TOLERANCE
}

fn default_max_iterations() -> usize {
    SOR_MAX_ITERATIONS
}

fn default_omega() -> f64 {
    SOR_OMEGA
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            omega: default_omega(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectsConfig {
    /// Persisted "Object" dataset; no objects when absent.
    #[serde(default)]
    pub mask_file: Option<PathBuf>,
    /// Work function per object, as a cutoff wavenumber in cm⁻¹.
    #[serde(default)]
    pub work_function: Vec<f64>,
    /// Sunlit conducting area per object in m².
    #[serde(default)]
    pub conducting_surface: Vec<f64>,
    #[serde(default = "default_distance_from_sun")]
    pub distance_from_sun: f64,
    #[serde(default)]
    pub photoemission: bool,
}

fn default_distance_from_sun() -> f64 {
    DEFAULT_DISTANCE_FROM_SUN
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        Self {
            mask_file: None,
            work_function: Vec::new(),
            conducting_surface: Vec::new(),
            distance_from_sun: default_distance_from_sun(),
            photoemission: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumConfig {
    #[serde(default = "default_black_body_temp")]
    pub black_body_temp: f64,
}

fn default_black_body_temp() -> f64 {
    DEFAULT_BLACK_BODY_TEMP
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            black_body_temp: default_black_body_temp(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeConfig {
    #[serde(default = "default_time_steps")]
    pub n_time_steps: usize,
    #[serde(default = "default_dt")]
    pub step: f64,
}

fn default_time_steps() -> usize {
    DEFAULT_TIME_STEPS
}

fn default_dt() -> f64 {
    DEFAULT_DT
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            n_time_steps: default_time_steps(),
            step: default_dt(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    #[serde(default = "default_charge")]
    pub charge: Vec<f64>,
    #[serde(default = "default_mass")]
    pub mass: Vec<f64>,
    #[serde(default = "default_capacity")]
    pub capacity: Vec<usize>,
    /// Particles placed uniformly at start, per species and rank.
    #[serde(default = "default_initial")]
    pub n_initial: Vec<usize>,
    #[serde(default = "default_thermal_velocity")]
    pub thermal_velocity: Vec<f64>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_charge() -> Vec<f64> {
    DEFAULT_CHARGE.to_vec()
}

fn default_mass() -> Vec<f64> {
    DEFAULT_MASS.to_vec()
}

fn default_capacity() -> Vec<usize> {
    vec![DEFAULT_CAPACITY; DEFAULT_CHARGE.len()]
}

fn default_initial() -> Vec<usize> {
    vec![0; DEFAULT_CHARGE.len()]
}

fn default_thermal_velocity() -> Vec<f64> {
    DEFAULT_THERMAL_VELOCITY.to_vec()
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            charge: default_charge(),
            mass: default_mass(),
            capacity: default_capacity(),
            n_initial: default_initial(),
            thermal_velocity: default_thermal_velocity(),
            seed: default_seed(),
        }
    }
}

impl PopulationConfig {
    pub fn n_species(&self) -> usize {
        self.charge.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_output_interval")]
    pub interval: usize,
    #[serde(default)]
    pub format: SaveFormat,
    #[serde(default)]
    pub compress: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_output_interval() -> usize {
    DEFAULT_OUTPUT_INTERVAL
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            interval: default_output_interval(),
            format: SaveFormat::default(),
            compress: false,
        }
    }
}

impl SimConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `path` as given if absolute, else relative to the config file.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn decomposition(&self) -> Result<Decomposition> {
        let g = &self.grid;
        let arr3 = |v: &[usize], what: &str| -> Result<[usize; 3]> {
            <[usize; 3]>::try_from(v)
                .map_err(|_| PicError::config(format!("grid.{what} needs 3 entries, got {}", v.len())))
        };
        let ghosts = <[usize; 6]>::try_from(g.n_ghost_layers.as_slice()).map_err(|_| {
            PicError::config(format!(
                "grid.n_ghost_layers needs 6 entries, got {}",
                g.n_ghost_layers.len()
            ))
        })?;
        Decomposition::new(
            arr3(&g.true_size[..], "true_size")?,
            arr3(&g.n_subdomains[..], "n_subdomains")?,
            ghosts,
        )
    }

    pub fn validate(&self, world_size: usize) -> Result<()> {
        let dec = self.decomposition()?;
        dec.check_world(world_size)?;
        let ghosts = dec.ghosts;
        if ghosts[..3].iter().any(|&g| g != 1) {
            return Err(PicError::config(format!(
                "grid.n_ghost_layers must have exactly one layer before each axis, got {:?}",
                ghosts
            )));
        }
        if ghosts[3..].iter().any(|&g| g == 0) {
            return Err(PicError::config(format!(
                "grid.n_ghost_layers needs at least one layer after each axis, got {:?}",
                ghosts
            )));
        }
        if dec.global_true.iter().any(|&n| n == 0) {
            return Err(PicError::config("grid.true_size entries must be positive"));
        }

        let s = &self.solver;
        if !(s.tolerance > 0.0) || s.max_iterations == 0 || !(s.omega > 0.0 && s.omega < 2.0) {
            return Err(PicError::config(format!(
                "solver parameters out of range: tolerance {}, max_iterations {}, omega {}",
                s.tolerance, s.max_iterations, s.omega
            )));
        }

        let p = &self.population;
        let n = p.n_species();
        if [p.mass.len(), p.capacity.len(), p.n_initial.len(), p.thermal_velocity.len()]
            .iter()
            .any(|&len| len != n)
        {
            return Err(PicError::config(format!(
                "population arrays must all have {} entries (one per species)",
                n
            )));
        }
        if p.mass.iter().any(|m| !(*m > 0.0)) {
            return Err(PicError::config("population.mass entries must be positive"));
        }
        if let Some(s) = (0..n).find(|&s| p.n_initial[s] > p.capacity[s]) {
            return Err(PicError::config(format!(
                "species {} starts with {} particles but has capacity {}",
                s, p.n_initial[s], p.capacity[s]
            )));
        }

        if !(self.time.step > 0.0) {
            return Err(PicError::config("time.step must be positive"));
        }
        if self.objects.photoemission {
            self.units.validate(n)?;
            if !(self.spectrum.black_body_temp > 0.0) || !(self.objects.distance_from_sun > 0.0) {
                return Err(PicError::config(
                    "photoemission needs a positive spectrum.black_body_temp and objects.distance_from_sun",
                ));
            }
        }
        Ok(())
    }
}
