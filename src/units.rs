//! Physical constants and the scale factors between grid units and SI.
//!
//! Grid quantities are normalised: unit cell length, unit timestep, ε0 = 1.
//! `Units` carries the factors that turn them back into SI for output and
//! for the photoemission model.

use serde::{Deserialize, Serialize};

use crate::error::{PicError, Result};

/// Planck constant in J s.
pub const PLANCK: f64 = 6.626_069_3e-34;
/// Boltzmann constant in J/K.
pub const BOLTZMANN: f64 = 1.380_658e-23;
/// Speed of light in m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
/// Solar surface area in m².
pub const SUN_SURFACE_AREA: f64 = 6.1e18;
/// Electron charge in coulombs.
pub const ELECTRON_CHARGE: f64 = -1.602_176_62e-19;

/// Second radiation constant hc/k in m K.
pub const C1: f64 = PLANCK * SPEED_OF_LIGHT / BOLTZMANN;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Units {
    /// Seconds per timestep.
    #[serde(default = "default_time")]
    pub time: f64,
    /// SI charge density of one normalised unit.
    #[serde(default = "default_scale")]
    pub charge_density: f64,
    /// Volts per normalised potential unit.
    #[serde(default = "default_scale")]
    pub potential: f64,
    /// Physical particles represented by one simulation particle, per species.
    #[serde(default)]
    pub weights: Vec<f64>,
}

fn default_time() -> f64 {
    crate::config::DEFAULT_UNIT_TIME
}

fn default_scale() -> f64 {
    1.0
}

impl Default for Units {
    fn default() -> Self {
        Self {
            time: default_time(),
            charge_density: default_scale(),
            potential: default_scale(),
            weights: Vec::new(),
        }
    }
}

impl Units {
    pub fn validate(&self, n_species: usize) -> Result<()> {
        if self.weights.len() != n_species {
            return Err(PicError::config(format!(
                "units.weights has {} entries for {} species",
                self.weights.len(),
                n_species
            )));
        }
        if let Some(w) = self.weights.iter().find(|w| !(**w > 0.0)) {
            return Err(PicError::config(format!("particle weight {w} must be positive")));
        }
        if !(self.time > 0.0) {
            return Err(PicError::config("units.time must be positive"));
        }
        Ok(())
    }
}
