// object/radiance.rs
// Blackbody photon and energy flux above each object's work function, and the
// photoelectron charge it leaves on sunlit surface nodes.
//
// Truncated series of Widger & Woodall (1976) for the Planck integrals.

use log::{info, warn};

use super::ObjectSet;
use crate::comm::Communicator;
use crate::error::Result;
use crate::grid::Grid;
use crate::population::Population;
use crate::units::{Units, BOLTZMANN, C1, PLANCK, SPEED_OF_LIGHT, SUN_SURFACE_AREA};

/// Dimensionless cutoff `hcσ/kT` for a wavenumber in cm⁻¹.
pub fn cutoff(sigma_per_cm: f64, temperature: f64) -> f64 {
    C1 * 100.0 * sigma_per_cm / temperature
}

fn n_terms(x: f64) -> usize {
    (2.0 + 20.0 / x).min(512.0) as usize
}

/// ∫ₓ^∞ t² / (eᵗ - 1) dt
pub fn photon_series(x: f64) -> f64 {
    let x2 = x * x;
    (1..n_terms(x))
        .map(|n| {
            let dn = 1.0 / n as f64;
            (-(n as f64) * x).exp() * (x2 + 2.0 * (x + dn) * dn) * dn
        })
        .sum()
}

/// ∫ₓ^∞ t³ / (eᵗ - 1) dt
pub fn energy_series(x: f64) -> f64 {
    let x2 = x * x;
    let x3 = x * x2;
    (1..n_terms(x))
        .map(|n| {
            let dn = 1.0 / n as f64;
            (-(n as f64) * x).exp() * (x3 + (3.0 * x2 + 6.0 * (x + dn) * dn) * dn) * dn
        })
        .sum()
}

/// Photon radiance above `sigma` in photons/s/m²/sr.
pub fn planck_photon_integral(sigma_per_cm: f64, temperature: f64) -> f64 {
    let kt_hc = BOLTZMANN * temperature / (PLANCK * SPEED_OF_LIGHT);
    2.0 * kt_hc.powi(3) * SPEED_OF_LIGHT * photon_series(cutoff(sigma_per_cm, temperature))
}

/// Radiance above `sigma` in W/m²/sr.
pub fn planck_energy_integral(sigma_per_cm: f64, temperature: f64) -> f64 {
    2.0 * PLANCK
        * SPEED_OF_LIGHT
        * SPEED_OF_LIGHT
        * (temperature / C1).powi(4)
        * energy_series(cutoff(sigma_per_cm, temperature))
}

impl ObjectSet {
    /// Fills `radiance` (photons per timestep) and `band_energy` (joules per
    /// timestep) for every object.
    pub fn compute_radiance(&mut self, temperature: f64, distance_from_sun: f64, units: &Units, comm: &dyn Communicator) {
        for a in 0..self.n_objects {
            let solid_angle = self.conducting_surface[a] / (distance_from_sun * distance_from_sun);
            let scale = solid_angle * SUN_SURFACE_AREA * units.time;
            self.radiance[a] = planck_photon_integral(self.work_function[a], temperature) * scale;
            self.band_energy[a] = planck_energy_integral(self.work_function[a], temperature) * scale;
            if comm.is_root() {
                info!(
                    "object {}: {:e} photons and {:e} J per step above the work function",
                    a, self.radiance[a], self.band_energy[a]
                );
            }
        }
    }

    /// Each absorbed photon frees one electron of the first negative species,
    /// counted in simulation particles. The opposite charge is spread over the
    /// global exposed nodes of the object. Returns the emitted count per object.
    pub fn collect_photoelectron_charge(
        &self,
        pop: &Population,
        rho_obj: &mut Grid,
        units: &Units,
        comm: &dyn Communicator,
    ) -> Result<Vec<f64>> {
        let mut emitted = vec![0.0; self.n_objects];
        let Some(s) = pop.charge.iter().position(|&q| q < 0.0) else {
            warn!("no negative species to carry photoelectrons; photoemission skipped");
            return Ok(emitted);
        };

        for a in 0..self.n_objects {
            let total_exposed = comm.all_reduce_sum_usize(self.exposed.count(a))?;
            emitted[a] = (self.radiance[a] / units.weights[s]).floor();
            if total_exposed == 0 {
                warn!("object {} has no sunlit surface nodes", a);
                continue;
            }
            let share = emitted[a] * -pop.charge[s] / total_exposed as f64;
            for &node in self.exposed.bucket(a) {
                rho_obj.val[node] += share;
            }
        }
        if comm.is_root() {
            info!("photoemission: {:?} electrons per object", emitted);
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, n: usize) -> f64 {
        let h = (b - a) / n as f64;
        let mut s = f(a) + f(b);
        for i in 1..n {
            let w = if i % 2 == 1 { 4.0 } else { 2.0 };
            s += w * f(a + i as f64 * h);
        }
        s * h / 3.0
    }

    #[test]
    fn series_match_quadrature() {
        for x in [0.5, 2.0, 9.0] {
            let photons = simpson(|t| t * t / t.exp_m1(), x, x + 60.0, 20_000);
            let energy = simpson(|t| t * t * t / t.exp_m1(), x, x + 60.0, 20_000);
            assert_relative_eq!(photon_series(x), photons, max_relative = 1e-6);
            assert_relative_eq!(energy_series(x), energy, max_relative = 1e-6);
        }
    }

    #[test]
    fn low_cutoff_approaches_stefan_boltzmann() {
        // Whole-spectrum energy integral is π⁴/15.
        assert_relative_eq!(energy_series(1e-3), PI.powi(4) / 15.0, max_relative = 1e-3);
    }

    #[test]
    fn term_count_is_capped() {
        assert_eq!(n_terms(1e-6), 512);
        assert_eq!(n_terms(10.0), 4);
    }

    #[test]
    fn solar_flux_is_physical() {
        // Total solar radiance at the photosphere is σT⁴/π ≈ 2.0e7 W/m²/sr.
        let total = planck_energy_integral(1e-3, 5778.0);
        assert_relative_eq!(total, 2.0e7, max_relative = 0.02);
    }
}
