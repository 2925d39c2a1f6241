// object/mod.rs
// Contains ObjectSet: immersed objects coupled to the field solve by the
// capacitance-matrix method.
//
// Built once from the mask; afterwards only the scratch buffers and the
// photoemission fluxes change.

pub mod capacitance;
pub mod collect;
pub mod index_map;
pub mod lookup;
pub mod radiance;

#[cfg(test)]
mod tests;

pub use capacitance::CapacitanceMatrix;
pub use collect::CollectReport;
pub use index_map::SurfaceIndexMap;
pub use lookup::LookupTable;

use std::collections::HashMap;

use log::info;

use crate::comm::Communicator;
use crate::config::SimConfig;
use crate::error::{PicError, Result};
use crate::grid::{Decomposition, Grid};
use crate::io::{self, MaskDataset};

pub struct ObjectSet {
    /// Global number of objects (max id over all ranks).
    pub n_objects: usize,
    /// Owned mask including halo.
    pub domain: Grid,
    pub interior: LookupTable,
    pub surface: LookupTable,
    pub exposed: LookupTable,
    pub index_map: SurfaceIndexMap,
    /// One per object once `compute_capacitance_matrices` has run.
    pub capacitance: Vec<CapacitanceMatrix>,
    pub inv_nr_surf_nod: Vec<f64>,
    /// Work function per object as a cutoff wavenumber (cm⁻¹).
    pub work_function: Vec<f64>,
    /// Sunlit area per object (m²).
    pub conducting_surface: Vec<f64>,
    /// Photons per timestep above the work function.
    pub radiance: Vec<f64>,
    /// Joules per timestep above the work function.
    pub band_energy: Vec<f64>,
    interior_owner: HashMap<usize, usize>,
    delta_phi: Vec<f64>,
    rho_corr: Vec<f64>,
}

impl ObjectSet {
    /// Builds every lookup table and the global surface numbering. Collective.
    pub fn new(domain: Grid, comm: &dyn Communicator) -> Result<Self> {
        let local_max = domain
            .val
            .iter()
            .filter_map(|&v| lookup::object_of(v))
            .max()
            .map_or(0, |a| a + 1);
        let n_objects = comm.all_reduce_max_usize(local_max)?;

        let interior = lookup::interior(&domain, n_objects)?;
        let surface = lookup::surface(&domain, n_objects)?;
        let exposed = lookup::exposed(&domain, &surface, n_objects)?;
        let index_map = SurfaceIndexMap::gather(&surface, comm)?;

        let inv_nr_surf_nod = (0..n_objects)
            .map(|a| match index_map.total(a) {
                0 => 0.0,
                n => 1.0 / n as f64,
            })
            .collect();

        let mut interior_owner = HashMap::with_capacity(interior.len());
        for a in 0..n_objects {
            for &node in interior.bucket(a) {
                interior_owner.insert(node, a);
            }
        }

        let scratch = index_map.max_total();
        if comm.is_root() {
            info!("found {} object(s)", n_objects);
            for a in 0..n_objects {
                info!("object {}: {} surface nodes", a, index_map.total(a));
            }
            info!(
                "capacitance storage: {} values ({:.1} MiB)",
                index_map.dense_storage(),
                (index_map.dense_storage() * std::mem::size_of::<f64>()) as f64 / (1024.0 * 1024.0)
            );
        }

        Ok(Self {
            n_objects,
            domain,
            interior,
            surface,
            exposed,
            index_map,
            capacitance: Vec::with_capacity(n_objects),
            inv_nr_surf_nod,
            work_function: vec![0.0; n_objects],
            conducting_surface: vec![0.0; n_objects],
            radiance: vec![0.0; n_objects],
            band_energy: vec![0.0; n_objects],
            interior_owner,
            delta_phi: vec![0.0; scratch],
            rho_corr: vec![0.0; scratch],
        })
    }

    /// Loads the mask named by the config (vacuum without one), extracts this
    /// rank's block and builds the set.
    pub fn from_config(config: &SimConfig, decomposition: &Decomposition, comm: &dyn Communicator) -> Result<Self> {
        let mask = match &config.objects.mask_file {
            Some(path) => io::load_mask(config.resolve(path))?,
            None => MaskDataset::vacuum(decomposition.global_true),
        };
        let domain = decomposition.extract_mask(comm.rank(), &mask)?;
        let mut objects = Self::new(domain, comm)?;
        if config.objects.photoemission {
            objects.set_materials(&config.objects.work_function, &config.objects.conducting_surface)?;
        }
        Ok(objects)
    }

    pub fn set_materials(&mut self, work_function: &[f64], conducting_surface: &[f64]) -> Result<()> {
        if work_function.len() != self.n_objects || conducting_surface.len() != self.n_objects {
            return Err(PicError::config(format!(
                "{} object(s) in the mask, but {} work function(s) and {} conducting surface(s)",
                self.n_objects,
                work_function.len(),
                conducting_surface.len()
            )));
        }
        self.work_function = work_function.to_vec();
        self.conducting_surface = conducting_surface.to_vec();
        Ok(())
    }

    /// Object whose interior contains mask cell `node`, ghost cells included.
    pub fn object_at(&self, node: usize) -> Option<usize> {
        self.interior_owner.get(&node).copied()
    }

    /// Pins `grid` to `value` on the local surface nodes of object `a`.
    pub fn set_surface_values(&self, grid: &mut Grid, a: usize, value: f64) {
        for &node in self.surface.bucket(a) {
            grid.val[node] = value;
        }
    }

    pub fn has_capacitance(&self) -> bool {
        self.capacitance.len() == self.n_objects
    }
}
