// object/collect.rs
// Absorption of particles that enter an object and uniform redistribution of
// their charge over its surface.

use log::{info, warn};

use super::ObjectSet;
use crate::comm::Communicator;
use crate::error::Result;
use crate::grid::Grid;
use crate::population::Population;
use crate::profile_scope;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectReport {
    /// Particles removed on this rank.
    pub absorbed_local: usize,
    /// Particles removed on all ranks.
    pub absorbed_global: usize,
    /// Charge collected by each object this step, summed over ranks.
    pub charge: Vec<f64>,
}

impl ObjectSet {
    /// Removes every particle whose cell lies inside an object and spreads the
    /// collected charge evenly over that object's global surface nodes in
    /// `rho_obj`. Collective.
    pub fn collect_object_charge(
        &self,
        pop: &mut Population,
        rho_obj: &mut Grid,
        comm: &dyn Communicator,
    ) -> Result<CollectReport> {
        profile_scope!("collect_object_charge");
        let shape = &self.domain.shape;
        let mut counter = vec![0.0; self.n_objects];
        let mut cut = 0usize;

        for s in 0..pop.n_species() {
            let mut i = pop.i_start[s];
            while i < pop.i_stop[s] {
                let p = pop.position(i);
                let cell = shape.checked_node([p[0] as isize, p[1] as isize, p[2] as isize]);
                match cell.and_then(|c| self.object_at(c)) {
                    Some(a) => {
                        counter[a] += pop.charge[s];
                        // The last particle now sits in slot i and is examined next.
                        pop.cut(s, i);
                        cut += 1;
                    }
                    None => i += 1,
                }
            }
        }

        let absorbed_global = comm.all_reduce_sum_usize(cut)?;
        comm.all_reduce_sum(&mut counter)?;
        if comm.is_root() {
            info!("objects absorbed {} particle(s)", absorbed_global);
        }

        for a in 0..self.n_objects {
            if counter[a] != 0.0 && self.index_map.total(a) == 0 {
                warn!("object {} collected charge {:e} but has no surface nodes", a, counter[a]);
            }
            let share = counter[a] * self.inv_nr_surf_nod[a];
            for &node in self.surface.bucket(a) {
                rho_obj.val[node] += share;
            }
        }

        Ok(CollectReport {
            absorbed_local: cut,
            absorbed_global,
            charge: counter,
        })
    }
}
