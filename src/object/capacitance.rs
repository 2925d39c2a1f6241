// object/capacitance.rs
// Dense capacitance matrices: build by unit-charge probing, apply as a charge correction.

use log::{debug, info};
use nalgebra::DMatrix;

use super::ObjectSet;
use crate::comm::Communicator;
use crate::error::{PicError, Result};
use crate::grid::Grid;
use crate::profile_scope;
use crate::solver::PotentialSolver;

/// Inverse of an object's induced-potential matrix.
#[derive(Clone, Debug)]
pub struct CapacitanceMatrix {
    pub dim: usize,
    /// `inverse[(j, i)]`: row `j`, column `i`, both global surface indices.
    pub inverse: DMatrix<f64>,
    /// `1 / Σ inverse`.
    pub inv_total: f64,
}

impl CapacitanceMatrix {
    /// LU with partial pivoting. Fails on an empty, singular or numerically
    /// singular matrix, or on a non-finite or zero total.
    pub fn invert(object: usize, potential: DMatrix<f64>) -> Result<Self> {
        let dim = potential.nrows();
        let singular = |reason: String| PicError::SingularCapacitance { object, dim, reason };
        if dim == 0 {
            return Err(singular("object has no surface nodes".to_string()));
        }

        let lu = potential.lu();
        let pivots = lu.u().diagonal();
        let largest = pivots.iter().fold(0.0f64, |m, p| m.max(p.abs()));
        let smallest = pivots.iter().fold(f64::INFINITY, |m, p| m.min(p.abs()));
        if !(largest > 0.0) || smallest / largest < f64::EPSILON * dim as f64 {
            return Err(singular(format!("pivot ratio {:e}", smallest / largest)));
        }
        let inverse = lu
            .try_inverse()
            .ok_or_else(|| singular("LU factor is not invertible".to_string()))?;
        if inverse.iter().any(|v| !v.is_finite()) {
            return Err(singular("inverse has non-finite entries".to_string()));
        }
        let total = inverse.sum();
        if !total.is_finite() || total == 0.0 {
            return Err(singular(format!("inverse sums to {total}")));
        }
        Ok(Self {
            dim,
            inverse,
            inv_total: 1.0 / total,
        })
    }
}

impl ObjectSet {
    /// Potential at every global surface node of `a` produced by a unit charge
    /// at each of them: `m[(k, i)]` is the response at `k` to a charge at `i`.
    /// Every rank runs exactly `N` solves.
    pub fn assemble_potential_matrix(
        &self,
        a: usize,
        solver: &mut dyn PotentialSolver,
        comm: &dyn Communicator,
    ) -> Result<DMatrix<f64>> {
        profile_scope!("capacitance_assemble");
        let n = self.index_map.total(a);
        let rank = comm.rank();
        let own = self.index_map.range(a, rank);
        let nodes = self.surface.bucket(a);

        let mut m = DMatrix::<f64>::zeros(n, n);
        let mut rho = Grid::zeros(self.domain.shape.clone());
        let mut phi = Grid::zeros(self.domain.shape.clone());

        for i in 0..n {
            let probe = match self.index_map.owner_of(a, i) {
                Some(owner) if owner == rank => Some(nodes[i - own.start]),
                _ => None,
            };
            if let Some(node) = probe {
                rho.val[node] = 1.0;
            }
            solver.solve(&rho, &mut phi, comm)?;
            if let Some(node) = probe {
                rho.val[node] = 0.0;
            }
            for (k, &node) in nodes.iter().enumerate() {
                m[(own.start + k, i)] = phi.val[node];
            }
        }

        comm.all_reduce_sum(m.as_mut_slice())?;
        Ok(m)
    }

    /// Builds and inverts the matrix of every object. Collective.
    pub fn compute_capacitance_matrices(
        &mut self,
        solver: &mut dyn PotentialSolver,
        comm: &dyn Communicator,
    ) -> Result<()> {
        profile_scope!("capacitance");
        self.capacitance.clear();
        for a in 0..self.n_objects {
            let m = self.assemble_potential_matrix(a, solver, comm)?;
            let cap = CapacitanceMatrix::invert(a, m)?;
            if comm.is_root() {
                info!(
                    "object {}: {}x{} capacitance matrix, 1/sum = {:e}",
                    a, cap.dim, cap.dim, cap.inv_total
                );
            }
            self.capacitance.push(cap);
        }
        Ok(())
    }

    /// Adds to `rho` the surface charge that makes every object an
    /// equipotential, given `phi` solved from `rho`. Returns the floating
    /// potential of each object. The caller solves again afterwards.
    pub fn apply_capacitance_matrix(
        &mut self,
        rho: &mut Grid,
        phi: &Grid,
        comm: &dyn Communicator,
    ) -> Result<Vec<f64>> {
        profile_scope!("capacitance_apply");
        if !self.has_capacitance() {
            return Err(PicError::config(
                "capacitance matrices must be computed before they are applied",
            ));
        }
        let rank = comm.rank();
        let mut potentials = Vec::with_capacity(self.n_objects);

        for a in 0..self.n_objects {
            let cap = &self.capacitance[a];
            let c = &cap.inverse;
            let n = cap.dim;
            let own = self.index_map.range(a, rank);
            let nodes = self.surface.bucket(a);

            let mut weighted = 0.0;
            for i in 0..n {
                for (k, &node) in nodes.iter().enumerate() {
                    weighted += c[(own.start + k, i)] * phi.val[node];
                }
            }
            let phi_c = comm.all_reduce_sum_scalar(cap.inv_total * weighted)?;

            let delta_phi = &mut self.delta_phi[..n];
            delta_phi.iter_mut().for_each(|v| *v = 0.0);
            for (k, &node) in nodes.iter().enumerate() {
                delta_phi[own.start + k] = phi_c - phi.val[node];
            }
            comm.all_reduce_sum(delta_phi)?;

            let rho_corr = &mut self.rho_corr[..n];
            rho_corr.iter_mut().for_each(|v| *v = 0.0);
            for (i, corr) in rho_corr.iter_mut().enumerate() {
                for j in own.clone() {
                    *corr += c[(j, i)] * delta_phi[j];
                }
            }
            comm.all_reduce_sum(rho_corr)?;

            for (k, &node) in nodes.iter().enumerate() {
                rho.val[node] += rho_corr[own.start + k];
            }

            if comm.is_root() {
                debug!("object {}: floating potential {:e}", a, phi_c);
            }
            potentials.push(phi_c);
        }
        Ok(potentials)
    }
}
