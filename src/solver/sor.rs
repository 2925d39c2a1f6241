// solver/sor.rs
// Red-black SOR for a single subdomain with φ = 0 on the ghost layer.

use rayon::prelude::*;

use super::PotentialSolver;
use crate::comm::Communicator;
use crate::error::{PicError, Result};
use crate::grid::Grid;
use crate::profile_scope;

pub struct SorSolver {
    omega: f64,
    tolerance: f64,
    max_iterations: usize,
    tmp: Vec<f64>,
}

impl SorSolver {
    pub fn new(omega: f64, tolerance: f64, max_iterations: usize, comm: &dyn Communicator) -> Result<Self> {
        if comm.size() > 1 {
            return Err(PicError::config(
                "the sor solver runs on a single subdomain; use methods.poisson = \"direct\"",
            ));
        }
        if !(omega > 0.0 && omega < 2.0) {
            return Err(PicError::config(format!("sor relaxation factor {omega} outside (0, 2)")));
        }
        Ok(Self {
            omega,
            tolerance,
            max_iterations,
            tmp: Vec::new(),
        })
    }

    /// Max-norm of ∇²φ + ρ over the owned nodes.
    fn residual(rho: &Grid, phi: &Grid) -> f64 {
        let shape = &rho.shape;
        let [nx, ny, _] = shape.spatial_size();
        let plane = nx * ny;
        (0..phi.val.len())
            .into_par_iter()
            .filter(|&id| shape.is_true(shape.coords(id)))
            .map(|id| {
                let p = &phi.val;
                let lap = p[id - 1] + p[id + 1] + p[id - nx] + p[id + nx] + p[id - plane] + p[id + plane]
                    - 6.0 * p[id];
                (lap + rho.val[id]).abs()
            })
            .reduce(|| 0.0, f64::max)
    }

    fn sweep(&mut self, rho: &Grid, phi: &mut Grid, color: usize) {
        let shape = &rho.shape;
        let [nx, ny, _] = shape.spatial_size();
        let plane = nx * ny;
        let omega = self.omega;

        let phi_ro: &[f64] = &phi.val;
        self.tmp.clear();
        self.tmp.extend_from_slice(phi_ro);
        self.tmp.par_chunks_mut(nx).enumerate().for_each(|(row_idx, tmp_row)| {
            let j = row_idx % ny;
            let k = row_idx / ny;
            let base = row_idx * nx;
            for (i, slot) in tmp_row.iter_mut().enumerate() {
                if ((i + j + k) & 1) != color || !shape.is_true([i, j, k]) {
                    continue;
                }
                let id = base + i;
                let off = phi_ro[id - 1]
                    + phi_ro[id + 1]
                    + phi_ro[id - nx]
                    + phi_ro[id + nx]
                    + phi_ro[id - plane]
                    + phi_ro[id + plane];
                let phi_new = (off + rho.val[id]) / 6.0;
                let phi_old = phi_ro[id];
                *slot = phi_old + omega * (phi_new - phi_old);
            }
        });
        phi.val.copy_from_slice(&self.tmp);
    }
}

impl PotentialSolver for SorSolver {
    fn solve(&mut self, rho: &Grid, phi: &mut Grid, _comm: &dyn Communicator) -> Result<()> {
        profile_scope!("sor_solve");
        phi.zero();
        let scale = (0..rho.val.len())
            .filter(|&n| rho.shape.is_true(rho.shape.coords(n)))
            .map(|n| rho.val[n].abs())
            .fold(0.0, f64::max);
        if scale == 0.0 {
            return Ok(());
        }

        let mut residual = f64::INFINITY;
        for _ in 0..self.max_iterations {
            self.sweep(rho, phi, 0);
            self.sweep(rho, phi, 1);
            residual = Self::residual(rho, phi) / scale;
            if residual <= self.tolerance {
                return Ok(());
            }
        }
        Err(PicError::SolverDiverged {
            iterations: self.max_iterations,
            residual,
        })
    }

    fn name(&self) -> &'static str {
        "sor"
    }
}
