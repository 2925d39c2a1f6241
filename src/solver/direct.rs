// solver/direct.rs
// Free-space Green's function summation over all charged owned nodes.

use rayon::prelude::*;
use std::f64::consts::PI;

use super::PotentialSolver;
use crate::comm::Communicator;
use crate::error::Result;
use crate::grid::{Decomposition, Grid};
use crate::profile_scope;

/// Potential at the centre of a unit cube of unit charge density, times 4π.
/// Exceeds the rock-salt Madelung constant (1.7476), so the kernel matrix on
/// any node set is positive definite.
pub const CELL_SELF_POTENTIAL: f64 = 2.380_077_8;

pub fn green(d2: f64) -> f64 {
    if d2 == 0.0 {
        CELL_SELF_POTENTIAL / (4.0 * PI)
    } else {
        1.0 / (4.0 * PI * d2.sqrt())
    }
}

/// Exact and symmetric: the potential at every node is the same ordered sum
/// on every rank.
pub struct DirectSolver {
    decomposition: Decomposition,
    rank: usize,
    // x, y, z, q per charged node, all ranks
    charges: Vec<f64>,
}

impl DirectSolver {
    pub fn new(decomposition: Decomposition, rank: usize) -> Self {
        Self {
            decomposition,
            rank,
            charges: Vec::new(),
        }
    }

    fn local_charges(&self, rho: &Grid) -> Vec<f64> {
        let mut out = Vec::new();
        for (node, &q) in rho.val.iter().enumerate() {
            if q == 0.0 {
                continue;
            }
            let c = rho.shape.coords(node);
            if !rho.shape.is_true(c) {
                continue;
            }
            let g = self.decomposition.to_global(self.rank, c);
            out.extend_from_slice(&[g[0] as f64, g[1] as f64, g[2] as f64, q]);
        }
        out
    }
}

impl PotentialSolver for DirectSolver {
    fn solve(&mut self, rho: &Grid, phi: &mut Grid, comm: &dyn Communicator) -> Result<()> {
        profile_scope!("direct_solve");
        let mine = self.local_charges(rho);
        self.charges = comm.all_gather_f64(&mine)?;

        let charges = &self.charges;
        let shape = &rho.shape;
        let decomposition = &self.decomposition;
        let rank = self.rank;
        phi.val.par_iter_mut().enumerate().for_each(|(node, p)| {
            let g = decomposition.to_global(rank, shape.coords(node));
            let (x, y, z) = (g[0] as f64, g[1] as f64, g[2] as f64);
            *p = charges
                .chunks_exact(4)
                .map(|c| {
                    let dx = x - c[0];
                    let dy = y - c[1];
                    let dz = z - c[2];
                    c[3] * green(dx * dx + dy * dy + dz * dz)
                })
                .sum();
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{LocalGroup, SingleRank};
    use approx::assert_relative_eq;

    #[test]
    fn response_is_symmetric() {
        let dec = Decomposition::new([6, 6, 6], [1, 1, 1], [1; 6]).unwrap();
        let mut solver = DirectSolver::new(dec.clone(), 0);
        let shape = dec.shape().unwrap();
        let a = shape.node([2, 3, 4]);
        let b = shape.node([5, 1, 2]);

        let mut rho = Grid::zeros(shape.clone());
        let mut phi = Grid::zeros(shape);
        rho.val[a] = 1.0;
        solver.solve(&rho, &mut phi, &SingleRank).unwrap();
        let ab = phi.val[b];
        rho.val[a] = 0.0;
        rho.val[b] = 1.0;
        solver.solve(&rho, &mut phi, &SingleRank).unwrap();
        assert_eq!(ab, phi.val[a]);
        assert_relative_eq!(phi.val[b], CELL_SELF_POTENTIAL / (4.0 * PI));
    }

    #[test]
    fn ghost_charges_are_ignored() {
        let dec = Decomposition::new([4, 4, 4], [1, 1, 1], [1; 6]).unwrap();
        let mut solver = DirectSolver::new(dec.clone(), 0);
        let mut rho = Grid::zeros(dec.shape().unwrap());
        let mut phi = rho.clone();
        rho.val[0] = 5.0;
        solver.solve(&rho, &mut phi, &SingleRank).unwrap();
        assert!(phi.val.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn split_domain_matches_single_domain() {
        let whole = Decomposition::new([4, 2, 2], [1, 1, 1], [1; 6]).unwrap();
        let mut serial = DirectSolver::new(whole.clone(), 0);
        let mut rho = Grid::zeros(whole.shape().unwrap());
        let mut phi = rho.clone();
        let src = rho.shape.node([4, 1, 2]);
        rho.val[src] = 2.0;
        serial.solve(&rho, &mut phi, &SingleRank).unwrap();
        let at_origin = phi.val[phi.shape.node([1, 1, 1])];

        let split = Decomposition::new([4, 2, 2], [2, 1, 1], [1; 6]).unwrap();
        let seen = LocalGroup::run(2, |comm| {
            let mut solver = DirectSolver::new(split.clone(), comm.rank());
            let mut rho = Grid::zeros(split.shape()?);
            let mut phi = rho.clone();
            if comm.rank() == 1 {
                // Global (3, 0, 1) is local (2, 1, 2) on the right block.
                let n = rho.shape.node([2, 1, 2]);
                rho.val[n] = 2.0;
            }
            solver.solve(&rho, &mut phi, comm)?;
            Ok(phi.val[phi.shape.node([1, 1, 1])])
        })
        .unwrap();
        assert_eq!(seen[0], at_origin);
    }
}
