// solver/mod.rs
// Poisson solvers for ∇²φ = -ρ on the decomposed grid (grid units, ε0 = 1).

pub mod direct;
pub mod sor;

pub use direct::DirectSolver;
pub use sor::SorSolver;

use serde::{Deserialize, Serialize};

use crate::comm::Communicator;
use crate::config::SimConfig;
use crate::error::Result;
use crate::grid::{Decomposition, Grid};

/// Linear solve `rho -> phi`. The same input must give the same output on
/// every call, and every rank must call it together.
pub trait PotentialSolver {
    fn solve(&mut self, rho: &Grid, phi: &mut Grid, comm: &dyn Communicator) -> Result<()>;

    fn name(&self) -> &'static str;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoissonMethod {
    #[default]
    Direct,
    Sor,
}

/// Builds the solver named by `methods.poisson`.
pub fn from_config(
    config: &SimConfig,
    decomposition: &Decomposition,
    comm: &dyn Communicator,
) -> Result<Box<dyn PotentialSolver>> {
    match config.methods.poisson {
        PoissonMethod::Direct => Ok(Box::new(DirectSolver::new(decomposition.clone(), comm.rank()))),
        PoissonMethod::Sor => Ok(Box::new(SorSolver::new(
            config.solver.omega,
            config.solver.tolerance,
            config.solver.max_iterations,
            comm,
        )?)),
    }
}
