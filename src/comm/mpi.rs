// comm/mpi.rs
// Multi-process communicator over MPI (feature "mpi").

use mpi::collective::SystemOperation;
use mpi::datatype::PartitionMut;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

use super::Communicator;
use crate::error::{PicError, Result};

pub struct MpiComm {
    // Finalises MPI on drop; must outlive `world`.
    _universe: Universe,
    world: SimpleCommunicator,
}

impl MpiComm {
    pub fn init() -> Result<Self> {
        let universe =
            mpi::initialize().ok_or_else(|| PicError::config("MPI was already initialised"))?;
        let world = universe.world();
        Ok(Self {
            _universe: universe,
            world,
        })
    }

    fn to_count(n: usize) -> Result<Count> {
        Count::try_from(n).map_err(|_| PicError::config(format!("message of {n} values is too large for MPI")))
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn all_gather_usize(&self, value: usize) -> Result<Vec<usize>> {
        let mine = value as u64;
        let mut out = vec![0u64; self.size()];
        self.world.all_gather_into(&mine, &mut out[..]);
        Ok(out.into_iter().map(|v| v as usize).collect())
    }

    fn all_gather_f64(&self, values: &[f64]) -> Result<Vec<f64>> {
        let lengths = self.all_gather_usize(values.len())?;
        let counts = lengths
            .iter()
            .map(|&n| Self::to_count(n))
            .collect::<Result<Vec<Count>>>()?;
        let displs: Vec<Count> = counts
            .iter()
            .scan(0, |acc, &c| {
                let d = *acc;
                *acc += c;
                Some(d)
            })
            .collect();
        let mut out = vec![0.0f64; lengths.iter().sum()];
        {
            let mut partition = PartitionMut::new(&mut out[..], counts, &displs[..]);
            self.world.all_gather_varcount_into(values, &mut partition);
        }
        Ok(out)
    }

    fn all_reduce_sum(&self, buf: &mut [f64]) -> Result<()> {
        let send = buf.to_vec();
        self.world
            .all_reduce_into(&send[..], buf, SystemOperation::sum());
        Ok(())
    }

    fn all_reduce_sum_usize(&self, value: usize) -> Result<usize> {
        let mut out = 0u64;
        self.world
            .all_reduce_into(&(value as u64), &mut out, SystemOperation::sum());
        Ok(out as usize)
    }

    fn all_reduce_max_usize(&self, value: usize) -> Result<usize> {
        let mut out = 0u64;
        self.world
            .all_reduce_into(&(value as u64), &mut out, SystemOperation::max());
        Ok(out as usize)
    }

    fn abort(&self, code: i32) -> ! {
        self.world.abort(code)
    }
}
