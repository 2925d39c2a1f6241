// comm/mod.rs
// Communication context handed to every component that issues collectives.
//
// Every rank must issue the same collectives in the same order. The in-process
// group (`local`) checks this and fails loudly instead of deadlocking.

pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi;

pub use local::{LocalComm, LocalGroup};
#[cfg(feature = "mpi")]
pub use self::mpi::MpiComm;

use crate::error::Result;

/// Blocking collective operations over a fixed group of ranks.
pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Every rank contributes one value; all ranks receive them in rank order.
    fn all_gather_usize(&self, value: usize) -> Result<Vec<usize>>;

    /// Variable-length gather. The result is the rank-ordered concatenation.
    fn all_gather_f64(&self, values: &[f64]) -> Result<Vec<f64>>;

    /// Element-wise sum across ranks, in place.
    fn all_reduce_sum(&self, buf: &mut [f64]) -> Result<()>;

    fn all_reduce_sum_usize(&self, value: usize) -> Result<usize>;

    fn all_reduce_max_usize(&self, value: usize) -> Result<usize>;

    /// Terminate the whole job. Never returns.
    fn abort(&self, code: i32) -> !;

    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    fn all_reduce_sum_scalar(&self, value: f64) -> Result<f64> {
        let mut buf = [value];
        self.all_reduce_sum(&mut buf)?;
        Ok(buf[0])
    }
}

/// Group of one. Used for serial runs and unit tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleRank;

impl Communicator for SingleRank {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather_usize(&self, value: usize) -> Result<Vec<usize>> {
        Ok(vec![value])
    }

    fn all_gather_f64(&self, values: &[f64]) -> Result<Vec<f64>> {
        Ok(values.to_vec())
    }

    fn all_reduce_sum(&self, _buf: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn all_reduce_sum_usize(&self, value: usize) -> Result<usize> {
        Ok(value)
    }

    fn all_reduce_max_usize(&self, value: usize) -> Result<usize> {
        Ok(value)
    }

    fn abort(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}
