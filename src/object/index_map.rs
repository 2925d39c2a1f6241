// object/index_map.rs
// Global numbering of surface nodes: rank-ordered concatenation of each rank's
// local surface table.

use std::ops::Range;

use smallvec::SmallVec;

use super::lookup::LookupTable;
use crate::comm::Communicator;
use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceIndexMap {
    world: usize,
    /// `world + 1` cumulative counts per object.
    offsets: Vec<usize>,
}

impl SurfaceIndexMap {
    /// One all-gather per object, issued in object order on every rank.
    pub fn gather(surface: &LookupTable, comm: &dyn Communicator) -> Result<Self> {
        let world = comm.size();
        let n_objects = surface.n_buckets();
        let mut offsets = Vec::with_capacity(n_objects * (world + 1));
        for a in 0..n_objects {
            let counts = comm.all_gather_usize(surface.count(a))?;
            let mut row: SmallVec<[usize; 9]> = SmallVec::with_capacity(world + 1);
            row.push(0);
            for c in counts {
                let last = row[row.len() - 1];
                row.push(last + c);
            }
            offsets.extend_from_slice(&row);
        }
        Ok(Self { world, offsets })
    }

    pub fn n_objects(&self) -> usize {
        self.offsets.len() / (self.world + 1)
    }

    pub fn row(&self, a: usize) -> &[usize] {
        let w = self.world + 1;
        &self.offsets[a * w..(a + 1) * w]
    }

    /// Global surface-node count `N` of object `a`.
    pub fn total(&self, a: usize) -> usize {
        self.row(a)[self.world]
    }

    /// Global indices owned by `rank` for object `a`.
    pub fn range(&self, a: usize, rank: usize) -> Range<usize> {
        let row = self.row(a);
        row[rank]..row[rank + 1]
    }

    /// Rank whose range holds global index `i`; ranks with empty ranges never own.
    pub fn owner_of(&self, a: usize, i: usize) -> Option<usize> {
        (0..self.world).find(|&r| self.range(a, r).contains(&i))
    }

    /// Entries needed to store every object's dense `N x N` matrix.
    pub fn dense_storage(&self) -> usize {
        (0..self.n_objects()).map(|a| self.total(a) * self.total(a)).sum()
    }

    pub fn max_total(&self) -> usize {
        (0..self.n_objects()).map(|a| self.total(a)).max().unwrap_or(0)
    }
}
