// grid/decomposition.rs
// Block decomposition of the global true grid over ranks.

use super::{Grid, GridShape};
use crate::error::{PicError, Result};
use crate::io::MaskDataset;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decomposition {
    pub global_true: [usize; 3],
    pub n_subdomains: [usize; 3],
    /// [before x, y, z, after x, y, z]
    pub ghosts: [usize; 6],
}

impl Decomposition {
    pub fn new(global_true: [usize; 3], n_subdomains: [usize; 3], ghosts: [usize; 6]) -> Result<Self> {
        for d in 0..3 {
            if n_subdomains[d] == 0 || global_true[d] % n_subdomains[d] != 0 {
                return Err(PicError::config(format!(
                    "axis {} of length {} cannot be split into {} subdomains",
                    d, global_true[d], n_subdomains[d]
                )));
            }
        }
        Ok(Self {
            global_true,
            n_subdomains,
            ghosts,
        })
    }

    pub fn n_ranks(&self) -> usize {
        self.n_subdomains.iter().product()
    }

    pub fn check_world(&self, world_size: usize) -> Result<()> {
        if self.n_ranks() != world_size {
            return Err(PicError::config(format!(
                "{:?} subdomains need {} ranks, running on {}",
                self.n_subdomains,
                self.n_ranks(),
                world_size
            )));
        }
        Ok(())
    }

    /// Subdomain coordinates of `rank`, x varying fastest.
    pub fn subdomain_of(&self, rank: usize) -> [usize; 3] {
        let [n0, n1, _] = self.n_subdomains;
        [rank % n0, (rank / n0) % n1, rank / (n0 * n1)]
    }

    pub fn local_true(&self) -> [usize; 3] {
        [
            self.global_true[0] / self.n_subdomains[0],
            self.global_true[1] / self.n_subdomains[1],
            self.global_true[2] / self.n_subdomains[2],
        ]
    }

    /// Global coordinate of the first owned node of `rank`.
    pub fn offset(&self, rank: usize) -> [usize; 3] {
        let sub = self.subdomain_of(rank);
        let lt = self.local_true();
        [sub[0] * lt[0], sub[1] * lt[1], sub[2] * lt[2]]
    }

    pub fn shape(&self) -> Result<GridShape> {
        GridShape::scalar(self.local_true(), self.ghosts)
    }

    /// Global coordinates of a local array node of `rank` (may be outside the domain).
    pub fn to_global(&self, rank: usize, local: [usize; 3]) -> [isize; 3] {
        let off = self.offset(rank);
        [
            off[0] as isize + local[0] as isize - self.ghosts[0] as isize,
            off[1] as isize + local[1] as isize - self.ghosts[1] as isize,
            off[2] as isize + local[2] as isize - self.ghosts[2] as isize,
        ]
    }

    /// Reads the owned block of `rank` plus its halo from the global mask.
    /// Halo nodes beyond the global domain are vacuum.
    pub fn extract_mask(&self, rank: usize, dataset: &MaskDataset) -> Result<Grid> {
        if dataset.size != self.global_true {
            return Err(PicError::config(format!(
                "mask dataset has shape {:?}, grid expects {:?}",
                dataset.size, self.global_true
            )));
        }
        let mut grid = Grid::zeros(self.shape()?);
        for node in 0..grid.val.len() {
            let local = grid.shape.coords(node);
            grid.val[node] = dataset.value_at(self.to_global(rank, local));
        }
        Ok(grid)
    }
}
