// grid/mod.rs
// Strided structured-grid storage shared by the field solvers and the object core.
//
// Axis 0 is the component axis (size 1 for scalar quantities); axes 1..=3 are
// spatial. Linear index = Σ coord[d] * size_prod[d].

pub mod decomposition;
pub mod ghost;

pub use decomposition::Decomposition;
pub use ghost::is_ghost;

use serde::{Deserialize, Serialize};

use crate::error::{PicError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    /// Array dimensionality including the component axis.
    pub rank: usize,
    pub size: Vec<usize>,
    pub true_size: Vec<usize>,
    /// `size_prod[0] = 1`, `size_prod[d] = size_prod[d-1] * size[d-1]`; `rank + 1` entries.
    pub size_prod: Vec<usize>,
    /// All "before" layers, then all "after" layers.
    pub n_ghost_layers: Vec<usize>,
}

impl GridShape {
    pub fn new(true_size: Vec<usize>, n_ghost_layers: Vec<usize>) -> Result<Self> {
        let rank = true_size.len();
        if n_ghost_layers.len() != 2 * rank {
            return Err(PicError::config(format!(
                "grid of rank {} needs {} ghost layer entries, got {}",
                rank,
                2 * rank,
                n_ghost_layers.len()
            )));
        }
        let size: Vec<usize> = (0..rank)
            .map(|d| true_size[d] + n_ghost_layers[d] + n_ghost_layers[rank + d])
            .collect();
        let mut size_prod = Vec::with_capacity(rank + 1);
        size_prod.push(1);
        for d in 0..rank {
            size_prod.push(size_prod[d] * size[d]);
        }
        Ok(Self {
            rank,
            size,
            true_size,
            size_prod,
            n_ghost_layers,
        })
    }

    /// Scalar 3-D grid. `ghosts` = [before x, y, z, after x, y, z].
    pub fn scalar(true_spatial: [usize; 3], ghosts: [usize; 6]) -> Result<Self> {
        Self::new(
            vec![1, true_spatial[0], true_spatial[1], true_spatial[2]],
            vec![0, ghosts[0], ghosts[1], ghosts[2], 0, ghosts[3], ghosts[4], ghosts[5]],
        )
    }

    pub fn len(&self) -> usize {
        self.size_prod[self.rank]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stride of spatial axis `axis` (0 = x).
    pub fn spatial_stride(&self, axis: usize) -> usize {
        self.size_prod[axis + 1]
    }

    pub fn spatial_size(&self) -> [usize; 3] {
        [self.size[1], self.size[2], self.size[3]]
    }

    pub fn spatial_true_size(&self) -> [usize; 3] {
        [self.true_size[1], self.true_size[2], self.true_size[3]]
    }

    pub fn ghosts_before(&self) -> [usize; 3] {
        [self.n_ghost_layers[1], self.n_ghost_layers[2], self.n_ghost_layers[3]]
    }

    pub fn node(&self, c: [usize; 3]) -> usize {
        c[0] * self.size_prod[1] + c[1] * self.size_prod[2] + c[2] * self.size_prod[3]
    }

    pub fn checked_node(&self, c: [isize; 3]) -> Option<usize> {
        let size = self.spatial_size();
        let mut idx = [0usize; 3];
        for d in 0..3 {
            if c[d] < 0 || c[d] as usize >= size[d] {
                return None;
            }
            idx[d] = c[d] as usize;
        }
        Some(self.node(idx))
    }

    pub fn coords(&self, node: usize) -> [usize; 3] {
        [
            (node / self.size_prod[1]) % self.size[1],
            (node / self.size_prod[2]) % self.size[2],
            node / self.size_prod[3],
        ]
    }

    /// Whether spatial coordinates fall inside the owned (non-ghost) block.
    pub fn is_true(&self, c: [usize; 3]) -> bool {
        let lo = self.ghosts_before();
        let ts = self.spatial_true_size();
        (0..3).all(|d| c[d] >= lo[d] && c[d] < lo[d] + ts[d])
    }

    /// Linear offsets of the 8 cells that share node `b` as a corner, in the
    /// order {0, -z, -x, -x-z, -y, -y-z, -y-x, -y-x-z}.
    pub fn cell_corners(&self) -> [isize; 8] {
        let x = self.size_prod[1] as isize;
        let y = self.size_prod[2] as isize;
        let z = self.size_prod[3] as isize;
        [0, -z, -x, -x - z, -y, -y - z, -y - x, -y - x - z]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub shape: GridShape,
    pub val: Vec<f64>,
}

impl Grid {
    pub fn zeros(shape: GridShape) -> Self {
        let val = vec![0.0; shape.len()];
        Self { shape, val }
    }

    pub fn zero(&mut self) {
        self.val.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn add_from(&mut self, other: &Grid) {
        for (a, b) in self.val.iter_mut().zip(&other.val) {
            *a += *b;
        }
    }

    /// Sum over the owned nodes only.
    pub fn true_sum(&self) -> f64 {
        self.val
            .iter()
            .enumerate()
            .filter(|(n, _)| self.shape.is_true(self.shape.coords(*n)))
            .map(|(_, v)| *v)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_prod_accumulates_full_extents() {
        let s = GridShape::scalar([4, 5, 6], [1, 1, 1, 1, 1, 1]).unwrap();
        assert_eq!(s.size, vec![1, 6, 7, 8]);
        assert_eq!(s.size_prod, vec![1, 1, 6, 42, 336]);
        assert_eq!(s.len(), 336);
    }

    #[test]
    fn node_and_coords_are_inverse() {
        let s = GridShape::scalar([4, 5, 6], [1, 1, 1, 1, 1, 1]).unwrap();
        let c = [3, 2, 5];
        assert_eq!(s.coords(s.node(c)), c);
        assert_eq!(s.checked_node([-1, 0, 0]), None);
        assert_eq!(s.checked_node([5, 6, 7]), Some(s.node([5, 6, 7])));
        assert_eq!(s.checked_node([6, 0, 0]), None);
    }

    #[test]
    fn corners_point_backwards() {
        let s = GridShape::scalar([4, 4, 4], [1, 1, 1, 1, 1, 1]).unwrap();
        let b = s.node([3, 3, 3]) as isize;
        let corners: Vec<[usize; 3]> = s
            .cell_corners()
            .iter()
            .map(|o| s.coords((b + o) as usize))
            .collect();
        assert_eq!(corners[0], [3, 3, 3]);
        assert_eq!(corners[1], [3, 3, 2]);
        assert_eq!(corners[2], [2, 3, 3]);
        assert_eq!(corners[7], [2, 2, 2]);
    }

    #[test]
    fn ghost_layer_count_is_checked() {
        assert!(GridShape::new(vec![1, 2, 3], vec![0, 1]).is_err());
    }
}
