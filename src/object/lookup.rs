// object/lookup.rs
// Bucketed CSR node tables: one bucket per object.

use std::collections::HashSet;

use crate::error::{PicError, Result};
use crate::grid::{is_ghost, Grid};

/// `nodes[offsets[a]..offsets[a + 1]]` are the nodes of bucket `a`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LookupTable {
    pub nodes: Vec<usize>,
    pub offsets: Vec<usize>,
}

impl LookupTable {
    /// Two passes over `items` for every bucket: the first counts the items
    /// `select` accepts, the second writes the node it returns. Both passes
    /// must see the same membership.
    pub fn build<I, F>(table: &'static str, n_buckets: usize, items: I, mut select: F) -> Result<Self>
    where
        I: IntoIterator + Clone,
        F: FnMut(usize, I::Item) -> Option<usize>,
    {
        let mut offsets = vec![0usize; n_buckets + 1];
        for a in 0..n_buckets {
            offsets[a + 1] = items.clone().into_iter().filter_map(|it| select(a, it)).count();
        }
        for a in 0..n_buckets {
            offsets[a + 1] += offsets[a];
        }

        let mut nodes = vec![0usize; offsets[n_buckets]];
        for a in 0..n_buckets {
            let mut cursor = offsets[a];
            for it in items.clone() {
                if let Some(node) = select(a, it) {
                    if cursor == offsets[a + 1] {
                        return Err(PicError::LookupInvariant {
                            table,
                            bucket: a,
                            counted: offsets[a + 1] - offsets[a],
                            filled: cursor - offsets[a] + 1,
                        });
                    }
                    nodes[cursor] = node;
                    cursor += 1;
                }
            }
            if cursor != offsets[a + 1] {
                return Err(PicError::LookupInvariant {
                    table,
                    bucket: a,
                    counted: offsets[a + 1] - offsets[a],
                    filled: cursor - offsets[a],
                });
            }
        }
        Ok(Self { nodes, offsets })
    }

    pub fn n_buckets(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn bucket(&self, a: usize) -> &[usize] {
        &self.nodes[self.offsets[a]..self.offsets[a + 1]]
    }

    pub fn count(&self, a: usize) -> usize {
        self.offsets[a + 1] - self.offsets[a]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Mask value rounded to the object index it encodes, if any.
pub fn object_of(value: f64) -> Option<usize> {
    if value > 0.5 {
        Some((value + 0.5) as usize - 1)
    } else {
        None
    }
}

/// Cells whose mask value names an object. Ghost cells are kept.
pub fn interior(domain: &Grid, n_objects: usize) -> Result<LookupTable> {
    LookupTable::build("interior", n_objects, 0..domain.val.len(), |a, node| {
        (object_of(domain.val[node]) == Some(a)).then_some(node)
    })
}

/// Number of the 8 cells around node `b` that belong to object `a`.
fn corner_count(domain: &Grid, corners: &[isize; 8], a: usize, b: usize) -> usize {
    let lo = a as f64 + 0.5;
    let hi = a as f64 + 1.5;
    corners
        .iter()
        .filter_map(|off| usize::try_from(b as isize + off).ok())
        .filter(|&c| c < domain.val.len())
        .filter(|&c| domain.val[c] > lo && domain.val[c] < hi)
        .count()
}

/// Owned nodes touched by some, but not all, of the 8 surrounding object cells.
pub fn surface(domain: &Grid, n_objects: usize) -> Result<LookupTable> {
    let shape = &domain.shape;
    let owned: Vec<usize> = (0..domain.val.len()).filter(|&n| !is_ghost(shape, n)).collect();
    let corners = shape.cell_corners();
    LookupTable::build("surface", n_objects, owned.iter().copied(), |a, b| {
        let d = corner_count(domain, &corners, a, b) as f64;
        (d > 0.0 && d < 7.5).then_some(b)
    })
}

/// First owned surface node of each object met along every x line.
pub fn exposed(domain: &Grid, surface: &LookupTable, n_objects: usize) -> Result<LookupTable> {
    let shape = &domain.shape;
    let [nx, ny, nz] = shape.spatial_size();
    let on_surface: Vec<HashSet<usize>> = (0..n_objects)
        .map(|a| surface.bucket(a).iter().copied().collect())
        .collect();
    let lines = (0..nz).flat_map(move |k| (0..ny).map(move |j| (j, k)));
    LookupTable::build("exposed", n_objects, lines, |a, (j, k)| {
        (0..nx)
            .map(|i| shape.node([i, j, k]))
            .find(|&n| !is_ghost(shape, n) && on_surface[a].contains(&n))
    })
}
