// population.rs
// Contains the particle store: fixed per-species slot ranges with swap-with-last removal

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::{PicError, Result};
use crate::grid::{Grid, GridShape};

/// Positions are in local array coordinates (grid units, ghost offset included).
/// Species `s` occupies slots `i_start[s]..i_stop[s]`; `pos`/`vel` hold three
/// components per slot.
#[derive(Clone, Debug)]
pub struct Population {
    pub pos: Vec<f64>,
    pub vel: Vec<f64>,
    /// Normalised charge per particle of each species.
    pub charge: Vec<f64>,
    pub mass: Vec<f64>,
    pub i_start: Vec<usize>,
    pub i_stop: Vec<usize>,
    capacity: Vec<usize>,
}

impl Population {
    pub fn new(charge: Vec<f64>, mass: Vec<f64>, capacity: &[usize]) -> Result<Self> {
        if charge.len() != mass.len() || charge.len() != capacity.len() {
            return Err(PicError::config(format!(
                "species arrays differ in length: charge {}, mass {}, capacity {}",
                charge.len(),
                mass.len(),
                capacity.len()
            )));
        }
        let mut i_start = Vec::with_capacity(capacity.len());
        let mut next = 0;
        for &c in capacity {
            i_start.push(next);
            next += c;
        }
        Ok(Self {
            pos: vec![0.0; 3 * next],
            vel: vec![0.0; 3 * next],
            charge,
            mass,
            i_stop: i_start.clone(),
            i_start,
            capacity: capacity.to_vec(),
        })
    }

    pub fn n_species(&self) -> usize {
        self.charge.len()
    }

    pub fn count(&self, s: usize) -> usize {
        self.i_stop[s] - self.i_start[s]
    }

    pub fn total(&self) -> usize {
        (0..self.n_species()).map(|s| self.count(s)).sum()
    }

    pub fn position(&self, i: usize) -> [f64; 3] {
        [self.pos[3 * i], self.pos[3 * i + 1], self.pos[3 * i + 2]]
    }

    pub fn push(&mut self, s: usize, pos: [f64; 3], vel: [f64; 3]) -> Result<()> {
        if self.count(s) == self.capacity[s] {
            return Err(PicError::PopulationFull {
                species: s,
                capacity: self.capacity[s],
            });
        }
        let i = self.i_stop[s];
        self.pos[3 * i..3 * i + 3].copy_from_slice(&pos);
        self.vel[3 * i..3 * i + 3].copy_from_slice(&vel);
        self.i_stop[s] += 1;
        Ok(())
    }

    /// Removes particle `i` of species `s` by moving the last one into its slot.
    pub fn cut(&mut self, s: usize, i: usize) {
        let last = self.i_stop[s] - 1;
        if i != last {
            self.pos.copy_within(3 * last..3 * last + 3, 3 * i);
            self.vel.copy_within(3 * last..3 * last + 3, 3 * i);
        }
        self.i_stop[s] = last;
    }

    /// Uniform positions over the owned block and uniform velocities in ±`v_thermal`.
    pub fn fill_uniform(
        &mut self,
        s: usize,
        count: usize,
        v_thermal: f64,
        shape: &GridShape,
        seed: u64,
    ) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(seed);
        let (lo, hi) = owned_bounds(shape);
        for _ in 0..count {
            let mut pos = [0.0; 3];
            let mut vel = [0.0; 3];
            for d in 0..3 {
                pos[d] = rng.random_range(lo[d]..hi[d]);
                if v_thermal > 0.0 {
                    vel[d] = rng.random_range(-v_thermal..v_thermal);
                }
            }
            self.push(s, pos, vel)?;
        }
        Ok(())
    }

    pub fn drift(&mut self, dt: f64) {
        for s in 0..self.n_species() {
            for i in 3 * self.i_start[s]..3 * self.i_stop[s] {
                self.pos[i] += self.vel[i] * dt;
            }
        }
    }

    /// Drops particles that left the owned block. Returns how many were removed.
    pub fn purge(&mut self, shape: &GridShape) -> usize {
        let (lo, hi) = owned_bounds(shape);
        let mut removed = 0;
        for s in 0..self.n_species() {
            let mut i = self.i_start[s];
            while i < self.i_stop[s] {
                let p = self.position(i);
                if (0..3).any(|d| p[d] < lo[d] || p[d] >= hi[d]) {
                    self.cut(s, i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        }
        removed
    }

    /// Nearest-grid-point charge deposit.
    pub fn deposit(&self, rho: &mut Grid) {
        rho.zero();
        for s in 0..self.n_species() {
            for i in self.i_start[s]..self.i_stop[s] {
                let p = self.position(i);
                let c = [p[0].round() as isize, p[1].round() as isize, p[2].round() as isize];
                if let Some(n) = rho.shape.checked_node(c) {
                    rho.val[n] += self.charge[s];
                }
            }
        }
    }

    /// Kick with E = -∇φ by central differences at the nearest node.
    pub fn accelerate(&mut self, phi: &Grid, dt: f64) {
        let shape = &phi.shape;
        let strides = [shape.spatial_stride(0), shape.spatial_stride(1), shape.spatial_stride(2)];
        for s in 0..self.n_species() {
            let qm = self.charge[s] / self.mass[s];
            for i in self.i_start[s]..self.i_stop[s] {
                let p = self.position(i);
                let c = [p[0].round() as isize, p[1].round() as isize, p[2].round() as isize];
                let Some(n) = shape.checked_node(c) else { continue };
                for d in 0..3 {
                    let (Some(up), Some(down)) = (n.checked_add(strides[d]), n.checked_sub(strides[d])) else {
                        continue;
                    };
                    if up >= phi.val.len() {
                        continue;
                    }
                    let e = -(phi.val[up] - phi.val[down]) / 2.0;
                    self.vel[3 * i + d] += qm * e * dt;
                }
            }
        }
    }
}

/// Half-open box of positions whose nearest node is owned.
fn owned_bounds(shape: &GridShape) -> ([f64; 3], [f64; 3]) {
    let lo = shape.ghosts_before();
    let ts = shape.spatial_true_size();
    let mut a = [0.0; 3];
    let mut b = [0.0; 3];
    for d in 0..3 {
        a[d] = lo[d] as f64 - 0.5;
        b[d] = (lo[d] + ts[d]) as f64 - 0.5;
    }
    (a, b)
}
