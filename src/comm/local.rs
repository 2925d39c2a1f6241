// comm/local.rs
// In-process rank group: one scoped thread per rank, collectives exchanged
// through shared slots guarded by a rendezvous.
//
// Each collective is tagged with a per-rank sequence number and its kind. All
// ranks compare every slot against their own tag, so a divergent call order is
// reported on every rank as `CollectiveMismatch`. A rank that fails, panics or
// leaves early releases the other ranks with an error.

use std::cell::Cell;

use parking_lot::{Condvar, Mutex};

use super::Communicator;
use crate::error::{PicError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    GatherUsize,
    GatherF64,
    ReduceSum,
    ReduceSumUsize,
    ReduceMaxUsize,
}

#[derive(Clone, Debug)]
enum Payload {
    F64(Vec<f64>),
    Usize(Vec<usize>),
}

#[derive(Clone, Debug)]
struct Contribution {
    seq: u64,
    op: Op,
    payload: Payload,
}

struct RendezvousState {
    arrived: usize,
    generation: u64,
    departed: usize,
    aborted: Option<i32>,
}

struct Rendezvous {
    size: usize,
    state: Mutex<RendezvousState>,
    cv: Condvar,
}

impl Rendezvous {
    fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(RendezvousState {
                arrived: 0,
                generation: 0,
                departed: 0,
                aborted: None,
            }),
            cv: Condvar::new(),
        }
    }

    fn wait(&self, rank: usize) -> Result<()> {
        let mut st = self.state.lock();
        if let Some(code) = st.aborted {
            return Err(PicError::Aborted { code });
        }
        if st.departed > 0 {
            return Err(left_group(rank));
        }
        let generation = st.generation;
        st.arrived += 1;
        if st.arrived == self.size {
            st.arrived = 0;
            st.generation += 1;
            self.cv.notify_all();
            return Ok(());
        }
        loop {
            if st.generation != generation {
                return Ok(());
            }
            if let Some(code) = st.aborted {
                return Err(PicError::Aborted { code });
            }
            if st.departed > 0 {
                return Err(left_group(rank));
            }
            self.cv.wait(&mut st);
        }
    }

    fn abort(&self, code: i32) {
        let mut st = self.state.lock();
        if st.aborted.is_none() {
            st.aborted = Some(code);
        }
        self.cv.notify_all();
    }

    fn depart(&self) {
        let mut st = self.state.lock();
        st.departed += 1;
        self.cv.notify_all();
    }
}

fn left_group(rank: usize) -> PicError {
    PicError::CollectiveMismatch {
        rank,
        expected: "all ranks in the collective".to_string(),
        found: "a rank already left the group".to_string(),
    }
}

struct Shared {
    rendezvous: Rendezvous,
    slots: Mutex<Vec<Option<Contribution>>>,
}

/// Marks the rank as gone when its thread ends, and aborts the group on panic.
struct DepartGuard<'a> {
    rendezvous: &'a Rendezvous,
}

impl Drop for DepartGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.rendezvous.abort(101);
        }
        self.rendezvous.depart();
    }
}

/// Handle of one in-process rank. Lives on that rank's thread only.
pub struct LocalComm<'a> {
    rank: usize,
    shared: &'a Shared,
    seq: Cell<u64>,
}

impl LocalComm<'_> {
    fn exchange(&self, op: Op, payload: Payload) -> Result<Vec<Payload>> {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        let size = self.shared.rendezvous.size;

        self.shared.slots.lock()[self.rank] = Some(Contribution { seq, op, payload });
        self.shared.rendezvous.wait(self.rank)?;

        let gathered: Vec<Option<Contribution>> = self.shared.slots.lock().clone();
        let mut out = Vec::with_capacity(size);
        for (from, slot) in gathered.into_iter().enumerate() {
            match slot {
                Some(c) if c.seq == seq && c.op == op => out.push(c.payload),
                Some(c) => {
                    return Err(PicError::CollectiveMismatch {
                        rank: self.rank,
                        expected: format!("{:?} #{}", op, seq),
                        found: format!("{:?} #{} from rank {}", c.op, c.seq, from),
                    })
                }
                None => {
                    return Err(PicError::CollectiveMismatch {
                        rank: self.rank,
                        expected: format!("{:?} #{}", op, seq),
                        found: format!("nothing from rank {}", from),
                    })
                }
            }
        }

        // Nobody may overwrite a slot before every rank has read this round.
        self.shared.rendezvous.wait(self.rank)?;
        Ok(out)
    }

    fn mismatch(&self, op: Op, found: &str) -> PicError {
        PicError::CollectiveMismatch {
            rank: self.rank,
            expected: format!("{:?}", op),
            found: found.to_string(),
        }
    }

    fn exchange_usize(&self, op: Op, value: usize) -> Result<Vec<usize>> {
        self.exchange(op, Payload::Usize(vec![value]))?
            .into_iter()
            .map(|p| match p {
                Payload::Usize(v) if v.len() == 1 => Ok(v[0]),
                _ => Err(self.mismatch(op, "payload of another shape")),
            })
            .collect()
    }

    fn exchange_f64(&self, op: Op, values: &[f64]) -> Result<Vec<Vec<f64>>> {
        self.exchange(op, Payload::F64(values.to_vec()))?
            .into_iter()
            .map(|p| match p {
                Payload::F64(v) => Ok(v),
                Payload::Usize(_) => Err(self.mismatch(op, "integer payload")),
            })
            .collect()
    }
}

impl Communicator for LocalComm<'_> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.rendezvous.size
    }

    fn all_gather_usize(&self, value: usize) -> Result<Vec<usize>> {
        self.exchange_usize(Op::GatherUsize, value)
    }

    fn all_gather_f64(&self, values: &[f64]) -> Result<Vec<f64>> {
        Ok(self
            .exchange_f64(Op::GatherF64, values)?
            .into_iter()
            .flatten()
            .collect())
    }

    fn all_reduce_sum(&self, buf: &mut [f64]) -> Result<()> {
        let parts = self.exchange_f64(Op::ReduceSum, buf)?;
        if let Some(bad) = parts.iter().position(|p| p.len() != buf.len()) {
            return Err(PicError::CollectiveMismatch {
                rank: self.rank,
                expected: format!("ReduceSum of {} values", buf.len()),
                found: format!("{} values from rank {}", parts[bad].len(), bad),
            });
        }
        // Rank order keeps the floating-point result identical on every rank.
        buf.iter_mut().for_each(|x| *x = 0.0);
        for part in &parts {
            for (x, y) in buf.iter_mut().zip(part) {
                *x += *y;
            }
        }
        Ok(())
    }

    fn all_reduce_sum_usize(&self, value: usize) -> Result<usize> {
        Ok(self.exchange_usize(Op::ReduceSumUsize, value)?.into_iter().sum())
    }

    fn all_reduce_max_usize(&self, value: usize) -> Result<usize> {
        Ok(self
            .exchange_usize(Op::ReduceMaxUsize, value)?
            .into_iter()
            .max()
            .unwrap_or(value))
    }

    fn abort(&self, code: i32) -> ! {
        self.shared.rendezvous.abort(code);
        panic!("rank {} aborted the group (code {})", self.rank, code);
    }
}

/// Runs `n` ranks of the same closure on scoped threads.
pub struct LocalGroup;

impl LocalGroup {
    /// Returns the per-rank results in rank order. If any rank fails, the first
    /// root-cause error is returned (an `Aborted` seen by the others is not one).
    pub fn run<T, F>(n: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&LocalComm<'_>) -> Result<T> + Sync,
    {
        if n == 0 {
            return Err(PicError::config("a rank group needs at least one rank"));
        }
        let shared = Shared {
            rendezvous: Rendezvous::new(n),
            slots: Mutex::new(vec![None; n]),
        };
        let shared = &shared;
        let f = &f;

        let joined = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = (0..n)
                .map(|rank| {
                    s.spawn(move |_| {
                        let _guard = DepartGuard {
                            rendezvous: &shared.rendezvous,
                        };
                        let comm = LocalComm {
                            rank,
                            shared,
                            seq: Cell::new(0),
                        };
                        let result = f(&comm);
                        if result.is_err() {
                            shared.rendezvous.abort(1);
                        }
                        result
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
        })
        .map_err(|_| PicError::RankPanicked(0))?;

        let mut results = Vec::with_capacity(n);
        let mut first_err: Option<PicError> = None;
        for (rank, outcome) in joined.into_iter().enumerate() {
            match outcome {
                Err(_) => return Err(PicError::RankPanicked(rank)),
                Ok(Ok(value)) => results.push(value),
                Ok(Err(e)) => {
                    let replace = match &first_err {
                        None => true,
                        Some(PicError::Aborted { .. }) => !matches!(e, PicError::Aborted { .. }),
                        Some(_) => false,
                    };
                    if replace {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}
