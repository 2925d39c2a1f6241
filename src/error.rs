// error.rs
// Error taxonomy shared by every component. All variants are fatal for a run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PicError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("json encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    /// The induced-potential matrix of an object could not be inverted.
    #[error("capacitance matrix of object {object} (dimension {dim}) is singular: {reason}")]
    SingularCapacitance {
        object: usize,
        dim: usize,
        reason: String,
    },

    #[error("{table} lookup table is inconsistent for bucket {bucket}: counted {counted}, filled {filled}")]
    LookupInvariant {
        table: &'static str,
        bucket: usize,
        counted: usize,
        filled: usize,
    },

    #[error("collective mismatch on rank {rank}: expected {expected}, found {found}")]
    CollectiveMismatch {
        rank: usize,
        expected: String,
        found: String,
    },

    #[error("communication group aborted (code {code})")]
    Aborted { code: i32 },

    #[error("rank {0} panicked")]
    RankPanicked(usize),

    #[error("population slots for species {species} are full (capacity {capacity})")]
    PopulationFull { species: usize, capacity: usize },

    #[error("potential solver did not converge after {iterations} iterations (residual {residual:e})")]
    SolverDiverged { iterations: usize, residual: f64 },
}

pub type Result<T> = std::result::Result<T, PicError>;

impl PicError {
    pub fn config(msg: impl Into<String>) -> Self {
        PicError::Config(msg.into())
    }
}
