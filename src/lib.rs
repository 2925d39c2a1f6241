pub mod comm;
pub mod config;
pub mod error;
pub mod grid;
pub mod io;
pub mod logging;
pub mod object;
pub mod population;
pub mod profiler;
pub mod simulation;
pub mod solver;
pub mod units;

pub use error::{PicError, Result};

#[cfg(feature = "profiling")]
use once_cell::sync::Lazy;
#[cfg(feature = "profiling")]
use parking_lot::Mutex;

#[cfg(feature = "profiling")]
pub static PROFILER: Lazy<Mutex<profiler::Profiler>> =
    Lazy::new(|| Mutex::new(profiler::Profiler::new()));
