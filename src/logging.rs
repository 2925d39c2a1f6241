// logging.rs
// Log backend for the binary: one rank-tagged line per record.

use std::io::Write;

/// Installs env_logger with `info` as the default filter (`RUST_LOG` overrides).
/// Calling it twice is harmless.
pub fn init(rank: usize) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(move |buf, record| writeln!(buf, "[{} rank {}] {}", record.level(), rank, record.args()))
        .try_init();
}
