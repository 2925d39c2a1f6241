// main.rs
// Command line entry: run a config, or write a cube mask dataset.

use std::path::Path;

use plasma_objects::comm::Communicator;
use plasma_objects::config::SimConfig;
use plasma_objects::io::{self, MaskDataset, SaveFormat};
use plasma_objects::simulation::Simulation;
use plasma_objects::{logging, PicError, Result};

const USAGE: &str = "usage:
  plasma_objects run <config.toml>
  plasma_objects cube-mask <out.json|out.bin[.gz]> <nx> <ny> <nz> <cells>";

fn run(path: &str, comm: &dyn Communicator) -> Result<()> {
    let config = SimConfig::load_from_file(path)?;
    let mut sim = Simulation::new(config, comm)?;
    sim.run(comm)?;
    Ok(())
}

/// Centred cube of object 0 spanning `cells` cells per axis.
fn cube_mask(out: &str, dims: &[String]) -> Result<()> {
    let parsed = dims
        .iter()
        .map(|s| s.parse::<usize>().map_err(|_| PicError::config(format!("not a size: {:?}", s))))
        .collect::<Result<Vec<_>>>()?;
    let size = [parsed[0], parsed[1], parsed[2]];
    let cells = parsed[3];
    let lo = size.map(|n| n.saturating_sub(cells) / 2);
    let mut mask = MaskDataset::vacuum(size);
    mask.fill_cube(lo, cells, 0)?;

    let compress = out.ends_with(".gz");
    let stem = out.trim_end_matches(".gz");
    let format = if stem.ends_with(".bin") { SaveFormat::Binary } else { SaveFormat::Json };
    io::save_mask(Path::new(out), &mask, format, compress)?;
    log::info!("wrote {:?} mask with a {}-cell cube at {:?} to {}", size, cells, lo, out);
    Ok(())
}

#[cfg(not(feature = "mpi"))]
fn world() -> Result<Box<dyn Communicator>> {
    Ok(Box::new(plasma_objects::comm::SingleRank))
}

#[cfg(feature = "mpi")]
fn world() -> Result<Box<dyn Communicator>> {
    Ok(Box::new(plasma_objects::comm::MpiComm::init()?))
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let comm = match world() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    logging::init(comm.rank());

    let result = match args.first().map(String::as_str) {
        Some("run") if args.len() == 2 => run(&args[1], comm.as_ref()),
        Some("cube-mask") if args.len() == 6 => {
            if comm.is_root() {
                cube_mask(&args[1], &args[2..])
            } else {
                Ok(())
            }
        }
        _ => {
            if comm.is_root() {
                eprintln!("{}", USAGE);
            }
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        log::error!("{}", e);
        comm.abort(1);
    }
}
