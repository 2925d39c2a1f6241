// io.rs
// Save/load for the object mask dataset and grid snapshots (JSON or bincode, optionally gzip).

use crate::error::{PicError, Result};
use crate::grid::Grid;
use crate::profile_scope;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// Name of the persisted object-id dataset.
pub const MASK_DATASET_NAME: &str = "Object";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    #[default]
    Json,
    Binary,
}

impl SaveFormat {
    pub fn extension(self, compress: bool) -> &'static str {
        match (self, compress) {
            (SaveFormat::Json, false) => "json",
            (SaveFormat::Json, true) => "json.gz",
            (SaveFormat::Binary, false) => "bin",
            (SaveFormat::Binary, true) => "bin.gz",
        }
    }
}

/// Object ids over the global true grid: 0 vacuum, `a + 1` object `a`.
/// Values are stored with axis 0 varying fastest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskDataset {
    pub name: String,
    pub size: [usize; 3],
    pub val: Vec<f64>,
}

impl MaskDataset {
    pub fn vacuum(size: [usize; 3]) -> Self {
        Self {
            name: MASK_DATASET_NAME.to_string(),
            size,
            val: vec![0.0; size[0] * size[1] * size[2]],
        }
    }

    fn index(&self, c: [usize; 3]) -> usize {
        c[0] + self.size[0] * (c[1] + self.size[1] * c[2])
    }

    pub fn set(&mut self, c: [usize; 3], value: f64) {
        let i = self.index(c);
        self.val[i] = value;
    }

    /// Value at global coordinates; vacuum outside the domain.
    pub fn value_at(&self, c: [isize; 3]) -> f64 {
        for d in 0..3 {
            if c[d] < 0 || c[d] as usize >= self.size[d] {
                return 0.0;
            }
        }
        self.val[self.index([c[0] as usize, c[1] as usize, c[2] as usize])]
    }

    /// Fills `cells` mask cells per axis starting at `lo` with object `id`.
    /// A block of `cells` cells spans `cells + 1` nodes per side.
    pub fn fill_cube(&mut self, lo: [usize; 3], cells: usize, id: usize) -> Result<()> {
        for d in 0..3 {
            if lo[d] + cells > self.size[d] {
                return Err(PicError::config(format!(
                    "cube of {} cells at {:?} does not fit in {:?}",
                    cells, lo, self.size
                )));
            }
        }
        for k in lo[2]..lo[2] + cells {
            for j in lo[1]..lo[1] + cells {
                for i in lo[0]..lo[0] + cells {
                    self.set([i, j, k], (id + 1) as f64);
                }
            }
        }
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.name != MASK_DATASET_NAME {
            return Err(PicError::config(format!(
                "dataset is named {:?}, expected {:?}",
                self.name, MASK_DATASET_NAME
            )));
        }
        if self.val.len() != self.size.iter().product::<usize>() {
            return Err(PicError::config(format!(
                "dataset {:?} holds {} values for shape {:?}",
                self.name,
                self.val.len(),
                self.size
            )));
        }
        Ok(())
    }
}

/// One rank's local array of a grid quantity at a given step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub name: String,
    pub frame: usize,
    pub rank: usize,
    pub size: Vec<usize>,
    pub val: Vec<f64>,
}

impl GridSnapshot {
    /// Copies `grid` scaled back to physical units by `scale`.
    pub fn from_grid(name: &str, frame: usize, rank: usize, grid: &Grid, scale: f64) -> Self {
        Self {
            name: name.to_string(),
            frame,
            rank,
            size: grid.shape.size.clone(),
            val: grid.val.iter().map(|v| v * scale).collect(),
        }
    }
}

pub fn save<P: AsRef<Path>, T: Serialize>(path: P, value: &T, format: SaveFormat, compress: bool) -> Result<()> {
    profile_scope!("save");
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Write to a temporary file first so an interrupted run leaves no truncated output
    let tmp_path = path.with_extension({
        let mut os = path.extension().map(|e| e.to_os_string()).unwrap_or_default();
        os.push(".tmp");
        os
    });
    {
        let file = std::fs::File::create(&tmp_path)?;
        let writer = BufWriter::new(file);
        match (format, compress) {
            (SaveFormat::Json, false) => {
                let mut writer = writer;
                serde_json::to_writer(&mut writer, value)?;
                writer.flush()?;
            }
            (SaveFormat::Json, true) => {
                let mut encoder = GzEncoder::new(writer, Compression::fast());
                serde_json::to_writer(&mut encoder, value)?;
                let mut writer = encoder.finish()?;
                writer.flush()?;
            }
            (SaveFormat::Binary, false) => {
                let mut writer = writer;
                bincode::serialize_into(&mut writer, value)?;
                writer.flush()?;
            }
            (SaveFormat::Binary, true) => {
                let mut encoder = GzEncoder::new(writer, Compression::fast());
                bincode::serialize_into(&mut encoder, value)?;
                let mut writer = encoder.finish()?;
                writer.flush()?;
            }
        }
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn load<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
    profile_scope!("load");
    let data = std::fs::read(path.as_ref())?;
    match maybe_decompress_gzip(&data)? {
        Some(decoded) => parse_bytes(&decoded),
        None => parse_bytes(&data),
    }
}

fn parse_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    match serde_json::from_slice::<T>(bytes) {
        Ok(value) => Ok(value),
        Err(json_err) => bincode::deserialize::<T>(bytes).map_err(|_| PicError::Json(json_err)),
    }
}

fn maybe_decompress_gzip(data: &[u8]) -> Result<Option<Vec<u8>>> {
    if data.len() < 2 || data[0] != 0x1f || data[1] != 0x8b {
        return Ok(None);
    }

    let mut decoder = GzDecoder::new(Cursor::new(data));
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    Ok(Some(decoded))
}

pub fn save_mask<P: AsRef<Path>>(path: P, mask: &MaskDataset, format: SaveFormat, compress: bool) -> Result<()> {
    mask.check()?;
    save(path, mask, format, compress)
}

pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<MaskDataset> {
    let mask: MaskDataset = load(path)?;
    mask.check()?;
    Ok(mask)
}

/// Writes `<dir>/<name>_<frame>_r<rank>.<ext>` and returns the path.
pub fn write_snapshot<P: AsRef<Path>>(
    dir: P,
    snapshot: &GridSnapshot,
    format: SaveFormat,
    compress: bool,
) -> Result<PathBuf> {
    let path = dir.as_ref().join(format!(
        "{}_{:06}_r{}.{}",
        snapshot.name,
        snapshot.frame,
        snapshot.rank,
        format.extension(compress)
    ));
    save(&path, snapshot, format, compress)?;
    Ok(path)
}
