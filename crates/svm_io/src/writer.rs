use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use svm_core::point::Point;

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Writes `points` in dimension-major order, one coordinate per line.
pub fn write_data_points<const D: usize>(path: impl AsRef<Path>, points: &[Point<D>]) -> Result<()> {
    let path = path.as_ref();
    let mut out = create(path)?;
    for dim in 0..D {
        for p in points {
            writeln!(out, "{}", p.value[dim])?;
        }
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Writes centre indices, one per line.
pub fn write_initial_centres(path: impl AsRef<Path>, centres: &[u32]) -> Result<()> {
    let path = path.as_ref();
    let mut out = create(path)?;
    for c in centres {
        writeln!(out, "{c}")?;
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}
