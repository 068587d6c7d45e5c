use crate::parser::integer_line;
use anyhow::{Context, Result, bail, ensure};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use svm_core::point::{Coord, Point};

/// Reads the first `count` integers of `path`, one per line.
///
/// Every line up to the `count`th must hold one integer; a blank line there
/// is malformed. Lines past `count` are ignored.
fn read_integers(path: &Path, count: usize) -> Result<Vec<i64>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut values = Vec::with_capacity(count);
    for (number, line) in reader.lines().enumerate() {
        if values.len() == count {
            break;
        }
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            bail!("{}:{}: blank line", path.display(), number + 1);
        }
        let Some(value) = integer_line(&line) else {
            bail!("{}:{}: malformed line {:?}", path.display(), number + 1, line);
        };
        values.push(value);
    }

    ensure!(
        values.len() == count,
        "{}: short read, expected {count} values, found {}",
        path.display(),
        values.len()
    );
    Ok(values)
}

/// Loads `n` points of dimension `D` from a points file.
///
/// The file holds `D * n` coordinates in dimension-major order: all first
/// coordinates, then all second coordinates, and so on.
///
/// # Arguments
///
/// * `path` - Path to the points file
/// * `n` - Number of points to read
///
/// # Returns
///
/// The points, or an error if the file is missing, short, malformed or holds
/// a coordinate outside the 32-bit range.
pub fn read_data_points<const D: usize>(path: impl AsRef<Path>, n: usize) -> Result<Vec<Point<D>>> {
    let path = path.as_ref();
    let values = read_integers(path, D * n)?;

    let mut points = vec![Point::<D>::default(); n];
    for (at, &value) in values.iter().enumerate() {
        let (dim, i) = (at / n, at % n);
        points[i].value[dim] = Coord::try_from(value).with_context(|| {
            format!(
                "{}: coordinate {value} of point {i} does not fit 32 bits",
                path.display()
            )
        })?;
    }
    debug!("read {n} points of dimension {D} from {}", path.display());
    Ok(points)
}

/// Loads `k` initial centre indices, each referring to one of `n` points.
///
/// # Returns
///
/// The indices, or an error if the file is missing, short or malformed, or an
/// index is negative or not smaller than `n`.
pub fn read_initial_centres(path: impl AsRef<Path>, k: usize, n: usize) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let values = read_integers(path, k)?;

    let centres = values
        .into_iter()
        .enumerate()
        .map(|(c, value)| {
            u32::try_from(value)
                .ok()
                .filter(|&idx| (idx as usize) < n)
                .with_context(|| {
                    format!(
                        "{}: centre {c} refers to point {value}, outside 0..{n}",
                        path.display()
                    )
                })
        })
        .collect::<Result<Vec<_>>>()?;
    debug!("read {k} initial centres from {}", path.display());
    Ok(centres)
}
