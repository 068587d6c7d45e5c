//! Synthetic clustered datasets.
//!
//! Draws K cluster centres uniformly over the coordinate range and scatters
//! the points around them with Gaussian noise whose standard deviation is a
//! fraction of that range. Writes the points file and the requested number
//! of initial centre files under the names `run` looks for.

use crate::{DIM, DatasetArgs};
use anyhow::{Context, Result, ensure};
use log::info;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use std::fs;
use svm_core::point::{Coord, Point};
use svm_io::{DatasetName, write_data_points, write_initial_centres};

/// Cluster centres are drawn from `[0, COORD_RANGE)` on every axis.
pub const COORD_RANGE: Coord = 1 << 10;

/// One standard normal sample (Box-Muller).
fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// Draws `n` points around `k` cluster centres.
///
/// # Arguments
///
/// * `rng` - Random source
/// * `n` - Number of points
/// * `k` - Number of clusters, at least 1
/// * `std_dev` - Spread as a fraction of `COORD_RANGE`
pub fn clustered_points<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    k: usize,
    std_dev: f64,
) -> Vec<Point<DIM>> {
    let clusters: Vec<Point<DIM>> = (0..k.max(1))
        .map(|_| Point::new([(); DIM].map(|_| rng.gen_range(0..COORD_RANGE))))
        .collect();
    let sigma = std_dev * f64::from(COORD_RANGE);

    (0..n)
        .map(|_| {
            let centre = clusters[rng.gen_range(0..clusters.len())];
            // `as` saturates out-of-range floats.
            Point::new(centre.value.map(|c| (f64::from(c) + sigma * gaussian(rng)).round() as Coord))
        })
        .collect()
}

/// Picks `k` distinct point indices out of `n`.
pub fn initial_centres<R: Rng + ?Sized>(rng: &mut R, n: usize, k: usize) -> Result<Vec<u32>> {
    ensure!(k <= n, "cannot pick {k} distinct centres out of {n} points");
    ensure!(u32::try_from(n).is_ok(), "{n} points exceed the index range");
    Ok(index::sample(rng, n, k)
        .into_iter()
        .map(|i| i as u32)
        .collect())
}

/// Generates a dataset and writes it under `args.dir`.
pub fn generate_dataset(args: &DatasetArgs, seed: Option<u64>, centre_sets: usize) -> Result<()> {
    ensure!(args.n > 0, "a dataset needs at least one point");
    ensure!(args.k > 0, "a dataset needs at least one cluster");

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    fs::create_dir_all(&args.dir)
        .with_context(|| format!("Failed to create {}", args.dir.display()))?;

    let name = DatasetName::new(args.n, args.k, DIM, args.std_dev);
    info!(
        "generating {} points in {} clusters (s = {:.2})",
        args.n, args.k, args.std_dev
    );
    let points = clustered_points(&mut rng, args.n, args.k, args.std_dev);
    let path = name.points_path(&args.dir);
    write_data_points(&path, &points)?;
    info!("wrote {}", path.display());

    for set in 1..=centre_sets {
        let centres = initial_centres(&mut rng, args.n, args.k)?;
        let path = name.centres_path(&args.dir, set);
        write_initial_centres(&path, &centres)?;
        info!("wrote {}", path.display());
    }
    Ok(())
}
