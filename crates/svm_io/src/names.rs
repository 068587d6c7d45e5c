use std::path::{Path, PathBuf};

/// Name of the points file for a dataset, e.g.
/// `data_points_N16384_K128_D3_s0.20.mat`.
pub fn points_file_name(n: usize, k: usize, d: usize, std_dev: f64) -> String {
    format!("data_points_N{n}_K{k}_D{d}_s{std_dev:.2}.mat")
}

/// Name of the `index`-th initial centre file for a dataset.
pub fn centres_file_name(n: usize, k: usize, d: usize, std_dev: f64, index: usize) -> String {
    format!("initial_centers_N{n}_K{k}_D{d}_s{std_dev:.2}_{index}.mat")
}

/// Parameters identifying one dataset on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetName {
    pub n: usize,
    pub k: usize,
    pub d: usize,
    pub std_dev: f64,
}

impl DatasetName {
    pub fn new(n: usize, k: usize, d: usize, std_dev: f64) -> Self {
        Self { n, k, d, std_dev }
    }

    pub fn points_path(&self, dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref()
            .join(points_file_name(self.n, self.k, self.d, self.std_dev))
    }

    pub fn centres_path(&self, dir: impl AsRef<Path>, index: usize) -> PathBuf {
        dir.as_ref().join(centres_file_name(
            self.n,
            self.k,
            self.d,
            self.std_dev,
            index,
        ))
    }
}
