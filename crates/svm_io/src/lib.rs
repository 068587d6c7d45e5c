//! Dataset files for the partition tree workloads.
//!
//! Datasets are plain ASCII files holding one integer per line: a points file
//! with the coordinates of N points in dimension-major order, and one or more
//! initial centre files listing K point indices. File names encode the
//! dataset parameters so that a run can locate its inputs from N, K, D and
//! the cluster spread alone.

/// Dataset file names derived from the dataset parameters.
pub mod names;

/// Integer line parser.
pub mod parser;

/// Readers for points and initial centre files.
///
/// Reject missing files, short files, malformed lines and out-of-range
/// values, reporting the offending path and line.
pub mod loader;

/// Writers producing the format the loaders accept.
pub mod writer;

pub use loader::{read_data_points, read_initial_centres};
pub use names::{DatasetName, centres_file_name, points_file_name};
pub use writer::{write_data_points, write_initial_centres};
