//! Boundary to the accelerator invocation layer.
//!
//! The host hands over either the pointer tree's root address with the
//! captured translation base, or the flat record buffer with its root slot,
//! plus output buffers it never interprets.

use crate::DIM;
use anyhow::Result;
use log::info;
use svm_common::Address;
use svm_core::point::Point;

/// Number of profiling counters the accelerator fills in.
pub const PROFILING_COUNTERS: usize = 16;

/// Tree argument of one launch.
#[derive(Debug, Clone, Copy)]
pub enum TreeHandle<'a> {
    /// Root node address in the host's address space, walked by the
    /// accelerator through the translation base.
    Pointer { root: usize, ttbr0: Address },
    /// Record buffer and the slot of its root.
    Array { words: &'a [u32], root_slot: u32 },
}

/// Arguments and output buffers of one accelerator run.
pub struct LaunchJob<'a> {
    pub tree: TreeHandle<'a>,
    pub centres: &'a [Point<DIM>],
    /// Written under the hardware lock to start a pointer-mode run.
    pub doorbell: u32,
    pub profiling: [u32; PROFILING_COUNTERS],
    pub result_centres: Vec<Point<DIM>>,
    pub distortion: Vec<u32>,
}

impl<'a> LaunchJob<'a> {
    /// Prepares a job with zeroed outputs sized for `centres.len()` clusters.
    pub fn new(tree: TreeHandle<'a>, centres: &'a [Point<DIM>]) -> Self {
        let k = centres.len();
        Self {
            tree,
            centres,
            doorbell: 0,
            profiling: [0; PROFILING_COUNTERS],
            result_centres: vec![Point::default(); k],
            distortion: vec![0; k],
        }
    }
}

/// An execution domain able to run a job to completion.
pub trait Accelerator {
    fn launch(&mut self, job: &mut LaunchJob<'_>) -> Result<()>;
}

/// Accelerator stand-in that logs the binding and leaves the outputs zeroed.
#[derive(Debug, Default)]
pub struct DryRunAccelerator {
    pub launches: usize,
}

impl Accelerator for DryRunAccelerator {
    fn launch(&mut self, job: &mut LaunchJob<'_>) -> Result<()> {
        match job.tree {
            TreeHandle::Pointer { root, ttbr0 } => {
                info!("dry run: pointer tree at {root:#x}, TTBR0 {ttbr0:#010x}");
            }
            TreeHandle::Array { words, root_slot } => {
                info!(
                    "dry run: array tree of {} words, root slot {root_slot}",
                    words.len()
                );
            }
        }
        info!("dry run: K = {}, doorbell {}", job.centres.len(), job.doorbell);
        self.launches += 1;
        Ok(())
    }
}
