//! Tree construction and accelerator launch over a dataset.

use crate::accelerator::{
    Accelerator, DryRunAccelerator, LaunchJob, PROFILING_COUNTERS, TreeHandle,
};
use crate::{DIM, DatasetArgs, HardwareArgs, Mode};
use anyhow::{Context, Result, bail};
use log::{info, warn};
use rayon::prelude::*;
use std::time::{Duration, Instant};
use svm_common::Address;
use svm_common::geometry::{CACHE_LINE, line_align};
use svm_common::mmio::LOCK_SERVER_CSR;
use svm_core::array_tree::ArrayTree;
use svm_core::kdtree::NodeSummary;
use svm_core::phys::PhysicalMemory;
use svm_core::point::{BoundingBox, Point};
use svm_core::pointer_tree::PointerTree;
use svm_core::service::{RegisterService, translation_base};
use svm_io::{DatasetName, read_data_points, read_initial_centres};
use svm_sys::SvmBridge;
use svm_sys::lock::{cleanup_svm, init_svm_at};
use svm_sys::service::SysfsService;

pub struct RunArgs {
    pub dataset: DatasetArgs,
    pub mode: Mode,
    pub no_acp: bool,
    pub hw: HardwareArgs,
}

/// Encoding actually used for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Pointer,
    Array,
}

/// Outcome of one run.
#[derive(Debug)]
pub struct RunReport {
    pub layout: Layout,
    pub nodes: usize,
    pub root: NodeSummary<DIM>,
    pub build_time: Duration,
    /// Polls spent acquiring the lock to ring the doorbell; 0 for the array
    /// tree.
    pub lock_polls: u32,
    pub profiling: [u32; PROFILING_COUNTERS],
    pub centres: Vec<Point<DIM>>,
    pub distortion: Vec<u32>,
}

impl RunReport {
    pub fn print(&self) {
        println!("Results");
        println!("Layout: {:?}", self.layout);
        println!("Nodes: {}", self.nodes);
        println!("Root count: {}", self.root.count);
        println!("Root centroid sum: {:?}", self.root.wgt_cent.value);
        println!("Build time: {:.4} s", self.build_time.as_secs_f64());
        println!("Lock polls: {}", self.lock_polls);
        for (i, (c, d)) in self.centres.iter().zip(&self.distortion).enumerate() {
            println!("{i:4}: {:?} (distortion: {d:12})", c.value);
        }
        println!("Profiling: {:?}", self.profiling);
    }
}

/// Bounding box of `points`, reduced in parallel.
pub fn bounding_box(points: &[Point<DIM>]) -> Option<BoundingBox<DIM>> {
    points
        .par_iter()
        .map(|p| BoundingBox::around(*p))
        .reduce_with(|a, b| a.union(&b))
}

/// Decides between the pointer and the array tree.
///
/// A zero translation base means the driver is not loaded: `auto` falls back
/// to the array tree and `svm` fails.
pub fn choose_layout<S: RegisterService + ?Sized>(mode: Mode, service: &mut S) -> Result<Layout> {
    if mode == Mode::Array {
        return Ok(Layout::Array);
    }
    if translation_base(service) != 0 {
        return Ok(Layout::Pointer);
    }
    if mode == Mode::Svm {
        bail!("SVM mode requested but the translation base is unavailable");
    }
    warn!("SVM disabled, falling back to the array tree");
    Ok(Layout::Array)
}

/// Runs the dataset named by `args` on the dry-run accelerator.
pub fn run(args: &RunArgs) -> Result<RunReport> {
    let mut service = SysfsService::new(&args.hw.driver);
    let layout = choose_layout(args.mode, &mut service)?;
    run_with(args, layout, &mut DryRunAccelerator::default())
}

/// Loads the dataset, builds the tree in `layout` and launches `accel`.
pub fn run_with<A: Accelerator>(args: &RunArgs, layout: Layout, accel: &mut A) -> Result<RunReport> {
    let d = &args.dataset;
    let name = DatasetName::new(d.n, d.k, DIM, d.std_dev);
    let points = read_data_points::<DIM>(name.points_path(&d.dir), d.n)
        .context("Failed to load the data points")?;
    let centre_idx = read_initial_centres(name.centres_path(&d.dir, 1), d.k, d.n)
        .context("Failed to load the initial centres")?;
    let centres: Vec<Point<DIM>> = centre_idx.iter().map(|&i| points[i as usize]).collect();

    let mut bbox = bounding_box(&points).context("dataset holds no points")?;
    let count = u32::try_from(points.len()).context("too many points")?;
    let mut idx: Vec<u32> = (0..count).collect();
    info!("{} points, bounding box {:?}..{:?}", d.n, bbox.lo.value, bbox.hi.value);

    match layout {
        Layout::Pointer => run_pointer(args, &points, &centres, &mut idx, &mut bbox, accel),
        Layout::Array => run_array(&points, &centres, &mut idx, &mut bbox, accel),
    }
}

fn run_array<A: Accelerator>(
    points: &[Point<DIM>],
    centres: &[Point<DIM>],
    idx: &mut [u32],
    bbox: &mut BoundingBox<DIM>,
    accel: &mut A,
) -> Result<RunReport> {
    let start = Instant::now();
    let tree = ArrayTree::build(points, idx, bbox)?;
    let build_time = start.elapsed();
    let root = tree.record(tree.root()).context("root record missing")?;
    info!(
        "array tree: {} records in {build_time:?}, root slot {}",
        tree.node_count(),
        tree.root()
    );

    let mut job = LaunchJob::new(
        TreeHandle::Array {
            words: tree.words(),
            root_slot: tree.root(),
        },
        centres,
    );
    accel.launch(&mut job)?;

    Ok(RunReport {
        layout: Layout::Array,
        nodes: tree.node_count(),
        root: root.summary,
        build_time,
        lock_polls: 0,
        profiling: job.profiling,
        centres: job.result_centres,
        distortion: job.distortion,
    })
}

fn run_pointer<A: Accelerator>(
    args: &RunArgs,
    points: &[Point<DIM>],
    centres: &[Point<DIM>],
    idx: &mut [u32],
    bbox: &mut BoundingBox<DIM>,
    accel: &mut A,
) -> Result<RunReport> {
    let mut bridge = SvmBridge::open(&args.hw.driver, &args.hw.devmem)
        .context("Failed to open the SVM bridge")?;
    let lock = init_svm_at(&args.hw.devmem, LOCK_SERVER_CSR)
        .context("Failed to map the lock server")?;
    bridge.configure_coherent_access(!args.no_acp)?;

    let start = Instant::now();
    let tree = PointerTree::build(points, idx, bbox)?;
    let build_time = start.elapsed();
    let root = tree.root().context("pointer tree has no root")?;
    let root_address = tree.root_address().context("pointer tree has no root")?;
    info!(
        "pointer tree: {} nodes in {build_time:?}, root at {root_address:#x}",
        tree.node_count()
    );

    if args.no_acp {
        let lines = flush_tree(&mut bridge, &tree)?;
        info!("flushed {lines} lines of tree data");
    }
    bridge.flush_tlb()?;

    let mut job = LaunchJob::new(
        TreeHandle::Pointer {
            root: root_address,
            ttbr0: bridge.translation_base(),
        },
        centres,
    );
    // SAFETY: the doorbell lives in `job` for the whole call and is only
    // written under the lock.
    let lock_polls = unsafe { lock.atomic_store(&raw mut job.doorbell, 1)? };
    let launched = accel.launch(&mut job);
    cleanup_svm();
    launched?;

    Ok(RunReport {
        layout: Layout::Pointer,
        nodes: tree.node_count(),
        root: root.summary,
        build_time,
        lock_polls,
        profiling: job.profiling,
        centres: job.result_centres,
        distortion: job.distortion,
    })
}

/// Writes every node of `tree` back to memory through both cache levels.
///
/// Needed only when accelerator traffic bypasses the coherency domain.
///
/// # Returns
///
/// Number of L2 lines flushed.
fn flush_tree<M: PhysicalMemory, S: RegisterService>(
    bridge: &mut SvmBridge<M, S>,
    tree: &PointerTree<DIM>,
) -> Result<usize> {
    warn!("ACP disabled: flushing the tree through L1 maintenance, unstable on the reference board");
    let size = PointerTree::<DIM>::node_size();
    let mut lines = 0;
    for address in tree.node_addresses() {
        let va = Address::try_from(address)
            .with_context(|| format!("node at {address:#x} is outside the 32-bit space"))?;
        bridge.flush_range_l1(va, size)?;

        let end = va as u64 + size as u64;
        let mut line = line_align(va) as u64;
        while line < end {
            let pa = bridge.translate(line as Address)?;
            bridge.flush_line_l2(pa)?;
            lines += 1;
            line += CACHE_LINE as u64;
        }
    }
    Ok(lines)
}
