mod accelerator;
mod generator;
mod layout;
mod probe;
mod run;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use svm_common::protocol::DRIVER_PATH;
use svm_sys::devmem::DEV_MEM;
use svm_sys::pagemap::{SELF_MAPS, SELF_PAGEMAP};

/// Dimension of the points handled by the host.
pub const DIM: usize = 3;

#[derive(Parser)]
#[command(version, about = "Partition tree workloads over a software SVM bridge")]
struct Cli {
    /// Raise the log level (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

/// Parameters naming a dataset on disk.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Number of points
    #[arg(short = 'n', long, default_value_t = 16384)]
    pub n: usize,
    /// Number of clusters and initial centres
    #[arg(short = 'k', long, default_value_t = 128)]
    pub k: usize,
    /// Cluster spread relative to the coordinate range
    #[arg(long, default_value_t = 0.2)]
    pub std_dev: f64,
    /// Directory holding the dataset files
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
}

/// Hardware paths, overridable for bring-up on other boards.
#[derive(Args, Debug, Clone)]
pub struct HardwareArgs {
    /// Register service attribute of the SVM driver
    #[arg(long, default_value = DRIVER_PATH)]
    pub driver: PathBuf,
    /// Raw physical memory device
    #[arg(long, default_value = DEV_MEM)]
    pub devmem: PathBuf,
}

/// How the tree is handed to the accelerator.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Pointer tree when the driver is loaded, array tree otherwise
    Auto,
    /// Pointer tree through SVM; fails without the driver
    Svm,
    /// Array tree, no SVM
    Array,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a clustered dataset and its initial centres
    Gen {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[arg(long)]
        seed: Option<u64>,
        /// Number of initial centre files to write
        #[arg(long, default_value_t = 1)]
        centre_sets: usize,
    },
    /// Build the tree over a dataset and launch the accelerator
    Run {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[arg(long, value_enum, default_value_t = Mode::Auto)]
        mode: Mode,
        /// Keep accelerator traffic out of the coherency domain and flush
        /// the tree explicitly
        #[arg(long)]
        no_acp: bool,
        #[command(flatten)]
        hw: HardwareArgs,
    },
    /// Translate a scratch buffer and compare against the pagemap
    Probe {
        #[command(flatten)]
        hw: HardwareArgs,
        #[arg(long, default_value_t = 4)]
        pages: usize,
    },
    /// Print the process memory map with physical endpoints
    Layout {
        #[arg(long, default_value = SELF_MAPS)]
        maps: PathBuf,
        #[arg(long, default_value = SELF_PAGEMAP)]
        pagemap: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Gen {
            dataset,
            seed,
            centre_sets,
        } => {
            generator::generate_dataset(&dataset, seed, centre_sets)?;
        }
        Commands::Run {
            dataset,
            mode,
            no_acp,
            hw,
        } => {
            let args = run::RunArgs {
                dataset,
                mode,
                no_acp,
                hw,
            };
            let report = run::run(&args)?;
            report.print();
        }
        Commands::Probe { hw, pages } => {
            probe::probe(&hw, pages)?;
        }
        Commands::Layout { maps, pagemap } => {
            layout::print_layout(&maps, &pagemap)?;
        }
    }
    Ok(())
}
