//! Linux user-space glue for the SVM bridge.
//!
//! Implements the hardware-facing traits of `svm_core` on top of the
//! operating system: the driver's sysfs attribute as the register service,
//! `/dev/mem` as the physical memory window, `/proc/self/pagemap` as the
//! OS-assisted frame lookup, and the process-wide mapping of the lock server
//! registers.

/// Failure type of this crate.
pub mod error;

/// Register service clients: the sysfs attribute and an in-process loopback
/// through the driver's register file.
pub mod service;

/// Page-cached, uncached-mapped window onto physical memory.
pub mod devmem;

/// Pagemap lookups and the memory layout report.
pub mod pagemap;

/// Process-wide lock server registers with explicit init and teardown.
pub mod lock;

/// The `SvmBridge` facade.
pub mod bridge;

pub use bridge::SvmBridge;
pub use error::{SysError, SysResult};
