//! Core of the software-managed shared virtual memory bridge.
//!
//! This crate holds everything that lets an accelerator without an IOMMU walk
//! host data structures: the manual translation-table walk, cache and
//! coherency maintenance, the lock protocol over the shared register pair and
//! the weighted-centroid partition tree that is handed to the accelerator in
//! either pointer-linked or flat array form. All modules are hardware
//! agnostic: physical memory, the privileged register service and the lock
//! registers are reached through traits so the same code runs against real
//! windows on the board and against synthetic arenas in tests.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

/// Fixed-capacity slot heap backing the flat tree encoding.
///
/// Hands out record slots with a pre-incremented heap pointer so that slot 0
/// is never allocated and can stand for "no child".
pub mod heap;

/// Bit-field helpers for descriptor and register decoding.
pub mod bit_utils;

/// Memory and instruction barriers.
///
/// Compile to `dsb`/`isb` on 32-bit ARM and to sequentially consistent
/// fences elsewhere. Every cache-maintenance and lock-register access is
/// bracketed by them.
pub mod barrier;

/// Physical memory access abstraction.
///
/// The table walker, the cache controller and the coherency setup read and
/// write physical addresses only through the `PhysicalMemory` trait. The
/// host implements it over `/dev/mem`; tests use `PhysArena`.
pub mod phys;

/// Client side of the privileged register service.
///
/// Defines the `RegisterService` trait through which translation registers
/// are captured and maintenance commands are issued.
pub mod service;

/// Manual walk of the short-descriptor translation tables.
///
/// Resolves host virtual addresses to bus addresses exactly as the MMU
/// would, starting from the captured translation base.
pub mod translate;

/// Cache maintenance and coherency configuration.
///
/// Flushes L1/L2 lines, invalidates TLBs through the register service and
/// programs the interconnect bridge so accelerator traffic joins or bypasses
/// the CPU cache hierarchy.
pub mod cache;

/// Cross-domain spinlock over the lock server register pair.
pub mod lock;

/// Software model of the lock server for multi-agent simulation.
pub mod sim_lock;

/// Points and axis-aligned bounding boxes.
pub mod point;

/// Splitting rule of the partition tree.
pub mod split;

/// Shared recursive construction of the partition tree.
///
/// Implements the split and aggregate algorithm once, parameterized over a
/// `NodeSink` that decides how a finished node is stored.
pub mod kdtree;

/// Pointer-linked tree encoding, dereferenced by the accelerator through SVM.
pub mod pointer_tree;

/// Flat, slot-addressed tree encoding for accelerators without SVM.
pub mod array_tree;

use svm_common::Address;

/// Errors returned by the bridge core.
///
/// Low-level failures are turned into these values at every component
/// boundary so callers can decide whether to degrade, retry or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvmError {
    /// The privileged register service could not be reached.
    ///
    /// The driver is not loaded or its pseudo-file cannot be opened. The
    /// pointer-linked path cannot be used; callers fall back to the flat
    /// encoding.
    ServiceUnavailable,

    /// The register service returned fewer bytes than the protocol requires.
    ShortRead,

    /// The translation registers describe a format the walker does not
    /// handle (long descriptors, TTBR1 routing or supersections).
    UnsupportedFormat,

    /// A descriptor on the walk path is a fault or reserved entry.
    TranslationFault {
        /// Table level the fault was found at (1 or 2).
        level: u8,
        /// Virtual address being translated.
        address: Address,
    },

    /// Manual walk and OS-assisted lookup disagree on an address.
    TranslationMismatch {
        virt: Address,
        walked: Address,
        reported: Address,
    },

    /// A physical address is outside every mapped window.
    UnmappedPhysical(Address),

    /// A physical word access was not 4-byte aligned.
    Misaligned(Address),

    /// The slot heap or another fixed region is exhausted.
    OutOfMemory,

    /// The tree builder was handed an empty point range.
    EmptyInput,

    /// A lock port was acquired again while its token was still held.
    LockReentered,

    /// A lock port was released without holding its token.
    LockNotHeld,

    /// An operating system interface failed while serving a request.
    Io,
}

impl core::fmt::Display for SvmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ServiceUnavailable => write!(f, "SVM driver not loaded"),
            Self::ShortRead => write!(f, "short read from register service"),
            Self::UnsupportedFormat => write!(f, "unsupported translation table format"),
            Self::TranslationFault { level, address } => {
                write!(f, "level {level} translation fault for {address:#010x}")
            }
            Self::TranslationMismatch {
                virt,
                walked,
                reported,
            } => write!(
                f,
                "translation mismatch for {virt:#010x}: walked {walked:#010x}, OS reports {reported:#010x}"
            ),
            Self::UnmappedPhysical(pa) => write!(f, "physical address {pa:#010x} is not mapped"),
            Self::Misaligned(pa) => write!(f, "misaligned physical access at {pa:#010x}"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::EmptyInput => write!(f, "empty point set"),
            Self::LockReentered => write!(f, "lock acquired twice through the same port"),
            Self::LockNotHeld => write!(f, "lock released without being held"),
            Self::Io => write!(f, "operating system interface failed"),
        }
    }
}

impl core::error::Error for SvmError {}
