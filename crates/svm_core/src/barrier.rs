//! Barriers used around cache maintenance and shared register accesses.

use core::sync::atomic::{Ordering, compiler_fence};

/// Data synchronization barrier.
///
/// Completes all outstanding explicit memory accesses before any following
/// instruction executes.
#[inline(always)]
pub fn dsb() {
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!("dsb", options(nostack, preserves_flags));
    }

    #[cfg(not(target_arch = "arm"))]
    core::sync::atomic::fence(Ordering::SeqCst);

    compiler_fence(Ordering::SeqCst);
}

/// Instruction synchronization barrier.
///
/// Flushes the pipeline so that context-changing operations before it are
/// visible to the instructions after it.
#[inline(always)]
pub fn isb() {
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!("isb", options(nostack, preserves_flags));
    }

    compiler_fence(Ordering::SeqCst);
}

/// Full barrier pair bracketing a maintenance operation.
#[inline(always)]
pub fn full() {
    dsb();
    isb();
}
