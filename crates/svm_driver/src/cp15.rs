//! CP15 register and maintenance instructions of the ARMv7-A core.

use crate::{ACTLR_SMP, Coprocessor, NSACR_NS_SMP};
use core::arch::asm;
use svm_common::Address;

/// The executing core's system control coprocessor.
pub struct Cp15 {
    _private: (),
}

impl Cp15 {
    /// # Safety
    ///
    /// The caller must be running at PL1 or higher. Every method executes
    /// privileged `mrc`/`mcr` instructions that trap in user mode.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[inline(always)]
fn barriers() {
    unsafe { asm!("dsb", "isb", options(nostack, preserves_flags)) };
}

impl Coprocessor for Cp15 {
    fn read_ttbcr(&mut self) -> u32 {
        let value: u32;
        unsafe {
            asm!("mrc p15, 0, {0}, c2, c0, 2", out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }

    fn read_ttbr0(&mut self) -> u32 {
        let value: u32;
        unsafe {
            asm!("mrc p15, 0, {0}, c2, c0, 0", out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }

    fn enable_smp_coherency(&mut self) -> u32 {
        let actlr: u32;
        let nsacr: u32;
        barriers();
        unsafe {
            asm!("mrc p15, 0, {0}, c1, c0, 1", out(reg) actlr, options(nostack, preserves_flags));
            asm!("mcr p15, 0, {0}, c1, c0, 1", in(reg) actlr | ACTLR_SMP, options(nostack, preserves_flags));
        }
        barriers();
        unsafe {
            asm!("mrc p15, 0, {0}, c1, c1, 2", out(reg) nsacr, options(nostack, preserves_flags));
            asm!("mcr p15, 0, {0}, c1, c1, 2", in(reg) nsacr | NSACR_NS_SMP, options(nostack, preserves_flags));
        }
        barriers();
        nsacr
    }

    fn clean_invalidate_dcache_line(&mut self, mva: Address) -> u32 {
        let level: u32 = 0;
        unsafe {
            // CSSELR: level 1 data cache
            asm!("mcr p15, 2, {0}, c0, c0, 0", in(reg) level, options(nostack, preserves_flags));
            asm!("isb", options(nostack, preserves_flags));
            // DCCIMVAC
            asm!("mcr p15, 0, {0}, c7, c14, 1", in(reg) mva, options(nostack, preserves_flags));
            asm!("dsb", options(nostack, preserves_flags));
        }
        level
    }

    fn invalidate_tlb_all(&mut self) {
        let zero: u32 = 0;
        unsafe {
            // TLBIALL, DTLBIALL, ITLBIALL
            asm!("mcr p15, 0, {0}, c8, c7, 0", in(reg) zero, options(nostack, preserves_flags));
            barriers();
            asm!("mcr p15, 0, {0}, c8, c6, 0", in(reg) zero, options(nostack, preserves_flags));
            barriers();
            asm!("mcr p15, 0, {0}, c8, c5, 0", in(reg) zero, options(nostack, preserves_flags));
            barriers();
        }
    }
}
