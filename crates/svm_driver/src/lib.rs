//! Privileged side of the SVM register service.
//!
//! The kernel-resident driver exports a single pseudo-file. Reading it
//! returns the translation control and base registers plus a diagnostic
//! value; writing a command byte (and optional payload) runs a coherency or
//! maintenance operation. `RegisterFile` implements both halves of that
//! contract over the `Coprocessor` trait, so the same handler runs on the
//! CPU through `Cp15` and in tests through `SimulatedCoprocessor`.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[cfg(target_arch = "arm")]
pub mod cp15;
pub mod sim;

#[cfg(target_arch = "arm")]
pub use cp15::Cp15;
pub use sim::{CoprocessorOp, SimulatedCoprocessor};

use log::{debug, warn};
use svm_common::Address;
use svm_common::protocol::{
    COMMAND_LEN, Command, RegisterSnapshot, SNAPSHOT_LEN, TLB_FLUSH_MARKER, decode_payload,
};

/// SMP bit of the auxiliary control register.
pub const ACTLR_SMP: u32 = 1 << 6;

/// Non-secure access to the ACTLR.SMP bit.
pub const NSACR_NS_SMP: u32 = 1 << 18;

/// Supervisor-only register and maintenance operations.
///
/// Every method corresponds to a short CP15 instruction sequence and must
/// only be executed at PL1 or above.
pub trait Coprocessor {
    /// Reads TTBCR.
    fn read_ttbcr(&mut self) -> u32;

    /// Reads TTBR0.
    fn read_ttbr0(&mut self) -> u32;

    /// Sets ACTLR.SMP and NSACR.NS_SMP.
    ///
    /// # Returns
    ///
    /// The NSACR value before the update.
    fn enable_smp_coherency(&mut self) -> u32;

    /// Selects the L1 data cache and cleans and invalidates the line holding
    /// `mva`.
    ///
    /// # Returns
    ///
    /// The cache level selected for the operation.
    fn clean_invalidate_dcache_line(&mut self, mva: Address) -> u32;

    /// Invalidates the unified, data and instruction TLBs.
    fn invalidate_tlb_all(&mut self);
}

/// Show/store handler of the driver's pseudo-file.
pub struct RegisterFile<C> {
    cpu: C,
    diagnostic: Address,
}

impl<C: Coprocessor> RegisterFile<C> {
    pub const fn new(cpu: C) -> Self {
        Self { cpu, diagnostic: 0 }
    }

    /// Fills `buf` with TTBCR, TTBR0 and the diagnostic value, each four
    /// bytes little-endian.
    ///
    /// # Returns
    ///
    /// Number of bytes written. A buffer shorter than a full snapshot
    /// receives a truncated one.
    pub fn show(&mut self, buf: &mut [u8]) -> usize {
        let snapshot = RegisterSnapshot {
            ttbcr: self.cpu.read_ttbcr(),
            ttbr0: self.cpu.read_ttbr0(),
            diagnostic: self.diagnostic,
        };
        let len = buf.len().min(SNAPSHOT_LEN);
        buf[..len].copy_from_slice(&snapshot.to_bytes()[..len]);
        len
    }

    /// Executes the command in `buf`.
    ///
    /// Commands that need a payload but arrive without one, and unknown
    /// command bytes, are ignored.
    ///
    /// # Returns
    ///
    /// Always `buf.len()`: the whole write is consumed.
    pub fn store(&mut self, buf: &[u8]) -> usize {
        let Some(&byte) = buf.first() else {
            return 0;
        };
        let Some(command) = Command::from_byte(byte) else {
            warn!("svm_driver: unknown command {byte:#04x}");
            return buf.len();
        };

        let payload = if command.has_payload() {
            match decode_payload(buf) {
                Some(payload) => payload,
                None => {
                    warn!(
                        "svm_driver: {command:?} needs {COMMAND_LEN} bytes, got {}",
                        buf.len()
                    );
                    return buf.len();
                }
            }
        } else {
            0
        };

        self.diagnostic = match command {
            Command::EnableCoherency => self.cpu.enable_smp_coherency(),
            Command::CleanInvalidateLine => self.cpu.clean_invalidate_dcache_line(payload),
            Command::InvalidateTlb => {
                self.cpu.invalidate_tlb_all();
                TLB_FLUSH_MARKER
            }
        };
        debug!(
            "svm_driver: {command:?}({payload:#010x}) -> {:#010x}",
            self.diagnostic
        );
        buf.len()
    }

    /// Value reported in the third word of a read.
    pub fn diagnostic(&self) -> Address {
        self.diagnostic
    }

    pub fn coprocessor(&self) -> &C {
        &self.cpu
    }

    pub fn coprocessor_mut(&mut self) -> &mut C {
        &mut self.cpu
    }
}
