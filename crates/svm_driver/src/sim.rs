//! Software coprocessor for exercising the register file off target.

use crate::{ACTLR_SMP, Coprocessor, NSACR_NS_SMP};
use alloc::vec::Vec;
use svm_common::Address;

/// One operation executed on a `SimulatedCoprocessor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoprocessorOp {
    EnableSmp,
    CleanInvalidateLine(Address),
    InvalidateTlb,
}

/// Register state plus a log of every maintenance operation.
///
/// Register reads are not logged.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCoprocessor {
    pub ttbcr: u32,
    pub ttbr0: u32,
    pub actlr: u32,
    pub nsacr: u32,
    ops: Vec<CoprocessorOp>,
}

impl SimulatedCoprocessor {
    pub fn new(ttbcr: u32, ttbr0: u32) -> Self {
        Self {
            ttbcr,
            ttbr0,
            ..Self::default()
        }
    }

    pub fn ops(&self) -> &[CoprocessorOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }
}

impl Coprocessor for SimulatedCoprocessor {
    fn read_ttbcr(&mut self) -> u32 {
        self.ttbcr
    }

    fn read_ttbr0(&mut self) -> u32 {
        self.ttbr0
    }

    fn enable_smp_coherency(&mut self) -> u32 {
        self.ops.push(CoprocessorOp::EnableSmp);
        self.actlr |= ACTLR_SMP;
        let prior = self.nsacr;
        self.nsacr |= NSACR_NS_SMP;
        prior
    }

    fn clean_invalidate_dcache_line(&mut self, mva: Address) -> u32 {
        self.ops.push(CoprocessorOp::CleanInvalidateLine(mva));
        0
    }

    fn invalidate_tlb_all(&mut self) {
        self.ops.push(CoprocessorOp::InvalidateTlb);
    }
}
