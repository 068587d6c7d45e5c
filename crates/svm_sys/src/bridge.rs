//! Facade tying the register service, the physical window, the table walk
//! and cache maintenance together for one process.

use crate::devmem::DevMem;
use crate::error::SysResult;
use crate::service::SysfsService;
use log::info;
use std::path::{Path, PathBuf};
use svm_common::Address;
use svm_common::protocol::RegisterSnapshot;
use svm_core::SvmError;
use svm_core::cache::CoherencyController;
use svm_core::phys::PhysicalMemory;
use svm_core::service::RegisterService;
use svm_core::translate::{FrameLookup, TableWalker, Walk, cross_check};

/// Software SVM bridge of the calling process.
///
/// The translation registers are captured once at construction; the
/// process's address space is assumed not to be switched afterwards.
pub struct SvmBridge<M = DevMem, S = SysfsService> {
    walker: TableWalker<M>,
    service: S,
    snapshot: RegisterSnapshot,
}

impl SvmBridge<DevMem, SysfsService> {
    /// Opens the driver attribute and the physical memory device.
    ///
    /// # Returns
    ///
    /// The bridge, `ServiceUnavailable` if the driver is not loaded, or
    /// `MapFailed` if the physical window cannot be opened.
    pub fn open(driver: impl Into<PathBuf>, devmem: impl AsRef<Path>) -> SysResult<Self> {
        let service = SysfsService::new(driver);
        let mem = DevMem::open(devmem)?;
        Self::with_parts(mem, service)
    }
}

impl<M: PhysicalMemory, S: RegisterService> SvmBridge<M, S> {
    /// Builds a bridge over an arbitrary window and service.
    pub fn with_parts(mem: M, mut service: S) -> SysResult<Self> {
        let snapshot = service.snapshot()?;
        let walker = TableWalker::new(mem, snapshot)?;
        info!(
            "SVM bridge up: TTBCR={:#010x} TTBR0={:#010x}",
            snapshot.ttbcr, snapshot.ttbr0
        );
        Ok(Self {
            walker,
            service,
            snapshot,
        })
    }

    /// Registers captured at construction.
    pub fn snapshot(&self) -> RegisterSnapshot {
        self.snapshot
    }

    pub fn translation_base(&self) -> Address {
        self.snapshot.ttbr0
    }

    pub fn translate(&mut self, va: Address) -> Result<Address, SvmError> {
        self.walker.translate(va)
    }

    pub fn translate_ptr<T>(&mut self, ptr: *const T) -> Result<Address, SvmError> {
        self.walker.translate_ptr(ptr)
    }

    pub fn walk(&mut self, va: Address) -> Result<Walk, SvmError> {
        self.walker.walk(va)
    }

    /// Translates `va` and checks the result against `lookup`.
    pub fn cross_check<L: FrameLookup + ?Sized>(
        &mut self,
        lookup: &mut L,
        va: Address,
    ) -> Result<Address, SvmError> {
        cross_check(&mut self.walker, lookup, va)
    }

    fn coherency(&mut self) -> CoherencyController<&mut M, &mut S> {
        CoherencyController::new(self.walker.memory_mut(), &mut self.service)
    }

    pub fn flush_line_l1(&mut self, va: Address) -> Result<Address, SvmError> {
        self.coherency().flush_line_l1(va)
    }

    pub fn flush_range_l1(&mut self, va: Address, len: usize) -> Result<usize, SvmError> {
        self.coherency().flush_range_l1(va, len)
    }

    pub fn flush_line_l2(&mut self, pa: Address) -> Result<Address, SvmError> {
        self.coherency().flush_line_l2(pa)
    }

    pub fn scu_enabled(&mut self) -> Result<bool, SvmError> {
        self.coherency().scu_enabled()
    }

    pub fn configure_coherent_access(&mut self, enabled: bool) -> Result<(), SvmError> {
        self.coherency().configure_coherent_access(enabled)
    }

    pub fn flush_tlb(&mut self) -> Result<bool, SvmError> {
        self.coherency().flush_tlb()
    }

    pub fn memory_mut(&mut self) -> &mut M {
        self.walker.memory_mut()
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }
}
