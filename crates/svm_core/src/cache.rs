//! Cache maintenance and interconnect coherency configuration.
//!
//! Level-1 maintenance needs privileged instructions and goes through the
//! register service. Level-2 maintenance and the bridge configuration are
//! plain register writes through the physical memory window. Every
//! operation is bracketed by full barriers so that its effect is visible to
//! the accelerator before the next access.

use crate::SvmError;
use crate::barrier;
use crate::phys::PhysicalMemory;
use crate::service::RegisterService;
use log::{debug, info, warn};
use svm_common::Address;
use svm_common::geometry::{CACHE_LINE, line_align};
use svm_common::mmio::{
    AXCACHE_BYPASS, AXCACHE_COHERENT, AXI_CACHE_SECURITY_BRIDGE, AXPROT_DEFAULT, AXUSER_BYPASS,
    AXUSER_COHERENT, BRIDGE_ARCACHE, BRIDGE_ARPROT, BRIDGE_ARUSER, BRIDGE_AWCACHE, BRIDGE_AWPROT,
    BRIDGE_AWUSER, BRIDGE_RESERVED, L2_CACHE_CONTROLLER, L2_CLEAN_PA, L2_INVALIDATE_PA,
    SCU_CONTROLLER, SCU_ENABLE,
};
use svm_common::protocol::{Command, TLB_FLUSH_MARKER};

/// Cache and coherency controller over a physical window and the register
/// service.
pub struct CoherencyController<M, S> {
    mem: M,
    service: S,
}

impl<M: PhysicalMemory, S: RegisterService> CoherencyController<M, S> {
    pub fn new(mem: M, service: S) -> Self {
        Self { mem, service }
    }

    /// Cleans and invalidates the L1 data cache line holding `va`.
    ///
    /// Issues service command `0x02`. The reference board is known to become
    /// unstable under this command, so the primary workflow keeps coherency
    /// through the ACP and does not call it.
    ///
    /// # Returns
    ///
    /// The line-aligned address that was flushed.
    pub fn flush_line_l1(&mut self, va: Address) -> Result<Address, SvmError> {
        warn!("L1 clean+invalidate by address is unstable on the reference board");
        self.clean_invalidate_l1(va)
    }

    /// Flushes every L1 line overlapping `[va, va + len)`.
    ///
    /// Uses the same command as `flush_line_l1` but logs only at debug level,
    /// so callers flushing many ranges report the instability once.
    ///
    /// # Returns
    ///
    /// Number of lines flushed.
    pub fn flush_range_l1(&mut self, va: Address, len: usize) -> Result<usize, SvmError> {
        if len == 0 {
            return Ok(0);
        }
        debug!("L1 clean+invalidate of {len} bytes at {va:#010x}");

        let last = (va as u64 + len as u64 - 1).min(Address::MAX as u64) as Address;
        let mut line = line_align(va);
        let mut flushed = 0;
        loop {
            self.clean_invalidate_l1(line)?;
            flushed += 1;
            match line.checked_add(CACHE_LINE) {
                Some(next) if next <= last => line = next,
                _ => break,
            }
        }
        Ok(flushed)
    }

    fn clean_invalidate_l1(&mut self, va: Address) -> Result<Address, SvmError> {
        let line = line_align(va);
        barrier::full();
        self.service.command(Command::CleanInvalidateLine, line)?;
        barrier::full();
        debug!("L1 line {line:#010x} cleaned and invalidated");
        Ok(line)
    }

    /// Cleans then invalidates the L2 line holding physical address `pa`.
    ///
    /// # Returns
    ///
    /// The line-aligned physical address.
    pub fn flush_line_l2(&mut self, pa: Address) -> Result<Address, SvmError> {
        let line = line_align(pa);
        barrier::full();
        self.mem.write_u32(L2_CACHE_CONTROLLER + L2_CLEAN_PA, line)?;
        barrier::dsb();
        self.mem
            .write_u32(L2_CACHE_CONTROLLER + L2_INVALIDATE_PA, line)?;
        barrier::full();
        debug!("L2 line {line:#010x} cleaned and invalidated");
        Ok(line)
    }

    /// Whether the snoop control unit is enabled.
    pub fn scu_enabled(&mut self) -> Result<bool, SvmError> {
        let ctrl = self.mem.read_u32(SCU_CONTROLLER)?;
        Ok(ctrl & SCU_ENABLE != 0)
    }

    /// Routes accelerator transactions through (or around) the coherency
    /// port.
    ///
    /// Reports the SCU state, joins the CPU to the coherency domain through
    /// the register service and then overrides the cache, protection and
    /// user signals of the bridge. Calling it twice with the same argument
    /// leaves the system in the same state.
    ///
    /// # Arguments
    ///
    /// * `enabled` - Whether accelerator accesses should be cache coherent
    ///
    /// # Returns
    ///
    /// `ServiceUnavailable` without touching the bridge if the driver cannot
    /// be reached, or a window error.
    pub fn configure_coherent_access(&mut self, enabled: bool) -> Result<(), SvmError> {
        let scu = self.scu_enabled()?;
        if enabled && !scu {
            warn!("SCU disabled, ACP traffic will not be snooped");
        } else {
            debug!("SCU {}", if scu { "enabled" } else { "disabled" });
        }

        barrier::full();
        self.service.command(Command::EnableCoherency, 0)?;
        barrier::full();

        let (cache, user) = if enabled {
            (AXCACHE_COHERENT, AXUSER_COHERENT)
        } else {
            (AXCACHE_BYPASS, AXUSER_BYPASS)
        };

        let writes = [
            (BRIDGE_AWCACHE, cache),
            (BRIDGE_AWPROT, AXPROT_DEFAULT),
            (BRIDGE_AWUSER, user),
            (BRIDGE_ARCACHE, cache),
            (BRIDGE_ARPROT, AXPROT_DEFAULT),
            (BRIDGE_ARUSER, user),
            (BRIDGE_RESERVED, 0),
        ];
        for (offset, value) in writes {
            self.mem
                .write_u32(AXI_CACHE_SECURITY_BRIDGE + offset, value)?;
        }
        barrier::full();

        info!(
            "F2H ACP cacheable access is switched {}",
            if enabled { "on" } else { "off" }
        );
        Ok(())
    }

    /// Invalidates all TLBs and checks the driver's completion marker.
    ///
    /// # Returns
    ///
    /// `Ok(true)` when the marker was observed, `Ok(false)` when it was not.
    /// A missing marker is logged and is not an error.
    pub fn flush_tlb(&mut self) -> Result<bool, SvmError> {
        barrier::full();
        self.service.command(Command::InvalidateTlb, 0)?;
        barrier::full();

        let snapshot = self.service.snapshot()?;
        if snapshot.diagnostic == TLB_FLUSH_MARKER {
            debug!("TLB flushed");
            Ok(true)
        } else {
            warn!(
                "TLB flush not confirmed (diagnostic {:#x}, expected {:#x})",
                snapshot.diagnostic, TLB_FLUSH_MARKER
            );
            Ok(false)
        }
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub fn into_parts(self) -> (M, S) {
        (self.mem, self.service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys::PhysArena;
    use alloc::vec::Vec;
    use svm_common::protocol::RegisterSnapshot;

    #[derive(Default)]
    struct Recorder {
        commands: Vec<(Command, Address)>,
        diagnostic: Address,
        offline: bool,
    }

    impl RegisterService for Recorder {
        fn snapshot(&mut self) -> Result<RegisterSnapshot, SvmError> {
            if self.offline {
                return Err(SvmError::ServiceUnavailable);
            }
            Ok(RegisterSnapshot {
                diagnostic: self.diagnostic,
                ..RegisterSnapshot::default()
            })
        }

        fn command(&mut self, command: Command, payload: Address) -> Result<(), SvmError> {
            if self.offline {
                return Err(SvmError::ServiceUnavailable);
            }
            if command == Command::InvalidateTlb {
                self.diagnostic = TLB_FLUSH_MARKER;
            }
            self.commands.push((command, payload));
            Ok(())
        }
    }

    fn board() -> PhysArena {
        PhysArena::new()
            .with_region(SCU_CONTROLLER, 0x100)
            .with_region(L2_CACHE_CONTROLLER, 0x1000)
            .with_region(AXI_CACHE_SECURITY_BRIDGE, 0x20)
    }

    fn bridge(mem: &mut PhysArena) -> [u32; 7] {
        [
            BRIDGE_AWCACHE,
            BRIDGE_AWPROT,
            BRIDGE_AWUSER,
            BRIDGE_ARCACHE,
            BRIDGE_ARPROT,
            BRIDGE_ARUSER,
            BRIDGE_RESERVED,
        ]
        .map(|off| mem.read_u32(AXI_CACHE_SECURITY_BRIDGE + off).unwrap())
    }

    #[test]
    fn coherent_access_programs_bridge() {
        let mut mem = board();
        mem.write_u32(SCU_CONTROLLER, SCU_ENABLE).unwrap();
        mem.write_u32(AXI_CACHE_SECURITY_BRIDGE + BRIDGE_RESERVED, 0xDEAD)
            .unwrap();
        let mut service = Recorder::default();

        let mut ctl = CoherencyController::new(&mut mem, &mut service);
        assert!(ctl.scu_enabled().unwrap());
        ctl.configure_coherent_access(true).unwrap();
        ctl.configure_coherent_access(true).unwrap();

        assert_eq!(bridge(&mut mem), [0xF, 0x4, 0x1, 0xF, 0x4, 0x1, 0x0]);
        assert_eq!(service.commands[0], (Command::EnableCoherency, 0));

        CoherencyController::new(&mut mem, &mut service)
            .configure_coherent_access(false)
            .unwrap();
        assert_eq!(bridge(&mut mem), [0x1, 0x4, 0x0, 0x1, 0x4, 0x0, 0x0]);
    }

    #[test]
    fn missing_service_leaves_bridge_untouched() {
        let mut mem = board();
        let mut service = Recorder {
            offline: true,
            ..Recorder::default()
        };
        let result =
            CoherencyController::new(&mut mem, &mut service).configure_coherent_access(true);
        assert_eq!(result, Err(SvmError::ServiceUnavailable));
        assert_eq!(mem.write_count(), 0);
    }

    #[test]
    fn l2_flush_writes_clean_then_invalidate() {
        let mut mem = board();
        let mut service = Recorder::default();
        let line = CoherencyController::new(&mut mem, &mut service)
            .flush_line_l2(0x3F00_123C)
            .unwrap();
        assert_eq!(line, 0x3F00_1220);
        assert_eq!(
            mem.read_u32(L2_CACHE_CONTROLLER + L2_CLEAN_PA).unwrap(),
            0x3F00_1220
        );
        assert_eq!(
            mem.read_u32(L2_CACHE_CONTROLLER + L2_INVALIDATE_PA).unwrap(),
            0x3F00_1220
        );
        assert_eq!(mem.write_count(), 2);
    }

    #[test]
    fn l1_range_covers_every_line() {
        let mut mem = board();
        let mut service = Recorder::default();
        let mut ctl = CoherencyController::new(&mut mem, &mut service);
        assert_eq!(ctl.flush_range_l1(0x1000_001C, 8).unwrap(), 2);
        assert_eq!(ctl.flush_range_l1(0x1000_0000, 0).unwrap(), 0);
        assert_eq!(ctl.flush_line_l1(0x1000_0047).unwrap(), 0x1000_0040);
        assert_eq!(
            service.commands,
            [
                (Command::CleanInvalidateLine, 0x1000_0000),
                (Command::CleanInvalidateLine, 0x1000_0020),
                (Command::CleanInvalidateLine, 0x1000_0040),
            ]
        );
    }

    #[test]
    fn tlb_flush_checks_marker() {
        let mut mem = board();
        let mut service = Recorder::default();
        assert!(
            CoherencyController::new(&mut mem, &mut service)
                .flush_tlb()
                .unwrap()
        );

        struct Silent;
        impl RegisterService for Silent {
            fn snapshot(&mut self) -> Result<RegisterSnapshot, SvmError> {
                Ok(RegisterSnapshot::default())
            }
            fn command(&mut self, _: Command, _: Address) -> Result<(), SvmError> {
                Ok(())
            }
        }
        assert!(
            !CoherencyController::new(&mut mem, Silent)
                .flush_tlb()
                .unwrap()
        );
    }
}
