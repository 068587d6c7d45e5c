use svm_common::Address;
use svm_common::mmio::{
    AXCACHE_COHERENT, AXI_CACHE_SECURITY_BRIDGE, BRIDGE_ARCACHE, BRIDGE_AWCACHE,
    L2_CACHE_CONTROLLER, L2_CLEAN_PA, L2_INVALIDATE_PA, SCU_CONTROLLER, SCU_ENABLE,
};
use svm_core::SvmError;
use svm_core::phys::{PhysArena, PhysicalMemory};
use svm_core::service::translation_base;
use svm_driver::{CoprocessorOp, SimulatedCoprocessor};
use svm_sys::service::{LoopbackService, SysfsService};
use svm_sys::{SvmBridge, SysError};

const L1_BASE: Address = 0x0040_0000;
const L2_BASE: Address = 0x0050_0000;

/// Board with one page table mapping 0x1000_0000..0x1000_FFFF onto
/// 0x3000_0000 upward, plus the coherency peripherals.
fn board() -> PhysArena {
    let mut mem = PhysArena::new()
        .with_region(L1_BASE, 0x4000)
        .with_region(L2_BASE, 0x400)
        .with_region(SCU_CONTROLLER, 0x100)
        .with_region(L2_CACHE_CONTROLLER, 0x1000)
        .with_region(AXI_CACHE_SECURITY_BRIDGE, 0x20);
    mem.write_u32(L1_BASE + 0x100 * 4, L2_BASE | 0b01).unwrap();
    for page in 0..16 {
        let frame = 0x3000_0000 + page * 0x1000;
        mem.write_u32(L2_BASE + page * 4, frame | 0b10).unwrap();
    }
    mem.write_u32(SCU_CONTROLLER, SCU_ENABLE).unwrap();
    mem
}

fn bridge() -> SvmBridge<PhysArena, LoopbackService<SimulatedCoprocessor>> {
    let cpu = SimulatedCoprocessor::new(0, L1_BASE | 0x4A);
    SvmBridge::with_parts(board(), LoopbackService::new(cpu)).unwrap()
}

#[test]
fn translates_through_loopback_driver() {
    let mut svm = bridge();
    assert_eq!(svm.translation_base(), L1_BASE | 0x4A);
    assert_eq!(svm.translate(0x1000_0123).unwrap(), 0x3000_0123);
    assert_eq!(svm.translate(0x1000_F004).unwrap(), 0x3000_F004);

    let walk = svm.walk(0x1000_2000).unwrap();
    assert_eq!(walk.l2_address, Some(L2_BASE + 8));
    assert_eq!(
        svm.translate(0x2000_0000),
        Err(SvmError::TranslationFault {
            level: 1,
            address: 0x2000_0000
        })
    );
}

#[test]
fn maintenance_reaches_driver_and_controllers() {
    let mut svm = bridge();

    assert!(svm.scu_enabled().unwrap());
    svm.configure_coherent_access(true).unwrap();
    let mem = svm.memory_mut();
    assert_eq!(
        mem.read_u32(AXI_CACHE_SECURITY_BRIDGE + BRIDGE_AWCACHE).unwrap(),
        AXCACHE_COHERENT
    );
    assert_eq!(
        mem.read_u32(AXI_CACHE_SECURITY_BRIDGE + BRIDGE_ARCACHE).unwrap(),
        AXCACHE_COHERENT
    );

    assert_eq!(svm.flush_line_l2(0x3000_0047).unwrap(), 0x3000_0040);
    let mem = svm.memory_mut();
    assert_eq!(mem.read_u32(L2_CACHE_CONTROLLER + L2_CLEAN_PA).unwrap(), 0x3000_0040);
    assert_eq!(mem.read_u32(L2_CACHE_CONTROLLER + L2_INVALIDATE_PA).unwrap(), 0x3000_0040);

    assert_eq!(svm.flush_line_l1(0x1000_0021).unwrap(), 0x1000_0020);
    assert!(svm.flush_tlb().unwrap());

    let ops = svm.service_mut().register_file().coprocessor().ops().to_vec();
    assert_eq!(
        ops,
        vec![
            CoprocessorOp::EnableSmp,
            CoprocessorOp::CleanInvalidateLine(0x1000_0020),
            CoprocessorOp::InvalidateTlb,
        ]
    );
}

#[test]
fn missing_driver_disables_the_pointer_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut service = SysfsService::new(dir.path().join("svm_driver"));
    assert_eq!(translation_base(&mut service), 0);

    let err = SvmBridge::with_parts(board(), service).err().unwrap();
    assert!(matches!(err, SysError::Svm(SvmError::ServiceUnavailable)));
}

#[test]
fn missing_devmem_is_a_map_failure() {
    let dir = tempfile::tempdir().unwrap();
    let err = SvmBridge::open(dir.path().join("svm_driver"), dir.path().join("mem"))
        .err()
        .unwrap();
    assert!(matches!(err, SysError::MapFailed { .. }));
}
