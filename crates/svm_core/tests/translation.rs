//! Manual table walk against an OS-style page-to-frame lookup.
//!
//! A synthetic two-level table is populated from the same page map the
//! lookup reports, so both paths must agree on every mapped address.

use std::collections::BTreeMap;
use svm_common::Address;
use svm_common::protocol::RegisterSnapshot;
use svm_core::SvmError;
use svm_core::phys::{PhysArena, PhysicalMemory};
use svm_core::translate::{FrameLookup, TableWalker, cross_check};

const L1_BASE: Address = 0x0800_0000;
const L2_POOL: Address = 0x0810_0000;
const L2_TABLE_BYTES: Address = 0x400;

/// Page number to frame number, as a pagemap would report it.
struct PageMap(BTreeMap<Address, Address>);

impl FrameLookup for PageMap {
    fn physical_address(&mut self, va: Address) -> Result<Address, SvmError> {
        self.0
            .get(&(va >> 12))
            .map(|pfn| (pfn << 12) | (va & 0xFFF))
            .ok_or(SvmError::TranslationFault { level: 0, address: va })
    }
}

/// Writes level-1 and level-2 descriptors for every page in `map`.
fn populate(map: &PageMap) -> PhysArena {
    let mut mem = PhysArena::new()
        .with_region(L1_BASE, 0x4000)
        .with_region(L2_POOL, 16 * L2_TABLE_BYTES as usize);

    let mut tables: BTreeMap<Address, Address> = BTreeMap::new();
    for (&page, &frame) in &map.0 {
        let l1_index = page >> 8;
        let next = L2_POOL + tables.len() as Address * L2_TABLE_BYTES;
        let table = *tables.entry(l1_index).or_insert(next);
        mem.write_u32(L1_BASE + l1_index * 4, table | 0b01).unwrap();
        mem.write_u32(table + (page & 0xFF) * 4, (frame << 12) | 0b10)
            .unwrap();
    }
    mem
}

fn walker(mem: PhysArena) -> TableWalker<PhysArena> {
    let snapshot = RegisterSnapshot {
        ttbcr: 0,
        ttbr0: L1_BASE | 0x59,
        diagnostic: 0,
    };
    TableWalker::new(mem, snapshot).unwrap()
}

fn sample_map() -> PageMap {
    PageMap(
        [
            (0x0001_0, 0x3F123),
            (0x0001_1, 0x01000),
            (0x7EFF_F, 0x2AAAA),
            (0xB6F0_0, 0x00042),
            (0xB6F0_1, 0x00041),
        ]
        .into_iter()
        .collect(),
    )
}

#[test]
fn walk_agrees_with_lookup() {
    let mut map = sample_map();
    let mut walker = walker(populate(&map));

    let pages: Vec<Address> = map.0.keys().copied().collect();
    for page in pages {
        for offset in [0, 4, 0x7FC, 0xFFC] {
            let va = (page << 12) | offset;
            let pa = cross_check(&mut walker, &mut map, va).unwrap();
            assert_eq!(pa & 0xFFF, offset);
            assert_eq!(walker.translate(va).unwrap(), pa);
        }
    }
}

#[test]
fn disagreement_is_reported() {
    let mut map = sample_map();
    let mut walker = walker(populate(&map));
    map.0.insert(0x0001_0, 0x3F124);

    let err = cross_check(&mut walker, &mut map, 0x0001_0010).unwrap_err();
    assert_eq!(
        err,
        SvmError::TranslationMismatch {
            virt: 0x0001_0010,
            walked: 0x3F12_3010,
            reported: 0x3F12_4010,
        }
    );
}

#[test]
fn unmapped_pages_fault_at_the_right_level() {
    let map = sample_map();
    let mut walker = walker(populate(&map));

    // Same level-1 entry as a mapped page, empty level-2 slot.
    assert!(matches!(
        walker.translate(0x0001_2000),
        Err(SvmError::TranslationFault { level: 2, .. })
    ));
    // No level-2 table at all.
    assert!(matches!(
        walker.translate(0x4000_0000),
        Err(SvmError::TranslationFault { level: 1, .. })
    ));
}

#[test]
fn walk_reports_descriptor_addresses() {
    let map = sample_map();
    let mut walker = walker(populate(&map));

    let walk = walker.walk(0x7EFF_F123).unwrap();
    assert_eq!(walk.l1_address, L1_BASE + (0x7EF << 2));
    assert_eq!(walk.physical, 0x2AAA_A123);
    let l2_address = walk.l2_address.unwrap();
    assert_eq!(l2_address & 0x3FF, 0xFF << 2);
    assert_eq!(
        walker.memory_mut().read_u32(l2_address).unwrap() & !0xFFF,
        0x2AAA_A000
    );
}
