//! Manual walk of the ARMv7 short-descriptor translation tables.
//!
//! The accelerator reaches host memory through a path that bypasses the CPU's
//! MMU, so every host pointer it follows must be turned into a bus address by
//! repeating the hardware walk in software. The walk starts from the TTBR0
//! value captured through the register service, reads the level-1 descriptor
//! through the physical memory window, follows it to the level-2 table and
//! combines the page base with the in-page offset.
//!
//! Tables are owned by the operating system. The walker only ever reads them.

use crate::SvmError;
use crate::bit_utils::Bits;
use crate::phys::PhysicalMemory;
use log::{debug, trace};
use svm_common::Address;
use svm_common::geometry::{
    DESCRIPTOR_BYTES, L1_INDEX_BITS, L1_SHIFT, L1_TABLE_ALIGN_SHIFT, L2_INDEX_BITS, L2_SHIFT,
    L2_TABLE_ALIGN_SHIFT, LARGE_PAGE_SIZE, PAGE_OFFSET_MASK, SECTION_SIZE,
};
use svm_common::protocol::RegisterSnapshot;

/// Decoded translation table base control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttbcr(pub Address);

impl Ttbcr {
    /// EAE: the long-descriptor (LPAE) format is in use.
    pub fn long_descriptors(&self) -> bool {
        Bits::flag(self.0, 31)
    }

    /// PD1: walks through TTBR1 are disabled.
    pub fn pd1(&self) -> bool {
        Bits::flag(self.0, 5)
    }

    /// PD0: walks through TTBR0 are disabled.
    pub fn pd0(&self) -> bool {
        Bits::flag(self.0, 4)
    }

    /// N: width of the TTBR0/TTBR1 split.
    pub fn n(&self) -> u32 {
        Bits::field(self.0, 0, 3)
    }
}

/// Decoded translation table base register 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttbr0(pub Address);

impl Ttbr0 {
    /// Physical base of the level-1 table for a given TTBCR.N.
    pub fn table_base(&self, n: u32) -> Address {
        Bits::align_down(self.0, L1_TABLE_ALIGN_SHIFT - n)
    }

    /// S: table walks are to shareable memory.
    pub fn shareable(&self) -> bool {
        Bits::flag(self.0, 1)
    }
}

/// Type of a level-1 descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L1Kind {
    Fault,
    PageTable,
    Section,
    Supersection,
    Reserved,
}

/// A level-1 (first-level) descriptor word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L1Descriptor(pub u32);

impl L1Descriptor {
    pub fn kind(&self) -> L1Kind {
        match Bits::field(self.0, 0, 2) {
            0 => L1Kind::Fault,
            1 => L1Kind::PageTable,
            2 if Bits::flag(self.0, 18) => L1Kind::Supersection,
            2 => L1Kind::Section,
            _ => L1Kind::Reserved,
        }
    }

    /// NS bit of a page-table descriptor.
    pub fn non_secure(&self) -> bool {
        Bits::flag(self.0, 3)
    }

    /// Physical base of the level-2 table this descriptor points to.
    pub fn page_table_base(&self) -> Address {
        Bits::align_down(self.0, L2_TABLE_ALIGN_SHIFT)
    }

    /// Physical base of a 1 MiB section.
    pub fn section_base(&self) -> Address {
        Bits::align_down(self.0, L1_SHIFT)
    }
}

/// Type of a level-2 descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L2Kind {
    Fault,
    LargePage,
    SmallPage,
}

/// A level-2 (second-level) descriptor word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2Descriptor(pub u32);

impl L2Descriptor {
    pub fn kind(&self) -> L2Kind {
        match Bits::field(self.0, 0, 2) {
            0 => L2Kind::Fault,
            1 => L2Kind::LargePage,
            _ => L2Kind::SmallPage,
        }
    }

    pub fn bufferable(&self) -> bool {
        Bits::flag(self.0, 2)
    }

    pub fn cacheable(&self) -> bool {
        Bits::flag(self.0, 3)
    }

    /// AP[1:0] access permission bits.
    pub fn ap10(&self) -> u32 {
        Bits::field(self.0, 4, 2)
    }

    /// TEX[2:0] of a small page.
    pub fn tex(&self) -> u32 {
        Bits::field(self.0, 6, 3)
    }

    /// AP[2] access permission bit.
    pub fn ap2(&self) -> bool {
        Bits::flag(self.0, 9)
    }

    pub fn shareable(&self) -> bool {
        Bits::flag(self.0, 10)
    }

    /// Physical base of the mapped page; `None` for a fault entry.
    pub fn page_base(&self) -> Option<Address> {
        match self.kind() {
            L2Kind::Fault => None,
            L2Kind::LargePage => Some(Bits::align_down(self.0, 16)),
            L2Kind::SmallPage => Some(Bits::align_down(self.0, L2_SHIFT)),
        }
    }
}

/// Full record of one translation, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Walk {
    pub virt: Address,
    pub l1_address: Address,
    pub l1: L1Descriptor,
    /// Absent when the level-1 entry maps a section.
    pub l2_address: Option<Address>,
    pub l2: Option<L2Descriptor>,
    pub physical: Address,
}

/// Software translation-table walker.
///
/// Holds the translation registers captured once per process and the
/// physical memory window the tables are read through. The registers are
/// assumed not to change for the lifetime of the walker (no address-space
/// switch during a run).
pub struct TableWalker<M> {
    mem: M,
    ttbcr: Ttbcr,
    ttbr0: Ttbr0,
}

impl<M: PhysicalMemory> TableWalker<M> {
    /// Creates a walker from a register snapshot.
    ///
    /// # Arguments
    ///
    /// * `mem` - Physical memory window the tables are read through
    /// * `snapshot` - Registers captured from the privileged service
    ///
    /// # Returns
    ///
    /// The walker, or `UnsupportedFormat` if the long-descriptor format is
    /// enabled.
    pub fn new(mem: M, snapshot: RegisterSnapshot) -> Result<Self, SvmError> {
        let ttbcr = Ttbcr(snapshot.ttbcr);
        let ttbr0 = Ttbr0(snapshot.ttbr0);

        debug!(
            "TTBCR={:#010x} (EAE={}, PD1={}, PD0={}, N={}), TTBR0={:#010x} (base={:#010x}, S={})",
            ttbcr.0,
            ttbcr.long_descriptors() as u8,
            ttbcr.pd1() as u8,
            ttbcr.pd0() as u8,
            ttbcr.n(),
            ttbr0.0,
            ttbr0.table_base(ttbcr.n()),
            ttbr0.shareable() as u8
        );

        if ttbcr.long_descriptors() {
            return Err(SvmError::UnsupportedFormat);
        }

        Ok(Self { mem, ttbcr, ttbr0 })
    }

    /// Walks the tables for `va` and returns every intermediate value.
    ///
    /// # Arguments
    ///
    /// * `va` - Virtual address in the calling process
    ///
    /// # Returns
    ///
    /// The walk record, or an error if a descriptor on the path is a fault,
    /// the address belongs to TTBR1, or the window cannot reach a table.
    pub fn walk(&mut self, va: Address) -> Result<Walk, SvmError> {
        let n = self.ttbcr.n();
        if n > 0 && (va >> (Address::BITS - n)) != 0 {
            return Err(SvmError::UnsupportedFormat);
        }

        let l1_index = Bits::field(va, L1_SHIFT, L1_INDEX_BITS - n);
        let l1_address = self.ttbr0.table_base(n) | (l1_index * DESCRIPTOR_BYTES);
        let l1 = L1Descriptor(self.mem.read_u32(l1_address)?);

        trace!(
            "va={:#010x}: l1 desc @ {:#010x} = {:#010x} ({:?}, NS={})",
            va,
            l1_address,
            l1.0,
            l1.kind(),
            l1.non_secure() as u8
        );

        match l1.kind() {
            L1Kind::PageTable => {}
            L1Kind::Section => {
                return Ok(Walk {
                    virt: va,
                    l1_address,
                    l1,
                    l2_address: None,
                    l2: None,
                    physical: l1.section_base() | (va & (SECTION_SIZE - 1)),
                });
            }
            L1Kind::Supersection => return Err(SvmError::UnsupportedFormat),
            L1Kind::Fault | L1Kind::Reserved => {
                return Err(SvmError::TranslationFault {
                    level: 1,
                    address: va,
                });
            }
        }

        let l2_index = Bits::field(va, L2_SHIFT, L2_INDEX_BITS);
        let l2_address = l1.page_table_base() | (l2_index * DESCRIPTOR_BYTES);
        let l2 = L2Descriptor(self.mem.read_u32(l2_address)?);

        trace!(
            "va={:#010x}: l2 desc @ {:#010x} = {:#010x} ({:?}, AP2={}, AP10={}, B={}, C={}, TEX={}, S={})",
            va,
            l2_address,
            l2.0,
            l2.kind(),
            l2.ap2() as u8,
            l2.ap10(),
            l2.bufferable() as u8,
            l2.cacheable() as u8,
            l2.tex(),
            l2.shareable() as u8
        );

        let physical = match (l2.kind(), l2.page_base()) {
            (L2Kind::SmallPage, Some(base)) => base | (va & PAGE_OFFSET_MASK),
            (L2Kind::LargePage, Some(base)) => base | (va & (LARGE_PAGE_SIZE - 1)),
            _ => {
                return Err(SvmError::TranslationFault {
                    level: 2,
                    address: va,
                });
            }
        };

        Ok(Walk {
            virt: va,
            l1_address,
            l1,
            l2_address: Some(l2_address),
            l2: Some(l2),
            physical,
        })
    }

    /// Translates a virtual address to the physical address the accelerator
    /// must issue.
    pub fn translate(&mut self, va: Address) -> Result<Address, SvmError> {
        self.walk(va).map(|walk| walk.physical)
    }

    /// Translates a host pointer. Pointers wider than the register width are
    /// rejected rather than truncated.
    pub fn translate_ptr<T>(&mut self, ptr: *const T) -> Result<Address, SvmError> {
        let va = Address::try_from(ptr as usize).map_err(|_| SvmError::UnsupportedFormat)?;
        self.translate(va)
    }

    pub fn ttbcr(&self) -> Ttbcr {
        self.ttbcr
    }

    pub fn ttbr0(&self) -> Ttbr0 {
        self.ttbr0
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    pub fn into_inner(self) -> M {
        self.mem
    }
}

/// OS-assisted virtual-to-physical lookup.
///
/// On Linux this is the process pagemap. It is only reliable for addresses
/// backed by ordinary anonymous or file mappings, not for windows created
/// over `/dev/mem`.
pub trait FrameLookup {
    fn physical_address(&mut self, va: Address) -> Result<Address, SvmError>;
}

/// Translates `va` both ways and fails if the answers differ.
///
/// # Returns
///
/// The agreed physical address, or `TranslationMismatch`.
pub fn cross_check<M: PhysicalMemory, L: FrameLookup + ?Sized>(
    walker: &mut TableWalker<M>,
    lookup: &mut L,
    va: Address,
) -> Result<Address, SvmError> {
    let walked = walker.translate(va)?;
    let reported = lookup.physical_address(va)?;
    if walked != reported {
        return Err(SvmError::TranslationMismatch {
            virt: va,
            walked,
            reported,
        });
    }
    debug!("va={va:#010x} -> pa={walked:#010x} (walk and OS agree)");
    Ok(walked)
}
