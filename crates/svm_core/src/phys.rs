//! Typed word access to physical memory.
//!
//! The bridge never casts physical addresses to pointers. Every table read
//! and peripheral write goes through `PhysicalMemory`, which on the board is a
//! window onto `/dev/mem` and in tests a `PhysArena` holding synthetic
//! translation tables and register files.

use crate::SvmError;
use alloc::vec;
use alloc::vec::Vec;
use svm_common::Address;

/// Word-granular access to the physical address space.
///
/// Implementations must perform each access exactly once and in program
/// order, since the targets include device registers with side effects.
pub trait PhysicalMemory {
    /// Reads the 32-bit word at physical address `pa`.
    fn read_u32(&mut self, pa: Address) -> Result<u32, SvmError>;

    /// Writes the 32-bit word at physical address `pa`.
    fn write_u32(&mut self, pa: Address, value: u32) -> Result<(), SvmError>;
}

impl<T: PhysicalMemory + ?Sized> PhysicalMemory for &mut T {
    fn read_u32(&mut self, pa: Address) -> Result<u32, SvmError> {
        (**self).read_u32(pa)
    }

    fn write_u32(&mut self, pa: Address, value: u32) -> Result<(), SvmError> {
        (**self).write_u32(pa, value)
    }
}

/// One contiguous region of a `PhysArena`.
struct Region {
    base: Address,
    words: Vec<u32>,
}

impl Region {
    fn end(&self) -> u64 {
        self.base as u64 + (self.words.len() as u64) * 4
    }

    fn index_of(&self, pa: Address) -> Option<usize> {
        if pa < self.base || (pa as u64) >= self.end() {
            return None;
        }
        Some(((pa - self.base) / 4) as usize)
    }
}

/// Synthetic physical address space made of zero-initialised regions.
///
/// Each region is an arena of words starting at a base address. Accesses
/// outside every region fail with `UnmappedPhysical`, mirroring a mapping
/// failure on the board.
#[derive(Default)]
pub struct PhysArena {
    regions: Vec<Region>,
    writes: usize,
}

impl PhysArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a region of `len` bytes at `base`. Both must be word aligned.
    pub fn with_region(mut self, base: Address, len: usize) -> Self {
        debug_assert!(base % 4 == 0 && len % 4 == 0);
        self.regions.push(Region {
            base,
            words: vec![0; len / 4],
        });
        self
    }

    /// Number of writes performed so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn locate(&self, pa: Address) -> Result<(usize, usize), SvmError> {
        if pa % 4 != 0 {
            return Err(SvmError::Misaligned(pa));
        }
        self.regions
            .iter()
            .enumerate()
            .find_map(|(r, region)| region.index_of(pa).map(|i| (r, i)))
            .ok_or(SvmError::UnmappedPhysical(pa))
    }
}

impl PhysicalMemory for PhysArena {
    fn read_u32(&mut self, pa: Address) -> Result<u32, SvmError> {
        let (r, i) = self.locate(pa)?;
        Ok(self.regions[r].words[i])
    }

    fn write_u32(&mut self, pa: Address, value: u32) -> Result<(), SvmError> {
        let (r, i) = self.locate(pa)?;
        self.regions[r].words[i] = value;
        self.writes += 1;
        Ok(())
    }
}
