//! Fixed-capacity slot heap for the flat tree encoding.
//!
//! The flat encoding stores every node as a fixed-stride record of 32-bit
//! words in one contiguous buffer that can be handed to the accelerator as a
//! single allocation. Records are addressed by slot number. The heap pointer
//! is pre-incremented on allocation, so slot 0 is never handed out and a
//! child reference of 0 unambiguously means "no child".

use crate::SvmError;
use alloc::vec::Vec;

/// Slot-addressed record buffer with a bump-style heap pointer.
///
/// The whole buffer is reserved and zeroed up front; allocation only moves
/// the heap pointer. Slots are never freed individually, the buffer is
/// released as a unit when the heap is dropped.
pub struct SlotHeap {
    /// Backing words, `stride * capacity` long.
    words: Vec<u32>,

    /// Record size in words.
    stride: usize,

    /// Number of slots, including the reserved slot 0.
    capacity: usize,

    /// Index of the last allocated slot. 0 while empty.
    next: usize,
}

impl SlotHeap {
    /// Reserves a zeroed buffer of `slots` records of `stride` words.
    ///
    /// # Arguments
    ///
    /// * `stride` - Record size in 32-bit words
    /// * `slots` - Number of slots, including the reserved slot 0
    ///
    /// # Returns
    ///
    /// The empty heap, or `OutOfMemory` if the buffer cannot be reserved.
    pub fn new(stride: usize, slots: usize) -> Result<Self, SvmError> {
        let len = stride.checked_mul(slots).ok_or(SvmError::OutOfMemory)?;
        let mut words = Vec::new();
        words
            .try_reserve_exact(len)
            .map_err(|_| SvmError::OutOfMemory)?;
        words.resize(len, 0);

        Ok(Self {
            words,
            stride,
            capacity: slots,
            next: 0,
        })
    }

    /// Allocates the next slot.
    ///
    /// # Returns
    ///
    /// The slot number (always at least 1), or `OutOfMemory` once every slot
    /// has been handed out.
    pub fn alloc(&mut self) -> Result<u32, SvmError> {
        let slot = self.next + 1;
        if slot >= self.capacity {
            return Err(SvmError::OutOfMemory);
        }
        let slot_ref = u32::try_from(slot).map_err(|_| SvmError::OutOfMemory)?;
        self.next = slot;
        Ok(slot_ref)
    }

    /// Words of an allocated slot. `None` for slot 0 or unallocated slots.
    pub fn slot(&self, slot: u32) -> Option<&[u32]> {
        let range = self.range(slot)?;
        Some(&self.words[range])
    }

    pub fn slot_mut(&mut self, slot: u32) -> Option<&mut [u32]> {
        let range = self.range(slot)?;
        Some(&mut self.words[range])
    }

    fn range(&self, slot: u32) -> Option<core::ops::Range<usize>> {
        let slot = slot as usize;
        if slot == 0 || slot > self.next {
            return None;
        }
        let start = slot * self.stride;
        Some(start..start + self.stride)
    }

    /// Index of the last allocated slot, which is also the number of
    /// allocated records.
    pub fn heap_ptr(&self) -> u32 {
        self.next as u32
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The whole buffer, reserved slot included, as handed to the accelerator.
    pub fn as_words(&self) -> &[u32] {
        &self.words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_zero_is_never_allocated() {
        let mut heap = SlotHeap::new(4, 4).unwrap();
        assert_eq!(heap.alloc(), Ok(1));
        assert_eq!(heap.alloc(), Ok(2));
        assert_eq!(heap.alloc(), Ok(3));
        assert_eq!(heap.alloc(), Err(SvmError::OutOfMemory));
        assert_eq!(heap.heap_ptr(), 3);
        assert!(heap.slot(0).is_none());
    }

    #[test]
    fn slots_are_disjoint_views() {
        let mut heap = SlotHeap::new(2, 3).unwrap();
        let a = heap.alloc().unwrap();
        let b = heap.alloc().unwrap();
        heap.slot_mut(a).unwrap().copy_from_slice(&[1, 2]);
        heap.slot_mut(b).unwrap().copy_from_slice(&[3, 4]);
        assert_eq!(heap.as_words(), &[0, 0, 1, 2, 3, 4]);
        assert!(heap.slot(3).is_none());
    }

    #[test]
    fn oversized_request_is_out_of_memory() {
        assert!(matches!(
            SlotHeap::new(usize::MAX, 2),
            Err(SvmError::OutOfMemory)
        ));
    }
}
