//! Flat, slot-addressed encoding of the partition tree.
//!
//! Used when the accelerator cannot follow host pointers. The whole tree is
//! one buffer of fixed-stride records; children are referred to by slot
//! number and slot 0 means "no child". Slots are allocated in post-order, so
//! the root is always the last record written.

use crate::SvmError;
use crate::heap::SlotHeap;
use crate::kdtree::{self, NodeSink, NodeSummary};
use crate::point::{BoundingBox, Point};
use alloc::vec;
use alloc::vec::Vec;

/// One record of the flat encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord<const D: usize> {
    pub summary: NodeSummary<D>,
    pub left: u32,
    pub right: u32,
}

impl<const D: usize> NodeRecord<D> {
    /// Meaningful words per record: count, centroid, sum of squares, low
    /// corner, high corner, left, right.
    pub const WORDS: usize = 4 + 3 * D;

    /// Record stride, padded to a multiple of four words.
    pub const STRIDE: usize = (Self::WORDS + 3) & !3;

    /// Serialises the record into `out`, which must be `STRIDE` words long.
    /// Padding words are zeroed.
    pub fn write_words(&self, out: &mut [u32]) {
        let s = &self.summary;
        let coords = |p: &Point<D>| p.value.map(|c| c as u32);
        let fields = core::iter::once(s.count)
            .chain(coords(&s.wgt_cent))
            .chain(core::iter::once(s.sum_sq as u32))
            .chain(coords(&s.bbox.lo))
            .chain(coords(&s.bbox.hi))
            .chain([self.left, self.right])
            .chain(core::iter::repeat(0));

        for (word, value) in out[..Self::STRIDE].iter_mut().zip(fields) {
            *word = value;
        }
    }

    /// Decodes a record written by `write_words`.
    pub fn read_words(words: &[u32]) -> Self {
        let mut it = words.iter().copied();
        let mut next = || it.next().unwrap_or(0);

        let count = next();
        let mut summary = NodeSummary {
            count,
            wgt_cent: Point::default(),
            sum_sq: 0,
            bbox: BoundingBox::around(Point::default()),
        };
        for c in summary.wgt_cent.value.iter_mut() {
            *c = next() as i32;
        }
        summary.sum_sq = next() as i32;
        for c in summary.bbox.lo.value.iter_mut() {
            *c = next() as i32;
        }
        for c in summary.bbox.hi.value.iter_mut() {
            *c = next() as i32;
        }
        let left = next();
        let right = next();

        Self {
            summary,
            left,
            right,
        }
    }
}

/// Sink appending records to the slot heap.
struct SlotSink<const D: usize> {
    heap: SlotHeap,
}

impl<const D: usize> SlotSink<D> {
    fn push(&mut self, record: NodeRecord<D>) -> Result<u32, SvmError> {
        let slot = self.heap.alloc()?;
        let words = self.heap.slot_mut(slot).ok_or(SvmError::OutOfMemory)?;
        record.write_words(words);
        Ok(slot)
    }
}

impl<const D: usize> NodeSink<D> for SlotSink<D> {
    type Ref = u32;

    fn leaf(&mut self, summary: NodeSummary<D>) -> Result<u32, SvmError> {
        self.push(NodeRecord {
            summary,
            left: 0,
            right: 0,
        })
    }

    fn internal(
        &mut self,
        summary: NodeSummary<D>,
        left: u32,
        right: u32,
    ) -> Result<u32, SvmError> {
        self.push(NodeRecord {
            summary,
            left,
            right,
        })
    }
}

/// Flat partition tree backed by a slot heap.
pub struct ArrayTree<const D: usize> {
    heap: SlotHeap,
    root: u32,
}

impl<const D: usize> ArrayTree<D> {
    /// Builds the tree into a freshly reserved buffer of `2n` slots.
    ///
    /// # Arguments
    ///
    /// * `points` - Point storage
    /// * `idx` - Indices of the points to insert, permuted in place
    /// * `bbox` - Box covered by the root, restored on return
    ///
    /// # Returns
    ///
    /// The tree, `EmptyInput` for no points, or `OutOfMemory` if the buffer
    /// cannot be reserved.
    pub fn build(
        points: &[Point<D>],
        idx: &mut [u32],
        bbox: &mut BoundingBox<D>,
    ) -> Result<Self, SvmError> {
        if idx.is_empty() {
            return Err(SvmError::EmptyInput);
        }
        let slots = idx.len().checked_mul(2).ok_or(SvmError::OutOfMemory)?;
        let mut sink = SlotSink {
            heap: SlotHeap::new(NodeRecord::<D>::STRIDE, slots)?,
        };
        let (root, _) = kdtree::build(points, idx, bbox, &mut sink)?;
        Ok(Self {
            heap: sink.heap,
            root,
        })
    }

    /// Slot of the root record. Never 0.
    pub fn root(&self) -> u32 {
        self.root
    }

    /// Record at `slot`. `None` for slot 0 and unallocated slots.
    pub fn record(&self, slot: u32) -> Option<NodeRecord<D>> {
        self.heap.slot(slot).map(NodeRecord::read_words)
    }

    /// The whole buffer as handed to the accelerator.
    pub fn words(&self) -> &[u32] {
        self.heap.as_words()
    }

    /// Last allocated slot.
    pub fn heap_ptr(&self) -> u32 {
        self.heap.heap_ptr()
    }

    pub fn node_count(&self) -> usize {
        self.heap.heap_ptr() as usize
    }

    /// Pre-order walk yielding `(depth, summary)`, mirroring the pointer
    /// tree's traversal.
    pub fn preorder(&self) -> impl Iterator<Item = (usize, NodeSummary<D>)> + '_ {
        let mut stack = vec![(0usize, self.root)];
        core::iter::from_fn(move || {
            let (depth, slot) = stack.pop()?;
            let record = self.record(slot)?;
            if record.right != 0 {
                stack.push((depth + 1, record.right));
            }
            if record.left != 0 {
                stack.push((depth + 1, record.left));
            }
            Some((depth, record.summary))
        })
    }

    /// Releases the buffer as a unit and returns the number of records it
    /// held.
    pub fn teardown(self) -> usize {
        self.node_count()
    }

    /// Decodes every allocated record in slot order.
    pub fn records(&self) -> Vec<NodeRecord<D>> {
        (1..=self.heap_ptr())
            .filter_map(|slot| self.record(slot))
            .collect()
    }
}
