//! Pointer-linked encoding of the partition tree.
//!
//! Nodes are individual heap allocations linked by owning pointers. With the
//! SVM bridge in place the accelerator receives the root's virtual address
//! and follows the links itself, translating each one with the table walk.
//! The node layout is therefore fixed: the summary record followed by the
//! two child pointers, null for a leaf.

use crate::SvmError;
use crate::kdtree::{self, NodeSink, NodeSummary};
use crate::point::{BoundingBox, Point};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

/// One node of the pointer-linked tree.
#[repr(C)]
#[derive(Debug)]
pub struct KdNode<const D: usize> {
    pub summary: NodeSummary<D>,
    left: Option<Box<KdNode<D>>>,
    right: Option<Box<KdNode<D>>>,
}

impl<const D: usize> KdNode<D> {
    pub fn left(&self) -> Option<&KdNode<D>> {
        self.left.as_deref()
    }

    pub fn right(&self) -> Option<&KdNode<D>> {
        self.right.as_deref()
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Sink allocating one box per node.
#[derive(Default)]
struct BoxSink {
    allocated: usize,
}

impl<const D: usize> NodeSink<D> for BoxSink {
    type Ref = Box<KdNode<D>>;

    fn leaf(&mut self, summary: NodeSummary<D>) -> Result<Self::Ref, SvmError> {
        self.allocated += 1;
        Ok(Box::new(KdNode {
            summary,
            left: None,
            right: None,
        }))
    }

    fn internal(
        &mut self,
        summary: NodeSummary<D>,
        left: Self::Ref,
        right: Self::Ref,
    ) -> Result<Self::Ref, SvmError> {
        self.allocated += 1;
        Ok(Box::new(KdNode {
            summary,
            left: Some(left),
            right: Some(right),
        }))
    }
}

/// Pointer-linked partition tree.
///
/// Dropping the tree releases every node exactly once without recursion.
pub struct PointerTree<const D: usize> {
    root: Option<Box<KdNode<D>>>,
    nodes: usize,
}

impl<const D: usize> PointerTree<D> {
    /// Builds the tree over the indexed points.
    ///
    /// # Arguments
    ///
    /// * `points` - Point storage
    /// * `idx` - Indices of the points to insert, permuted in place
    /// * `bbox` - Box covered by the root, restored on return
    pub fn build(
        points: &[Point<D>],
        idx: &mut [u32],
        bbox: &mut BoundingBox<D>,
    ) -> Result<Self, SvmError> {
        let mut sink = BoxSink::default();
        let (root, _) = kdtree::build(points, idx, bbox, &mut sink)?;
        Ok(Self {
            root: Some(root),
            nodes: sink.allocated,
        })
    }

    pub fn root(&self) -> Option<&KdNode<D>> {
        self.root.as_deref()
    }

    /// Virtual address of the root node, the argument handed to the
    /// accelerator.
    pub fn root_address(&self) -> Option<usize> {
        self.root().map(|node| node as *const KdNode<D> as usize)
    }

    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Size in bytes of one node as laid out in memory.
    pub const fn node_size() -> usize {
        core::mem::size_of::<KdNode<D>>()
    }

    /// Pre-order walk yielding `(depth, summary)`.
    pub fn preorder(&self) -> Preorder<'_, D> {
        Preorder {
            stack: self.root().map(|r| vec![(0, r)]).unwrap_or_default(),
        }
    }

    /// Nodes in pre-order.
    pub fn nodes(&self) -> impl Iterator<Item = &KdNode<D>> + '_ {
        Nodes {
            stack: self.root().map(|r| vec![r]).unwrap_or_default(),
        }
    }

    /// Virtual addresses of every node, for cache maintenance.
    pub fn node_addresses(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes().map(|node| node as *const KdNode<D> as usize)
    }

    /// Releases every node and returns how many were freed.
    pub fn teardown(mut self) -> usize {
        let freed = release(self.root.take());
        self.nodes = 0;
        freed
    }
}

impl<const D: usize> Drop for PointerTree<D> {
    fn drop(&mut self) {
        release(self.root.take());
    }
}

/// Frees a subtree with an explicit stack. Children are detached before
/// their parent is dropped, so no drop ever recurses.
fn release<const D: usize>(root: Option<Box<KdNode<D>>>) -> usize {
    let mut stack: Vec<Box<KdNode<D>>> = root.into_iter().collect();
    let mut freed = 0;
    while let Some(mut node) = stack.pop() {
        stack.extend(node.left.take());
        stack.extend(node.right.take());
        drop(node);
        freed += 1;
    }
    freed
}

/// Pre-order iterator over a pointer tree.
pub struct Preorder<'a, const D: usize> {
    stack: Vec<(usize, &'a KdNode<D>)>,
}

impl<const D: usize> Iterator for Preorder<'_, D> {
    type Item = (usize, NodeSummary<D>);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        if let Some(right) = node.right() {
            self.stack.push((depth + 1, right));
        }
        if let Some(left) = node.left() {
            self.stack.push((depth + 1, left));
        }
        Some((depth, node.summary))
    }
}

struct Nodes<'a, const D: usize> {
    stack: Vec<&'a KdNode<D>>,
}

impl<'a, const D: usize> Iterator for Nodes<'a, D> {
    type Item = &'a KdNode<D>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.right());
        self.stack.extend(node.left());
        Some(node)
    }
}
