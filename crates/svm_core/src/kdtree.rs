//! Recursive construction of the weighted-centroid partition tree.
//!
//! Every node stores the number of points below it, their coordinate sum
//! (weighted centroid), the sum of their squared magnitudes and the bounding
//! box the node covers. Leaves hold exactly one point. The recursion is
//! shared by both tree encodings; a `NodeSink` decides how a finished node
//! is stored and what a child reference looks like.

use crate::SvmError;
use crate::point::{BoundingBox, Coord, Point};
use crate::split::split_bounding_box;

/// Aggregate data of one tree node.
///
/// The field order is the record layout read by the accelerator: count,
/// weighted centroid, sum of squares, low corner, high corner.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSummary<const D: usize> {
    pub count: u32,
    pub wgt_cent: Point<D>,
    pub sum_sq: Coord,
    pub bbox: BoundingBox<D>,
}

impl<const D: usize> NodeSummary<D> {
    /// Summary of a leaf holding point `p` inside `bbox`.
    pub fn leaf(p: Point<D>, bbox: BoundingBox<D>) -> Self {
        Self {
            count: 1,
            wgt_cent: p,
            sum_sq: p.dot(&p),
            bbox,
        }
    }

    /// Summary of an internal node from its children's summaries.
    pub fn merge(left: &Self, right: &Self, bbox: BoundingBox<D>) -> Self {
        Self {
            count: left.count.wrapping_add(right.count),
            wgt_cent: left.wgt_cent.wrapping_add(&right.wgt_cent),
            sum_sq: left.sum_sq.wrapping_add(right.sum_sq),
            bbox,
        }
    }
}

/// Storage strategy for finished nodes.
///
/// Children are always emitted before their parent.
pub trait NodeSink<const D: usize> {
    /// Handle through which a parent refers to a child.
    type Ref;

    fn leaf(&mut self, summary: NodeSummary<D>) -> Result<Self::Ref, SvmError>;

    fn internal(
        &mut self,
        summary: NodeSummary<D>,
        left: Self::Ref,
        right: Self::Ref,
    ) -> Result<Self::Ref, SvmError>;
}

/// Builds the tree over `idx` into `sink`.
///
/// `bbox` is narrowed while descending and restored before returning, so the
/// caller gets it back unchanged. The indices are permuted.
///
/// # Arguments
///
/// * `points` - Point storage the indices refer to
/// * `idx` - Indices of the points to insert
/// * `bbox` - Box covered by the root, normally the enclosing box
/// * `sink` - Node storage
///
/// # Returns
///
/// The root reference and summary, or `EmptyInput` for an empty index range.
pub fn build<const D: usize, S: NodeSink<D>>(
    points: &[Point<D>],
    idx: &mut [u32],
    bbox: &mut BoundingBox<D>,
    sink: &mut S,
) -> Result<(S::Ref, NodeSummary<D>), SvmError> {
    if idx.is_empty() {
        return Err(SvmError::EmptyInput);
    }
    if u32::try_from(idx.len()).is_err() {
        return Err(SvmError::OutOfMemory);
    }
    build_node(points, idx, bbox, sink)
}

fn build_node<const D: usize, S: NodeSink<D>>(
    points: &[Point<D>],
    idx: &mut [u32],
    bbox: &mut BoundingBox<D>,
    sink: &mut S,
) -> Result<(S::Ref, NodeSummary<D>), SvmError> {
    if idx.len() <= 1 {
        let summary = NodeSummary::leaf(points[idx[0] as usize], *bbox);
        return Ok((sink.leaf(summary)?, summary));
    }

    let split = split_bounding_box(points, idx, bbox);
    let (lo_idx, hi_idx) = idx.split_at_mut(split.n_lo);

    let hv = bbox.hi.value[split.dim];
    bbox.hi.value[split.dim] = split.value;
    let left = build_node(points, lo_idx, bbox, sink);
    bbox.hi.value[split.dim] = hv;
    let (left_ref, left_sum) = left?;

    let lv = bbox.lo.value[split.dim];
    bbox.lo.value[split.dim] = split.value;
    let right = build_node(points, hi_idx, bbox, sink);
    bbox.lo.value[split.dim] = lv;
    let (right_ref, right_sum) = right?;

    let summary = NodeSummary::merge(&left_sum, &right_sum, *bbox);
    Ok((sink.internal(summary, left_ref, right_ref)?, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    /// Records the emission order and the nodes' summaries.
    #[derive(Default)]
    struct Trace {
        nodes: Vec<(NodeSummary<3>, Option<(usize, usize)>)>,
    }

    impl NodeSink<3> for Trace {
        type Ref = usize;

        fn leaf(&mut self, summary: NodeSummary<3>) -> Result<usize, SvmError> {
            self.nodes.push((summary, None));
            Ok(self.nodes.len() - 1)
        }

        fn internal(
            &mut self,
            summary: NodeSummary<3>,
            left: usize,
            right: usize,
        ) -> Result<usize, SvmError> {
            self.nodes.push((summary, Some((left, right))));
            Ok(self.nodes.len() - 1)
        }
    }

    #[test]
    fn four_point_line() {
        let points: Vec<Point<3>> = [1, 5, 2, 8]
            .iter()
            .map(|&x| Point::new([x, 0, 0]))
            .collect();
        let mut idx = [0u32, 1, 2, 3];
        let mut bbox = BoundingBox::enclosing(&points, &idx).unwrap();
        let before = bbox;

        let mut sink = Trace::default();
        let (root, summary) = build(&points, &mut idx, &mut bbox, &mut sink).unwrap();

        assert_eq!(bbox, before);
        assert_eq!(root, sink.nodes.len() - 1);
        assert_eq!(sink.nodes.len(), 7);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.wgt_cent, Point::new([16, 0, 0]));
        assert_eq!(summary.sum_sq, 94);
        assert_eq!(summary.bbox, before);

        let (left, right) = sink.nodes[root].1.unwrap();
        let (l, r) = (sink.nodes[left].0, sink.nodes[right].0);
        assert_eq!((l.count, r.count), (2, 2));
        assert_eq!(l.bbox.hi.value[0], 4);
        assert_eq!(r.bbox.lo.value[0], 4);
        assert_eq!(l.wgt_cent.value[0] + r.wgt_cent.value[0], 16);
    }

    #[test]
    fn single_point_is_a_leaf() {
        let points = [Point::new([3, -4, 0])];
        let mut idx = [0u32];
        let mut bbox = BoundingBox::around(points[0]);
        let mut sink = Trace::default();
        let (_, summary) = build(&points, &mut idx, &mut bbox, &mut sink).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.sum_sq, 25);
        assert_eq!(sink.nodes.len(), 1);
    }

    #[test]
    fn empty_input_is_rejected() {
        let points: [Point<3>; 0] = [];
        let mut bbox = BoundingBox::around(Point::default());
        let mut sink = Trace::default();
        assert!(matches!(
            build(&points, &mut [], &mut bbox, &mut sink),
            Err(SvmError::EmptyInput)
        ));
    }
}
