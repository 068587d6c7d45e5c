//! Structural invariants of both tree encodings over random point sets.

use proptest::prelude::*;
use svm_core::array_tree::ArrayTree;
use svm_core::kdtree::NodeSummary;
use svm_core::point::{BoundingBox, Point};
use svm_core::pointer_tree::PointerTree;

fn arb_points() -> impl Strategy<Value = Vec<Point<3>>> {
    prop::collection::vec(prop::array::uniform3(-5000i32..5000), 1..160)
        .prop_map(|coords| coords.into_iter().map(Point::new).collect())
}

fn clustered_points() -> impl Strategy<Value = Vec<Point<3>>> {
    // Few distinct values exercise the equal-to-threshold partition.
    prop::collection::vec(prop::array::uniform3(0i32..4), 2..80)
        .prop_map(|coords| coords.into_iter().map(Point::new).collect())
}

fn sum(left: &NodeSummary<3>, right: &NodeSummary<3>) -> (u32, Point<3>, i32) {
    (
        left.count + right.count,
        left.wgt_cent.wrapping_add(&right.wgt_cent),
        left.sum_sq.wrapping_add(right.sum_sq),
    )
}

fn build_both(points: &[Point<3>]) -> (PointerTree<3>, ArrayTree<3>, BoundingBox<3>) {
    let all: Vec<u32> = (0..points.len() as u32).collect();
    let enclosing = BoundingBox::enclosing(points, &all).unwrap();

    let mut idx = all.clone();
    let mut bbox = enclosing;
    let pointer = PointerTree::build(points, &mut idx, &mut bbox).unwrap();
    assert_eq!(bbox, enclosing);

    let mut idx = all;
    let array = ArrayTree::build(points, &mut idx, &mut bbox).unwrap();
    assert_eq!(bbox, enclosing);

    (pointer, array, enclosing)
}

fn check_pointer_nodes(tree: &PointerTree<3>, points: &[Point<3>]) -> Result<(), TestCaseError> {
    for node in tree.nodes() {
        match (node.left(), node.right()) {
            (Some(l), Some(r)) => {
                let (count, cent, sum_sq) = sum(&l.summary, &r.summary);
                prop_assert_eq!(node.summary.count, count);
                prop_assert_eq!(node.summary.wgt_cent, cent);
                prop_assert_eq!(node.summary.sum_sq, sum_sq);
                prop_assert_eq!(node.summary.bbox, l.summary.bbox.union(&r.summary.bbox));
            }
            (None, None) => {
                prop_assert_eq!(node.summary.count, 1);
                prop_assert!(points.contains(&node.summary.wgt_cent));
                prop_assert!(node.summary.bbox.contains(&node.summary.wgt_cent));
            }
            _ => prop_assert!(false, "node with a single child"),
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn root_covers_every_point(points in arb_points()) {
        let (pointer, array, enclosing) = build_both(&points);
        let n = points.len();

        let root = pointer.root().unwrap().summary;
        prop_assert_eq!(root.count as usize, n);
        prop_assert_eq!(root.bbox, enclosing);
        prop_assert_eq!(pointer.node_count(), 2 * n - 1);

        let root = array.record(array.root()).unwrap().summary;
        prop_assert_eq!(root.count as usize, n);
        prop_assert_eq!(root.bbox, enclosing);
        prop_assert_eq!(array.node_count(), 2 * n - 1);
        prop_assert!(array.root() != 0);
    }

    #[test]
    fn internal_nodes_aggregate_children(points in arb_points()) {
        let (pointer, array, _) = build_both(&points);
        check_pointer_nodes(&pointer, &points)?;

        for record in array.records() {
            if record.left == 0 && record.right == 0 {
                prop_assert_eq!(record.summary.count, 1);
                continue;
            }
            prop_assert!(record.left != 0 && record.right != 0);
            let l = array.record(record.left).unwrap().summary;
            let r = array.record(record.right).unwrap().summary;
            let (count, cent, sum_sq) = sum(&l, &r);
            prop_assert_eq!(record.summary.count, count);
            prop_assert_eq!(record.summary.wgt_cent, cent);
            prop_assert_eq!(record.summary.sum_sq, sum_sq);
            prop_assert_eq!(record.summary.bbox, l.bbox.union(&r.bbox));
        }
    }

    #[test]
    fn encodings_are_isomorphic(points in arb_points()) {
        let (pointer, array, _) = build_both(&points);
        let a: Vec<_> = pointer.preorder().collect();
        let b: Vec<_> = array.preorder().collect();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn duplicates_still_yield_one_leaf_per_point(points in clustered_points()) {
        let (pointer, array, _) = build_both(&points);
        check_pointer_nodes(&pointer, &points)?;
        let leaves = array.preorder().filter(|(_, s)| s.count == 1).count();
        prop_assert_eq!(leaves, points.len());
        prop_assert_eq!(pointer.teardown(), 2 * points.len() - 1);
    }
}

#[test]
fn four_point_scenario() {
    let points: Vec<Point<3>> = [1, 5, 2, 8].iter().map(|&x| Point::new([x, 0, 0])).collect();
    let (pointer, array, _) = build_both(&points);

    for root in [
        pointer.root().unwrap().summary,
        array.record(array.root()).unwrap().summary,
    ] {
        assert_eq!(root.count, 4);
        assert_eq!(root.sum_sq, 94);
        assert_eq!(root.wgt_cent, Point::new([16, 0, 0]));
    }

    let left = pointer.root().unwrap().left().unwrap();
    assert_eq!(left.summary.count, 2);
    assert_eq!(left.summary.bbox.hi.value[0], 4);
}
