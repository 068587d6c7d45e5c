//! Splitting rule of the partition tree.
//!
//! A node is split across the longest edge of its bounding box at the
//! midpoint, clamped into the range actually occupied by its points. The
//! index range is then partitioned in place, Wirth style, into the points
//! below, equal to and above the threshold.

use crate::point::{BoundingBox, Coord, Point, find_min_max};

/// Outcome of splitting one index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    /// Number of indices that go to the low child.
    pub n_lo: usize,
    /// Split dimension.
    pub dim: usize,
    /// Split threshold.
    pub value: Coord,
}

/// Chooses a split and partitions `idx` around it.
///
/// After the call `idx[..n_lo]` holds the low child's points and
/// `idx[n_lo..]` the high child's. For at least two points both sides are
/// non-empty.
///
/// # Arguments
///
/// * `points` - Point storage the indices refer to
/// * `idx` - Index range to split, permuted in place
/// * `bbox` - Current bounding box of the node
pub fn split_bounding_box<const D: usize>(
    points: &[Point<D>],
    idx: &mut [u32],
    bbox: &BoundingBox<D>,
) -> Split {
    let n = idx.len();
    let dim = bbox.longest_axis();
    let ideal = ((bbox.hi.value[dim] as i64 + bbox.lo.value[dim] as i64) / 2) as Coord;

    let (min, max) = find_min_max(points, idx, dim).unwrap_or((ideal, ideal));
    let threshold = ideal.clamp(min, max);

    let coord = |idx: &[u32], i: isize| points[idx[i as usize] as usize].value[dim];
    let last = n as isize - 1;

    // idx[..br1] < threshold <= idx[br1..]
    let mut l: isize = 0;
    let mut r: isize = last;
    loop {
        while l <= last && coord(idx, l) < threshold {
            l += 1;
        }
        while r >= 0 && coord(idx, r) >= threshold {
            r -= 1;
        }
        if l > r {
            break;
        }
        idx.swap(l as usize, r as usize);
        l += 1;
        r -= 1;
    }
    let br1 = l as usize;

    // idx[br1..br2] == threshold < idx[br2..]
    r = last;
    loop {
        while l <= last && coord(idx, l) <= threshold {
            l += 1;
        }
        while r >= br1 as isize && coord(idx, r) > threshold {
            r -= 1;
        }
        if l > r {
            break;
        }
        idx.swap(l as usize, r as usize);
        l += 1;
        r -= 1;
    }
    let br2 = l as usize;

    let half = n / 2;
    let n_lo = if ideal < min {
        1
    } else if ideal > max {
        n - 1
    } else if br1 > half {
        br1
    } else if br2 < half {
        br2
    } else {
        half
    };

    Split {
        n_lo,
        dim,
        value: threshold,
    }
}
