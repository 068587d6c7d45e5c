//! Points and axis-aligned bounding boxes.

/// Coordinate type, the accelerator's native signed word.
pub type Coord = i32;

/// A point in `D` dimensions.
///
/// Laid out as `D` consecutive words so a slice of points can be shared
/// with the accelerator unchanged.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point<const D: usize> {
    pub value: [Coord; D],
}

impl<const D: usize> Default for Point<D> {
    fn default() -> Self {
        Self { value: [0; D] }
    }
}

impl<const D: usize> Point<D> {
    pub const fn new(value: [Coord; D]) -> Self {
        Self { value }
    }

    /// Component-wise sum with two's-complement wrap-around.
    pub fn wrapping_add(&self, other: &Self) -> Self {
        let mut value = self.value;
        for (v, o) in value.iter_mut().zip(other.value.iter()) {
            *v = v.wrapping_add(*o);
        }
        Self { value }
    }

    /// Dot product with two's-complement wrap-around.
    pub fn dot(&self, other: &Self) -> Coord {
        self.value
            .iter()
            .zip(other.value.iter())
            .fold(0, |acc: Coord, (a, b)| acc.wrapping_add(a.wrapping_mul(*b)))
    }
}

impl<const D: usize> From<[Coord; D]> for Point<D> {
    fn from(value: [Coord; D]) -> Self {
        Self { value }
    }
}

/// Smallest and largest coordinate along `dim` over the indexed points.
///
/// # Returns
///
/// `None` for an empty index range.
pub fn find_min_max<const D: usize>(
    points: &[Point<D>],
    idx: &[u32],
    dim: usize,
) -> Option<(Coord, Coord)> {
    let mut coords = idx.iter().map(|&i| points[i as usize].value[dim]);
    let first = coords.next()?;
    Some(coords.fold((first, first), |(lo, hi), c| (lo.min(c), hi.max(c))))
}

/// Axis-aligned box given by its low and high corners.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox<const D: usize> {
    pub lo: Point<D>,
    pub hi: Point<D>,
}

impl<const D: usize> BoundingBox<D> {
    pub const fn new(lo: Point<D>, hi: Point<D>) -> Self {
        Self { lo, hi }
    }

    /// Degenerate box holding a single point.
    pub const fn around(p: Point<D>) -> Self {
        Self { lo: p, hi: p }
    }

    /// Tightest box enclosing the indexed points.
    pub fn enclosing(points: &[Point<D>], idx: &[u32]) -> Option<Self> {
        let mut bbox = Self::around(points[*idx.first()? as usize]);
        for dim in 0..D {
            let (lo, hi) = find_min_max(points, idx, dim)?;
            bbox.lo.value[dim] = lo;
            bbox.hi.value[dim] = hi;
        }
        Some(bbox)
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for d in 0..D {
            out.lo.value[d] = out.lo.value[d].min(other.lo.value[d]);
            out.hi.value[d] = out.hi.value[d].max(other.hi.value[d]);
        }
        out
    }

    /// Extent along `dim`, widened so it cannot overflow.
    pub fn extent(&self, dim: usize) -> i64 {
        self.hi.value[dim] as i64 - self.lo.value[dim] as i64
    }

    /// Dimension with the longest edge. Ties go to the lowest dimension.
    pub fn longest_axis(&self) -> usize {
        let mut dim = 0;
        for d in 1..D {
            if self.extent(dim) < self.extent(d) {
                dim = d;
            }
        }
        dim
    }

    pub fn contains(&self, p: &Point<D>) -> bool {
        (0..D).all(|d| self.lo.value[d] <= p.value[d] && p.value[d] <= self.hi.value[d])
    }

    pub fn contains_box(&self, other: &Self) -> bool {
        self.contains(&other.lo) && self.contains(&other.hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enclosing_box_and_longest_axis() {
        let points = [
            Point::new([1, 0, -3]),
            Point::new([5, 2, 0]),
            Point::new([2, -2, 4]),
        ];
        let bbox = BoundingBox::enclosing(&points, &[0, 1, 2]).unwrap();
        assert_eq!(bbox.lo, Point::new([1, -2, -3]));
        assert_eq!(bbox.hi, Point::new([5, 2, 4]));
        assert_eq!(bbox.longest_axis(), 2);
        assert!(points.iter().all(|p| bbox.contains(p)));
        assert!(BoundingBox::<3>::enclosing(&points, &[]).is_none());
    }

    #[test]
    fn longest_axis_ties_go_low() {
        let bbox = BoundingBox::new(Point::new([0, 0]), Point::new([4, 4]));
        assert_eq!(bbox.longest_axis(), 0);
    }

    #[test]
    fn arithmetic_wraps() {
        let a = Point::new([Coord::MAX, 3]);
        let b = Point::new([1, 4]);
        assert_eq!(a.wrapping_add(&b), Point::new([Coord::MIN, 7]));
        assert_eq!(b.dot(&b), 17);
    }
}
