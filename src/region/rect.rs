// src/region/rect.rs

//! Axis-aligned boxes over a buffer's index space, plus the set algebra the
//! region tracker is built on.
//!
//! All coordinates are in elements. Buffers with fewer than three
//! dimensions use offset 0 / size 1 for the unused trailing axes.

use std::fmt;

/// Three-dimensional size.
pub type Range3 = [usize; 3];
/// Three-dimensional index.
pub type Id3 = [usize; 3];

/// Expand a 1–3 dimensional size to [`Range3`], padding with 1.
pub fn range3(dims: &[usize]) -> Option<Range3> {
    pad(dims, 1)
}

/// Expand a 1–3 dimensional index to [`Id3`], padding with 0.
pub fn id3(dims: &[usize]) -> Option<Id3> {
    pad(dims, 0)
}

fn pad(dims: &[usize], fill: usize) -> Option<[usize; 3]> {
    if dims.is_empty() || dims.len() > 3 {
        return None;
    }
    let mut out = [fill; 3];
    out[..dims.len()].copy_from_slice(dims);
    Some(out)
}

/// Number of elements covered by a size.
pub fn element_count(range: &Range3) -> usize {
    range.iter().product()
}

/// Half-open box `[offset, offset + range)` on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rect {
    pub offset: Id3,
    pub range: Range3,
}

impl Rect {
    pub const fn new(offset: Id3, range: Range3) -> Self {
        Self { offset, range }
    }

    /// One-dimensional box `[begin, end)`.
    pub const fn span(begin: usize, end: usize) -> Self {
        Self::new([begin, 0, 0], [end.saturating_sub(begin), 1, 1])
    }

    /// The box covering a whole buffer of the given extent.
    pub const fn whole(extent: Range3) -> Self {
        Self::new([0, 0, 0], extent)
    }

    pub fn is_empty(&self) -> bool {
        self.range.iter().any(|&r| r == 0)
    }

    pub fn volume(&self) -> usize {
        element_count(&self.range)
    }

    pub fn begin(&self, axis: usize) -> usize {
        self.offset[axis]
    }

    pub fn end(&self, axis: usize) -> usize {
        self.offset[axis] + self.range[axis]
    }

    /// Whether this box lies entirely inside a buffer of `extent`.
    ///
    /// A box whose end overflows `usize` never fits.
    pub fn fits_in(&self, extent: &Range3) -> bool {
        (0..3).all(|axis| {
            self.offset[axis]
                .checked_add(self.range[axis])
                .is_some_and(|end| end <= extent[axis])
        })
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let mut offset = [0; 3];
        let mut range = [0; 3];
        for axis in 0..3 {
            let lo = self.begin(axis).max(other.begin(axis));
            let hi = self.end(axis).min(other.end(axis));
            if hi <= lo {
                return None;
            }
            offset[axis] = lo;
            range[axis] = hi - lo;
        }
        Some(Rect::new(offset, range))
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.is_empty()
            || (0..3).all(|axis| {
                self.begin(axis) <= other.begin(axis) && other.end(axis) <= self.end(axis)
            })
    }

    /// `self \ other` as at most six non-overlapping boxes.
    ///
    /// The box is peeled axis by axis: the slabs below and above the
    /// intersection on axis 0, then on axis 1 within the remaining core, and
    /// so on.
    pub fn subtract(&self, other: &Rect) -> Vec<Rect> {
        if self.is_empty() {
            return Vec::new();
        }
        let Some(cut) = self.intersection(other) else {
            return vec![*self];
        };

        let mut pieces = Vec::new();
        let mut core = *self;
        for axis in 0..3 {
            if core.begin(axis) < cut.begin(axis) {
                let mut below = core;
                below.range[axis] = cut.begin(axis) - core.begin(axis);
                pieces.push(below);
            }
            if cut.end(axis) < core.end(axis) {
                let mut above = core;
                above.offset[axis] = cut.end(axis);
                above.range[axis] = core.end(axis) - cut.end(axis);
                pieces.push(above);
            }
            core.offset[axis] = cut.begin(axis);
            core.range[axis] = cut.range[axis];
        }
        pieces
    }

    /// Merge two boxes if their union is itself a box.
    pub fn try_merge(&self, other: &Rect) -> Option<Rect> {
        if self.contains(other) {
            return Some(*self);
        }
        if other.contains(self) {
            return Some(*other);
        }

        let differing: Vec<usize> = (0..3)
            .filter(|&axis| {
                self.begin(axis) != other.begin(axis) || self.range[axis] != other.range[axis]
            })
            .collect();
        let [axis] = differing.as_slice() else {
            return None;
        };
        let axis = *axis;

        let (lo, hi) = if self.begin(axis) <= other.begin(axis) {
            (self, other)
        } else {
            (other, self)
        };
        if lo.end(axis) < hi.begin(axis) {
            return None;
        }
        let mut merged = *lo;
        merged.range[axis] = hi.end(axis).max(lo.end(axis)) - lo.begin(axis);
        Some(merged)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{})x[{},{})x[{},{})",
            self.begin(0),
            self.end(0),
            self.begin(1),
            self.end(1),
            self.begin(2),
            self.end(2)
        )
    }
}

/// Remove `cut` from every box in `pieces`.
pub fn subtract_from_all(pieces: &[Rect], cut: &Rect) -> Vec<Rect> {
    pieces.iter().flat_map(|p| p.subtract(cut)).collect()
}

/// `rect` minus the union of `covered`.
pub fn difference(rect: &Rect, covered: &[Rect]) -> Vec<Rect> {
    let mut remaining = if rect.is_empty() {
        Vec::new()
    } else {
        vec![*rect]
    };
    for c in covered {
        if remaining.is_empty() {
            break;
        }
        remaining = subtract_from_all(&remaining, c);
    }
    remaining
}

/// Merge adjacent boxes until no pair can be merged, then sort.
///
/// Input boxes must not overlap; the result covers the same set.
pub fn coalesce(mut rects: Vec<Rect>) -> Vec<Rect> {
    rects.retain(|r| !r.is_empty());
    loop {
        let mut merged_any = false;
        'outer: for i in 0..rects.len() {
            for j in (i + 1)..rects.len() {
                if let Some(merged) = rects[i].try_merge(&rects[j]) {
                    rects[i] = merged;
                    rects.swap_remove(j);
                    merged_any = true;
                    break 'outer;
                }
            }
        }
        if !merged_any {
            break;
        }
    }
    rects.sort();
    rects
}

/// Total number of elements covered by non-overlapping boxes.
pub fn covered_volume(rects: &[Rect]) -> usize {
    rects.iter().map(Rect::volume).sum()
}
