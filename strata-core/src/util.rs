//! Utility types, used throughout the crate.

use smallvec::SmallVec;

/// An integer, axis-aligned pixel rectangle. `right` and `bottom` are exclusive.
///
/// Any rectangle with no area is considered empty, and all empty rectangles compare equal
/// to [`Rect::EMPTY`] after normalization by the constructors.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Rect {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}
impl Rect {
    pub const EMPTY: Self = Self {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };
    /// A rect from its top-left corner and size.
    #[must_use]
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        let right = i64::from(x) + i64::from(width);
        let bottom = i64::from(y) + i64::from(height);
        Self::from_edges(
            x,
            y,
            i32::try_from(right).unwrap_or(i32::MAX),
            i32::try_from(bottom).unwrap_or(i32::MAX),
        )
    }
    /// A rect from its edges. Inverted or degenerate edges result in [`Rect::EMPTY`].
    #[must_use]
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        if right <= left || bottom <= top {
            Self::EMPTY
        } else {
            Self {
                left,
                top,
                right,
                bottom,
            }
        }
    }
    #[must_use]
    pub fn left(&self) -> i32 {
        self.left
    }
    #[must_use]
    pub fn top(&self) -> i32 {
        self.top
    }
    #[must_use]
    pub fn right(&self) -> i32 {
        self.right
    }
    #[must_use]
    pub fn bottom(&self) -> i32 {
        self.bottom
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.right.abs_diff(self.left)
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.bottom.abs_diff(self.top)
    }
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }
    #[must_use]
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
    /// Does `self` fully cover `other`? Every rect covers an empty rect.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.is_empty()
            || (other.left >= self.left
                && other.top >= self.top
                && other.right <= self.right
                && other.bottom <= self.bottom)
    }
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersection(other).is_empty()
    }
    /// The overlapping area, or [`Rect::EMPTY`].
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self::from_edges(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        )
    }
    /// The smallest rect containing both. Empty rects are ignored.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            *other
        } else if other.is_empty() {
            *self
        } else {
            Self {
                left: self.left.min(other.left),
                top: self.top.min(other.top),
                right: self.right.max(other.right),
                bottom: self.bottom.max(other.bottom),
            }
        }
    }
    /// The parts of `self` not covered by `hole`, as at most four disjoint rects.
    #[must_use]
    pub fn subtract(&self, hole: &Self) -> SmallVec<[Self; 4]> {
        let mut out = SmallVec::new();
        let cut = self.intersection(hole);
        if cut.is_empty() {
            if !self.is_empty() {
                out.push(*self);
            }
            return out;
        }
        // Full-width bands above and below, then the left and right slivers beside the cut.
        let bands = [
            Self::from_edges(self.left, self.top, self.right, cut.top),
            Self::from_edges(self.left, cut.bottom, self.right, self.bottom),
            Self::from_edges(self.left, cut.top, cut.left, cut.bottom),
            Self::from_edges(cut.right, cut.top, self.right, cut.bottom),
        ];
        out.extend(bands.into_iter().filter(|band| !band.is_empty()));
        out
    }
    /// Split into row-major chunks no larger than `size` x `size`, aligned to multiples of `size`.
    pub fn chunks(&self, size: u32) -> impl Iterator<Item = Self> + '_ {
        let size = i64::from(size.max(1));
        let align = move |v: i32| i64::from(v).div_euclid(size) * size;
        let clamp = |v: i64| i32::try_from(v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)));
        let (left, top) = (align(self.left), align(self.top));
        let (right, bottom) = (i64::from(self.right), i64::from(self.bottom));
        let rows = if self.is_empty() { 0 } else { (bottom - top + size - 1) / size };
        let cols = if self.is_empty() { 0 } else { (right - left + size - 1) / size };
        (0..rows).flat_map(move |row| {
            (0..cols).filter_map(move |col| {
                let x = left + col * size;
                let y = top + row * size;
                let chunk = Self::from_edges(
                    clamp(x).ok()?,
                    clamp(y).ok()?,
                    clamp(x + size).ok()?,
                    clamp(y + size).ok()?,
                );
                let chunk = chunk.intersection(self);
                (!chunk.is_empty()).then_some(chunk)
            })
        })
    }
}
impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width(),
            self.height(),
            self.left,
            self.top
        )
    }
}
