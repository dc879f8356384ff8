//! Grid geometry and layout algorithms.
//!
//! All board geometry lives in grid units: `x`/`w` count columns, `y`/`h` count rows.
//! Pixel placement is the renderer's concern.

use serde::{Deserialize, Serialize};

/// Default number of columns on a grid surface.
pub const DEFAULT_COLUMNS: u32 = 12;

/// Number of rows scanned below the current layout before giving up on a free slot.
const SEARCH_ROW_SLACK: u32 = 100;

/// Width × height in grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridSize {
    pub w: u32,
    pub h: u32,
}

impl GridSize {
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    /// True if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// True if both dimensions are at least those of `other`.
    pub fn covers(&self, other: GridSize) -> bool {
        self.w >= other.w && self.h >= other.h
    }
}

/// A cell position in grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: u32,
    pub y: u32,
}

impl GridPoint {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// A rectangle on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl GridRect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Build a rectangle from an origin and a size.
    pub fn from_parts(origin: GridPoint, size: GridSize) -> Self {
        Self::new(origin.x, origin.y, size.w, size.h)
    }

    pub fn origin(&self) -> GridPoint {
        GridPoint::new(self.x, self.y)
    }

    pub fn size(&self) -> GridSize {
        GridSize::new(self.w, self.h)
    }

    /// Exclusive right edge, saturating at `u32::MAX`.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    /// Exclusive bottom edge, saturating at `u32::MAX`.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    /// Exclusive right edge, `None` if it does not fit in a `u32`.
    pub fn checked_right(&self) -> Option<u32> {
        self.x.checked_add(self.w)
    }

    /// Exclusive bottom edge, `None` if it does not fit in a `u32`.
    pub fn checked_bottom(&self) -> Option<u32> {
        self.y.checked_add(self.h)
    }

    /// True if both far edges are representable.
    pub fn is_representable(&self) -> bool {
        self.checked_right().is_some() && self.checked_bottom().is_some()
    }

    pub fn area(&self) -> u32 {
        self.w.saturating_mul(self.h)
    }

    /// True if the two rectangles share at least one cell.
    pub fn overlaps(&self, other: &GridRect) -> bool {
        !(self.right() <= other.x
            || self.x >= other.right()
            || self.bottom() <= other.y
            || self.y >= other.bottom())
    }

    /// Number of cells shared with `other`.
    pub fn overlap_area(&self, other: &GridRect) -> u32 {
        if !self.overlaps(other) {
            return 0;
        }
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        w.saturating_mul(h)
    }

    /// Same rectangle moved to a new origin.
    pub fn with_origin(self, origin: GridPoint) -> Self {
        Self::from_parts(origin, self.size())
    }
}

/// The extent a surface offers for placing items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceBounds {
    /// Number of columns.
    pub columns: u32,
    /// Maximum number of rows, if the surface is bounded vertically.
    pub max_rows: Option<u32>,
}

impl Default for SurfaceBounds {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS,
            max_rows: None,
        }
    }
}

impl SurfaceBounds {
    pub fn new(columns: u32, max_rows: Option<u32>) -> Self {
        Self { columns, max_rows }
    }

    /// Clamp a size so it fits on the surface.
    pub fn clamp_size(&self, size: GridSize) -> GridSize {
        let w = size.w.min(self.columns).max(1);
        let h = match self.max_rows {
            Some(rows) => size.h.min(rows).max(1),
            None => size.h.max(1),
        };
        GridSize::new(w, h)
    }

    /// Clamp a rectangle so it lies fully inside the surface.
    ///
    /// The size is clamped first, then the origin is pulled back so the far edges fit.
    pub fn clamp_rect(&self, rect: GridRect) -> GridRect {
        let size = self.clamp_size(rect.size());
        let x = rect.x.min(self.columns.saturating_sub(size.w));
        let y = match self.max_rows {
            Some(rows) => rect.y.min(rows.saturating_sub(size.h)),
            None => rect.y,
        };
        GridRect::new(x, y, size.w, size.h)
    }

    /// Check whether a rectangle lies fully inside the surface.
    ///
    /// A rectangle whose edges overflow `u32` never fits.
    pub fn contains(&self, rect: &GridRect) -> bool {
        let (Some(right), Some(bottom)) = (rect.checked_right(), rect.checked_bottom()) else {
            return false;
        };
        right <= self.columns && self.max_rows.is_none_or(|rows| bottom <= rows)
    }
}

/// Check whether `rect` can be placed without colliding with any of `occupied`.
pub fn is_position_available<'a>(
    occupied: impl IntoIterator<Item = &'a GridRect>,
    rect: &GridRect,
    bounds: &SurfaceBounds,
) -> bool {
    bounds.contains(rect) && !occupied.into_iter().any(|other| other.overlaps(rect))
}

/// Find the first free slot (top-to-bottom, left-to-right) for an item of `size`.
///
/// Falls back to the row below the current layout when nothing fits.
pub fn find_available_position(
    occupied: &[GridRect],
    size: GridSize,
    bounds: &SurfaceBounds,
) -> GridPoint {
    let size = bounds.clamp_size(size);
    let bottom = layout_bottom(occupied);
    let last_row = match bounds.max_rows {
        Some(rows) => rows.saturating_sub(size.h),
        None => bottom.saturating_add(SEARCH_ROW_SLACK),
    };

    for y in 0..=last_row {
        for x in 0..=bounds.columns.saturating_sub(size.w) {
            let candidate = GridRect::from_parts(GridPoint::new(x, y), size);
            if is_position_available(occupied, &candidate, bounds) {
                return candidate.origin();
            }
        }
    }

    GridPoint::new(0, bottom)
}

/// Exclusive bottom row of a layout (0 when empty).
pub fn layout_bottom(occupied: &[GridRect]) -> u32 {
    occupied.iter().map(GridRect::bottom).max().unwrap_or(0)
}

/// Smallest rectangle covering every rect in the layout.
pub fn layout_bounds(occupied: &[GridRect]) -> Option<GridRect> {
    let first = occupied.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.right(), first.bottom());
    for rect in &occupied[1..] {
        x0 = x0.min(rect.x);
        y0 = y0.min(rect.y);
        x1 = x1.max(rect.right());
        y1 = y1.max(rect.bottom());
    }
    Some(GridRect::new(x0, y0, x1 - x0, y1 - y0))
}

/// Pull every rect as far up as it can go without overlapping the ones above it.
///
/// Rects are processed in reading order (row, then column); the returned vector
/// matches the input order.
pub fn compact_vertical(layout: &[GridRect]) -> Vec<GridRect> {
    let mut order: Vec<usize> = (0..layout.len()).collect();
    order.sort_by_key(|&i| (layout[i].y, layout[i].x));

    let mut placed: Vec<GridRect> = Vec::with_capacity(layout.len());
    let mut result = layout.to_vec();
    for i in order {
        let rect = layout[i];
        let mut y = 0;
        while placed
            .iter()
            .any(|other| other.overlaps(&rect.with_origin(GridPoint::new(rect.x, y))))
        {
            y += 1;
        }
        let compacted = rect.with_origin(GridPoint::new(rect.x, y));
        placed.push(compacted);
        result[i] = compacted;
    }
    result
}

/// Snap a fractional cell offset to the nearest whole cell.
pub fn snap_to_cell(value: f64) -> i64 {
    value.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap() {
        let a = GridRect::new(0, 0, 2, 2);
        let b = GridRect::new(1, 1, 2, 2);
        let c = GridRect::new(2, 0, 2, 2);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.overlap_area(&b), 1);
        assert_eq!(a.overlap_area(&c), 0);
    }

    #[test]
    fn test_clamp_rect_to_columns() {
        let bounds = SurfaceBounds::new(12, None);
        let rect = bounds.clamp_rect(GridRect::new(10, 3, 4, 2));
        assert_eq!(rect, GridRect::new(8, 3, 4, 2));

        let wide = bounds.clamp_rect(GridRect::new(0, 0, 20, 2));
        assert_eq!(wide.w, 12);
    }

    #[test]
    fn test_clamp_rect_to_rows() {
        let bounds = SurfaceBounds::new(12, Some(6));
        let rect = bounds.clamp_rect(GridRect::new(0, 5, 2, 3));
        assert_eq!(rect, GridRect::new(0, 3, 2, 3));
    }

    #[test]
    fn test_find_available_position_skips_occupied() {
        let bounds = SurfaceBounds::new(4, None);
        let occupied = vec![GridRect::new(0, 0, 2, 2), GridRect::new(2, 0, 2, 1)];
        let pos = find_available_position(&occupied, GridSize::new(2, 1), &bounds);
        assert_eq!(pos, GridPoint::new(2, 1));
    }

    #[test]
    fn test_find_available_position_full_bounded_surface() {
        let bounds = SurfaceBounds::new(2, Some(2));
        let occupied = vec![GridRect::new(0, 0, 2, 2)];
        let pos = find_available_position(&occupied, GridSize::new(1, 1), &bounds);
        assert_eq!(pos, GridPoint::new(0, 2));
    }

    #[test]
    fn test_compact_vertical() {
        let layout = vec![GridRect::new(0, 5, 2, 2), GridRect::new(0, 9, 2, 1)];
        let compacted = compact_vertical(&layout);
        assert_eq!(compacted[0], GridRect::new(0, 0, 2, 2));
        assert_eq!(compacted[1], GridRect::new(0, 2, 2, 1));
    }

    #[test]
    fn test_layout_bounds() {
        assert!(layout_bounds(&[]).is_none());
        let bounds = layout_bounds(&[GridRect::new(1, 1, 2, 2), GridRect::new(4, 0, 1, 5)]);
        assert_eq!(bounds, Some(GridRect::new(1, 0, 4, 5)));
    }

    #[test]
    fn test_overflowing_rect_never_fits() {
        let bounds = SurfaceBounds::new(12, None);
        let wide = GridRect::new(u32::MAX, 0, 3, 2);
        let tall = GridRect::new(0, u32::MAX, 3, 2);
        assert!(!wide.is_representable());
        assert_eq!(wide.right(), u32::MAX);
        assert!(!bounds.contains(&wide));
        assert!(!bounds.contains(&tall));
        assert!(!is_position_available(&[], &tall, &bounds));
        assert!(bounds.contains(&GridRect::new(0, u32::MAX - 2, 3, 2)));
    }

    #[test]
    fn test_snap_to_cell() {
        assert_eq!(snap_to_cell(1.4), 1);
        assert_eq!(snap_to_cell(1.6), 2);
        assert_eq!(snap_to_cell(-0.6), -1);
    }
}
