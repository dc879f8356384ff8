//! Resize handles around a widget's bounds.

use crate::grid::GridRect;
use kurbo::{Point, Rect};

/// A manipulation handle on a widget.
#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
    /// The kind of handle (determines behavior).
    pub kind: HandleKind,
    /// Position in surface pixels.
    pub position: Point,
    /// Visual shape of the handle.
    pub shape: HandleShape,
}

/// Which edges a handle drags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
}

/// Visual shape of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandleShape {
    /// Square handle (default for corners).
    #[default]
    Square,
    /// Circular handle (edge midpoints).
    Circle,
}

impl Handle {
    /// Create a new handle.
    pub fn new(kind: HandleKind, position: Point) -> Self {
        Self {
            kind,
            position,
            shape: HandleShape::default(),
        }
    }

    /// Set the handle shape.
    pub fn with_shape(mut self, shape: HandleShape) -> Self {
        self.shape = shape;
        self
    }
}

impl HandleKind {
    pub fn moves_left(self) -> bool {
        matches!(self, Self::TopLeft | Self::BottomLeft | Self::Left)
    }

    pub fn moves_right(self) -> bool {
        matches!(self, Self::TopRight | Self::BottomRight | Self::Right)
    }

    pub fn moves_top(self) -> bool {
        matches!(self, Self::TopLeft | Self::TopRight | Self::Top)
    }

    pub fn moves_bottom(self) -> bool {
        matches!(self, Self::BottomLeft | Self::BottomRight | Self::Bottom)
    }

    /// Apply a drag of `(dx, dy)` cells to `rect`.
    ///
    /// The opposite edges stay fixed. Sizes never drop below one cell and the origin
    /// never leaves the surface; min/max constraints are left to the caller. Edges that
    /// would leave the `u32` range saturate.
    pub fn resize(self, rect: GridRect, dx: i64, dy: i64) -> GridRect {
        let (mut x0, mut y0) = (i64::from(rect.x), i64::from(rect.y));
        let mut x1 = x0 + i64::from(rect.w);
        let mut y1 = y0 + i64::from(rect.h);

        if self.moves_left() {
            x0 = x0.saturating_add(dx).clamp(0, x1 - 1);
        }
        if self.moves_right() {
            x1 = x1.saturating_add(dx).max(x0 + 1);
        }
        if self.moves_top() {
            y0 = y0.saturating_add(dy).clamp(0, y1 - 1);
        }
        if self.moves_bottom() {
            y1 = y1.saturating_add(dy).max(y0 + 1);
        }

        let x = saturate(x0);
        let y = saturate(y0);
        GridRect::new(
            x,
            y,
            saturate(x1 - x0).min(u32::MAX - x).max(1),
            saturate(y1 - y0).min(u32::MAX - y).max(1),
        )
    }
}

fn saturate(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// The eight resize handles around a pixel rectangle.
pub fn handles_for_rect(bounds: Rect) -> Vec<Handle> {
    let center = bounds.center();
    vec![
        Handle::new(HandleKind::TopLeft, Point::new(bounds.x0, bounds.y0)),
        Handle::new(HandleKind::TopRight, Point::new(bounds.x1, bounds.y0)),
        Handle::new(HandleKind::BottomLeft, Point::new(bounds.x0, bounds.y1)),
        Handle::new(HandleKind::BottomRight, Point::new(bounds.x1, bounds.y1)),
        Handle::new(HandleKind::Top, Point::new(center.x, bounds.y0)).with_shape(HandleShape::Circle),
        Handle::new(HandleKind::Bottom, Point::new(center.x, bounds.y1)).with_shape(HandleShape::Circle),
        Handle::new(HandleKind::Left, Point::new(bounds.x0, center.y)).with_shape(HandleShape::Circle),
        Handle::new(HandleKind::Right, Point::new(bounds.x1, center.y)).with_shape(HandleShape::Circle),
    ]
}

/// Hit test a set of handles.
pub fn hit_test_handle(handles: &[Handle], point: Point, tolerance: f64) -> Option<HandleKind> {
    handles
        .iter()
        .find(|handle| handle.position.distance(point) <= tolerance)
        .map(|handle| handle.kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_for_rect() {
        let handles = handles_for_rect(Rect::new(0.0, 0.0, 100.0, 50.0));
        assert_eq!(handles.len(), 8);
        assert_eq!(
            hit_test_handle(&handles, Point::new(99.0, 49.0), 4.0),
            Some(HandleKind::BottomRight)
        );
        assert_eq!(
            hit_test_handle(&handles, Point::new(50.0, 1.0), 4.0),
            Some(HandleKind::Top)
        );
        assert_eq!(hit_test_handle(&handles, Point::new(50.0, 25.0), 4.0), None);
    }

    #[test]
    fn test_resize_bottom_right() {
        let rect = GridRect::new(2, 2, 3, 2);
        assert_eq!(HandleKind::BottomRight.resize(rect, 2, 1), GridRect::new(2, 2, 5, 3));
        assert_eq!(HandleKind::BottomRight.resize(rect, -10, -10), GridRect::new(2, 2, 1, 1));
    }

    #[test]
    fn test_resize_top_left_keeps_far_edges() {
        let rect = GridRect::new(2, 2, 3, 2);
        assert_eq!(HandleKind::TopLeft.resize(rect, -1, -1), GridRect::new(1, 1, 4, 3));
        assert_eq!(HandleKind::TopLeft.resize(rect, -5, 0), GridRect::new(0, 2, 5, 2));
        assert_eq!(HandleKind::Left.resize(rect, 10, 10), GridRect::new(4, 2, 1, 2));
    }

    #[test]
    fn test_resize_saturates_at_edge_of_range() {
        let rect = GridRect::new(u32::MAX - 2, 0, 2, 2);
        let resized = HandleKind::Right.resize(rect, i64::MAX, 0);
        assert_eq!(resized.x, u32::MAX - 2);
        assert_eq!(resized.w, 2);
        assert!(resized.is_representable());

        let far = GridRect::new(0, u32::MAX, 1, 1);
        let resized = HandleKind::Bottom.resize(far, 0, 3);
        assert_eq!(resized.y, u32::MAX);
        assert_eq!(resized.h, 1);
    }
}
