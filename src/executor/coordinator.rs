// Coordinate math for gesture fallbacks.
use crate::executor::platform::ScrollDirection;
use crate::perception::types::{Point, Rect};

/// Distance from the centre to each swipe end, as a percentage of the container.
const SWIPE_REACH_PERCENT: i32 = 30;

/// Tap point for an element: the centre of its bounds.
pub fn tap_point(bounds: &Rect) -> Option<Point> {
    if bounds.is_empty() {
        return None;
    }
    Some(bounds.center())
}

/// Start and end of a swipe that scrolls the content of `bounds` in `direction`.
///
/// Scrolling down reveals content below, so the finger moves upwards; the
/// other directions follow the same convention.
pub fn swipe_vector(bounds: &Rect, direction: ScrollDirection) -> Option<(Point, Point)> {
    if bounds.is_empty() {
        return None;
    }
    let c = bounds.center();
    let dx = bounds.width() * SWIPE_REACH_PERCENT / 100;
    let dy = bounds.height() * SWIPE_REACH_PERCENT / 100;

    let (from, to) = match direction {
        ScrollDirection::Down => (Point::new(c.x, c.y + dy), Point::new(c.x, c.y - dy)),
        ScrollDirection::Up => (Point::new(c.x, c.y - dy), Point::new(c.x, c.y + dy)),
        ScrollDirection::Right => (Point::new(c.x + dx, c.y), Point::new(c.x - dx, c.y)),
        ScrollDirection::Left => (Point::new(c.x - dx, c.y), Point::new(c.x + dx, c.y)),
    };
    Some((from, to))
}
