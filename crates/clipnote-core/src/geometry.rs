//! Pure hit-testing primitives shared by the editor and renderer.

use kurbo::{Point, Rect};

/// Pixels of slack when picking line annotations.
pub const HIT_TOLERANCE: f64 = 6.0;

/// Axis-aligned box from an origin and signed extents.
pub fn normalized_box(origin: Point, width: f64, height: f64) -> Rect {
    Rect::from_points(origin, Point::new(origin.x + width, origin.y + height))
}

/// Inclusive containment check. `Rect::contains` is half-open on the
/// far edges, which would make the boundary pixel unpickable.
pub fn point_in_box(rect: Rect, p: Point) -> bool {
    p.x >= rect.x0 && p.x <= rect.x1 && p.y >= rect.y0 && p.y <= rect.y1
}

/// Containment in the ellipse inscribed in `rect`. A degenerate rect
/// (zero width or height) hits nothing.
pub fn point_in_inscribed_ellipse(rect: Rect, p: Point) -> bool {
    let rx = rect.width() / 2.0;
    let ry = rect.height() / 2.0;
    if rx <= 0.0 || ry <= 0.0 {
        return false;
    }
    let center = rect.center();
    let nx = (p.x - center.x) / rx;
    let ny = (p.y - center.y) / ry;
    nx * nx + ny * ny <= 1.0
}

/// Distance from `p` to the segment `a..b`, clamped to the endpoints.
pub fn point_to_segment_dist(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let ap = p - a;
    let ab_len2 = ab.hypot2();
    if ab_len2 < f64::EPSILON {
        return ap.hypot();
    }
    let t = (ap.dot(ab) / ab_len2).clamp(0.0, 1.0);
    let closest = a + ab * t;
    (p - closest).hypot()
}

/// Whether `p` picks the segment `a..b`: within `tolerance` of the
/// segment and inside its bounding box inflated by the same amount.
pub fn point_near_segment(p: Point, a: Point, b: Point, tolerance: f64) -> bool {
    let bbox = Rect::from_points(a, b).inflate(tolerance, tolerance);
    point_in_box(bbox, p) && point_to_segment_dist(p, a, b) <= tolerance
}

/// Hit box of a text run: `width` wide, rising `line_height` above the
/// baseline anchor.
pub fn text_box(baseline: Point, width: f64, line_height: f64) -> Rect {
    Rect::new(
        baseline.x,
        baseline.y - line_height,
        baseline.x + width,
        baseline.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_box_handles_negative_extents() {
        let b = normalized_box(Point::new(50.0, 40.0), -40.0, -30.0);
        assert_eq!(b, Rect::new(10.0, 10.0, 50.0, 40.0));
    }

    #[test]
    fn test_point_in_box_is_inclusive() {
        let b = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(point_in_box(b, Point::new(10.0, 10.0)));
        assert!(point_in_box(b, Point::new(0.0, 0.0)));
        assert!(!point_in_box(b, Point::new(10.1, 5.0)));
    }

    #[test]
    fn test_ellipse_hit_misses_box_corner() {
        let b = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert!(point_in_inscribed_ellipse(b, Point::new(50.0, 25.0)));
        assert!(point_in_inscribed_ellipse(b, Point::new(99.0, 25.0)));
        // Inside the box but outside the inscribed ellipse
        assert!(!point_in_inscribed_ellipse(b, Point::new(2.0, 2.0)));
    }

    #[test]
    fn test_degenerate_ellipse_never_hits() {
        let flat = Rect::new(10.0, 10.0, 60.0, 10.0);
        assert!(!point_in_inscribed_ellipse(flat, flat.center()));
        let empty = Rect::new(10.0, 10.0, 10.0, 10.0);
        assert!(!point_in_inscribed_ellipse(empty, Point::new(10.0, 10.0)));
    }

    #[test]
    fn test_segment_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert_eq!(point_to_segment_dist(Point::new(5.0, 3.0), a, b), 3.0);
        // Beyond the endpoint the distance clamps to the endpoint
        assert_eq!(point_to_segment_dist(Point::new(13.0, 4.0), a, b), 5.0);
        // Zero-length segment degrades to point distance
        assert_eq!(point_to_segment_dist(Point::new(3.0, 4.0), a, a), 5.0);
    }

    #[test]
    fn test_near_segment_requires_inflated_bbox() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(100.0, 0.0);
        assert!(point_near_segment(Point::new(50.0, 5.0), a, b, 6.0));
        assert!(!point_near_segment(Point::new(50.0, 7.0), a, b, 6.0));
        // Past the end and outside the inflated box
        assert!(!point_near_segment(Point::new(110.0, 0.0), a, b, 6.0));
        // Past the end but within the inflated box and tolerance
        assert!(point_near_segment(Point::new(104.0, 0.0), a, b, 6.0));
    }
}
