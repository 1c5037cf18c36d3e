use crate::Point2D;

pub fn distance_points(a: &Point2D, b: &Point2D) -> f32 {
    let (x1, y1) = *a;
    let (x2, y2) = *b;

    f32::sqrt(f32::powi(x1 - x2, 2) + f32::powi(y1 - y2, 2))
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1. - t) + (b * t)
}

/// Z-component of the cross product (b - a) x (p - a).
///
/// Positive when `p` lies to the left of the directed line a->b in a
/// y-up coordinate system, which is to the *right* on screen (y-down).
pub fn side_of_line(a: &Point2D, b: &Point2D, p: &Point2D) -> f32 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

/// True if the segments p1-p2 and q1-q2 properly intersect, i.e. the
/// end points of each lie strictly on opposite sides of the other.
/// Touching at an end point does not count as a crossing.
pub fn segments_intersect(p1: &Point2D, p2: &Point2D, q1: &Point2D, q2: &Point2D) -> bool {
    let d1 = side_of_line(q1, q2, p1);
    let d2 = side_of_line(q1, q2, p2);
    let d3 = side_of_line(p1, p2, q1);
    let d4 = side_of_line(p1, p2, q2);

    d1 * d2 < 0. && d3 * d4 < 0.
}

/// Shortest distance from `p` to the segment a-b
pub fn distance_to_segment(p: &Point2D, a: &Point2D, b: &Point2D) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length_squared = dx * dx + dy * dy;
    if length_squared == 0. {
        return distance_points(p, a);
    }
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / length_squared).clamp(0., 1.);
    let projected = (lerp(a.0, b.0, t), lerp(a.1, b.1, t));
    distance_points(p, &projected)
}

/// Even-odd (ray casting) test. Points exactly on an edge may land on
/// either side.
pub fn point_in_polygon(p: &Point2D, vertices: &[Point2D]) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let (x, y) = *p;
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_of_line() {
        let a = (0., 0.);
        let b = (10., 0.);
        assert!(side_of_line(&a, &b, &(5., 3.)) > 0.);
        assert!(side_of_line(&a, &b, &(5., -3.)) < 0.);
        assert_eq!(side_of_line(&a, &b, &(5., 0.)), 0.);
    }

    #[test]
    fn test_segments_intersect() {
        let (a, b) = ((0., 0.), (10., 0.));
        assert!(segments_intersect(&(5., -1.), &(5., 1.), &a, &b));
        // Passes beyond the end of the line
        assert!(!segments_intersect(&(15., -1.), &(15., 1.), &a, &b));
        // Touches but does not cross
        assert!(!segments_intersect(&(5., 0.), &(5., 1.), &a, &b));
        // Parallel
        assert!(!segments_intersect(&(0., 1.), &(10., 1.), &a, &b));
    }

    #[test]
    fn test_distance_to_segment() {
        let (a, b) = ((0., 0.), (10., 0.));
        assert_eq!(distance_to_segment(&(5., 4.), &a, &b), 4.);
        assert_eq!(distance_to_segment(&(13., 4.), &a, &b), 5.); // past the end
        assert_eq!(distance_to_segment(&(3., 4.), &a, &a), 5.); // degenerate
    }

    #[test]
    fn test_point_in_polygon() {
        let triangle = [(0., 0.), (10., 0.), (0., 10.)];
        assert!(point_in_polygon(&(2., 2.), &triangle));
        assert!(!point_in_polygon(&(8., 8.), &triangle));
        assert!(!point_in_polygon(&(2., 2.), &triangle[..2]));
    }
}
