//! Small 2D helpers layered on top of `glam`.

use glam::Vec2;
use std::f32::consts::TAU;

use crate::config::GEOMETRY_EPSILON;

/// Scalar 2D cross product (z component of the 3D cross product).
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a scalar angular velocity with a vector: `w × v`.
#[inline]
pub fn cross_sv(w: f32, v: Vec2) -> Vec2 {
    Vec2::new(-w * v.y, w * v.x)
}

/// Normalizes an angle into `[0, 2π)`.
pub fn normalize_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Unit vector or `None` when the input is too short to carry a direction.
pub fn try_normalize(v: Vec2) -> Option<Vec2> {
    let length = v.length();
    if length <= GEOMETRY_EPSILON {
        None
    } else {
        Some(v / length)
    }
}

/// Closest point to `p` on the segment `a`-`b`.
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let length_sq = ab.length_squared();
    if length_sq <= GEOMETRY_EPSILON * GEOMETRY_EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / length_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Signed area of a closed vertex loop (positive for counter-clockwise in Y-up).
pub fn signed_area(vertices: &[Vec2]) -> f32 {
    let n = vertices.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        sum += cross(vertices[i], vertices[(i + 1) % n]);
    }
    0.5 * sum
}

/// Area centroid of a closed vertex loop; falls back to the vertex average when degenerate.
pub fn polygon_centroid(vertices: &[Vec2]) -> Vec2 {
    let area = signed_area(vertices);
    if area.abs() <= GEOMETRY_EPSILON {
        return vertex_average(vertices);
    }
    let n = vertices.len();
    let mut c = Vec2::ZERO;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        c += (a + b) * cross(a, b);
    }
    c / (6.0 * area)
}

pub fn vertex_average(vertices: &[Vec2]) -> Vec2 {
    if vertices.is_empty() {
        return Vec2::ZERO;
    }
    vertices.iter().copied().sum::<Vec2>() / vertices.len() as f32
}

/// Even-odd point-in-polygon test. Points exactly on an edge may land on either side.
pub fn point_in_polygon(point: Vec2, vertices: &[Vec2]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let vi = vertices[i];
        let vj = vertices[j];
        if (vi.y > point.y) != (vj.y > point.y) {
            let x = vj.x + (point.y - vj.y) / (vi.y - vj.y) * (vi.x - vj.x);
            if point.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Distance from `point` to the closed polygon boundary.
pub fn distance_to_boundary(point: Vec2, vertices: &[Vec2]) -> f32 {
    let n = vertices.len();
    (0..n)
        .map(|i| {
            let closest = closest_point_on_segment(point, vertices[i], vertices[(i + 1) % n]);
            closest.distance(point)
        })
        .fold(f32::MAX, f32::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn angles_wrap_into_positive_turn() {
        assert_relative_eq!(
            normalize_angle(-std::f32::consts::FRAC_PI_2),
            1.5 * std::f32::consts::PI,
            epsilon = 1e-5
        );
        assert_relative_eq!(normalize_angle(TAU + 0.25), 0.25, epsilon = 1e-5);
        assert_eq!(normalize_angle(f32::NAN), 0.0);
    }

    #[test]
    fn square_area_and_centroid() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        assert_relative_eq!(signed_area(&square), 4.0);
        let c = polygon_centroid(&square);
        assert_relative_eq!(c.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(c.y, 1.0, epsilon = 1e-6);
        assert!(point_in_polygon(Vec2::new(1.0, 1.5), &square));
        assert!(!point_in_polygon(Vec2::new(3.0, 1.0), &square));
    }
}
