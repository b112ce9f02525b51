//! Narrow-phase collision tests between placed shapes.
//!
//! Pair tests live in an 8×8 table indexed by [`ShapeKind`]. Only one direction of each
//! off-diagonal pair is populated; the other direction is answered by swapping the
//! arguments and inverting the result, so `A vs B` and `B vs A` always agree.
//!
//! Every test follows the same convention: `p1` is the point of A reaching deepest into
//! B, `p2` the matching point of B, and `p1 - p2` points from A towards B (the direction
//! B has to move to separate).

use glam::Vec2;
use std::cmp::Ordering;

use crate::{
    collision::{
        contact::Collision,
        shapes::{Geometry, Shape, ShapeKind},
    },
    config::GEOMETRY_EPSILON,
    core::types::Transform,
    utils::math::{
        closest_point_on_segment, cross, normalize_angle, point_in_polygon, try_normalize,
        vertex_average,
    },
};

/// Pairwise test: `(a, a_transform, b, b_transform) -> Collision`.
pub type PairTest = fn(&Shape, &Transform, &Shape, &Transform) -> Collision;

const CIRCLE_CIRCLE: Option<PairTest> = Some(circle_circle as PairTest);
const CIRCLE_POLYGON: Option<PairTest> = Some(circle_polygon as PairTest);
const CIRCLE_POINT: Option<PairTest> = Some(circle_point as PairTest);
const CIRCLE_SEGMENT: Option<PairTest> = Some(circle_segment as PairTest);
const SAT: Option<PairTest> = Some(sat as PairTest);
const POLYGON_POINT: Option<PairTest> = Some(polygon_point as PairTest);
const ELLIPSE_POINT: Option<PairTest> = Some(ellipse_point as PairTest);
const CHAIN_ANY: Option<PairTest> = Some(chain_any as PairTest);
const PROBE_MISS: Option<PairTest> = Some(probe_miss as PairTest);
const HALF_PLANE_CIRCLE: Option<PairTest> = Some(half_plane_circle as PairTest);
const HALF_PLANE_SUPPORT: Option<PairTest> = Some(half_plane_support as PairTest);
const UNBOUNDED_PAIR: Option<PairTest> = Some(unbounded_pair as PairTest);
const SEGMENT_SEGMENT: Option<PairTest> = Some(segment_segment as PairTest);

// Rows: A kind, columns: B kind, both in `ShapeKind` order
// (circle, rectangle, ellipse, polygon, chain, point, half-plane, segment).
static DISPATCH: [[Option<PairTest>; ShapeKind::COUNT]; ShapeKind::COUNT] = [
    [
        CIRCLE_CIRCLE,
        CIRCLE_POLYGON,
        CIRCLE_POLYGON,
        CIRCLE_POLYGON,
        None,
        CIRCLE_POINT,
        None,
        CIRCLE_SEGMENT,
    ],
    [None, SAT, SAT, SAT, None, POLYGON_POINT, None, SAT],
    [None, None, SAT, SAT, None, ELLIPSE_POINT, None, SAT],
    [None, None, None, SAT, None, POLYGON_POINT, None, SAT],
    [
        CHAIN_ANY, CHAIN_ANY, CHAIN_ANY, CHAIN_ANY, CHAIN_ANY, CHAIN_ANY, None, CHAIN_ANY,
    ],
    [None, None, None, None, None, PROBE_MISS, None, PROBE_MISS],
    [
        HALF_PLANE_CIRCLE,
        HALF_PLANE_SUPPORT,
        HALF_PLANE_SUPPORT,
        HALF_PLANE_SUPPORT,
        HALF_PLANE_SUPPORT,
        HALF_PLANE_SUPPORT,
        UNBOUNDED_PAIR,
        HALF_PLANE_SUPPORT,
    ],
    [None, None, None, None, None, None, None, SEGMENT_SEGMENT],
];

/// Stateless entry point for the dispatch table.
pub struct NarrowPhase;

impl NarrowPhase {
    /// Collides `a` placed at `xa` with `b` placed at `xb`.
    pub fn collide(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
        // Same-kind pairs always run in a canonical order so that swapping the
        // arguments cannot change which axis wins a tie.
        if a.kind() == b.kind()
            && compare_keys(&canonical_key(a, xa), &canonical_key(b, xb)).is_gt()
        {
            return Self::dispatch(b, xb, a, xa).inverse();
        }
        Self::dispatch(a, xa, b, xb)
    }

    fn dispatch(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
        let (ka, kb) = (a.kind().index(), b.kind().index());
        if let Some(test) = DISPATCH[ka][kb] {
            return test(a, xa, b, xb);
        }
        if let Some(test) = DISPATCH[kb][ka] {
            return test(b, xb, a, xa).inverse();
        }
        Collision::NULL
    }

    /// Direct table entry for `a` vs `b`, without the swapped fallback.
    pub fn pair_test(a: ShapeKind, b: ShapeKind) -> Option<PairTest> {
        DISPATCH[a.index()][b.index()]
    }

    /// Whether the pair is answered by a table entry in either direction.
    pub fn is_covered(a: ShapeKind, b: ShapeKind) -> bool {
        Self::pair_test(a, b).is_some() || Self::pair_test(b, a).is_some()
    }
}

fn canonical_key(shape: &Shape, xf: &Transform) -> Vec<f32> {
    let c = xf.apply(shape.center());
    let mut key = vec![c.x, c.y, normalize_angle(xf.rotation)];
    match shape.geometry() {
        Geometry::Circle { radius, .. } => key.push(*radius),
        Geometry::Ellipse { rx, ry, .. } => key.extend([*rx, *ry]),
        Geometry::HalfPlane { normal, .. } => {
            let n = xf.apply_vector(*normal);
            key.extend([n.x, n.y]);
        }
        _ => {
            for v in shape.vertices() {
                let w = xf.apply(v);
                key.extend([w.x, w.y]);
            }
        }
    }
    key
}

fn compare_keys(a: &[f32], b: &[f32]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// World-space vertex loop used by the polygonal tests; curved shapes are tessellated.
pub(crate) fn world_points(shape: &Shape, xf: &Transform) -> Vec<Vec2> {
    shape
        .outline()
        .unwrap_or_else(|| shape.vertices())
        .into_iter()
        .map(|v| xf.apply(v))
        .collect()
}

fn world_circle(shape: &Shape, xf: &Transform) -> (Vec2, f32) {
    match shape.geometry() {
        Geometry::Circle { center, radius } => (xf.apply(*center), *radius),
        _ => (xf.apply(shape.center()), 0.0),
    }
}

fn world_segment(shape: &Shape, xf: &Transform) -> (Vec2, Vec2) {
    match shape.geometry() {
        Geometry::LineSegment { start, end } => (xf.apply(*start), xf.apply(*end)),
        _ => {
            let p = xf.apply(shape.center());
            (p, p)
        }
    }
}

fn world_half_plane(shape: &Shape, xf: &Transform) -> (Vec2, Vec2) {
    match shape.geometry() {
        Geometry::HalfPlane { point, normal } => (xf.apply(*point), xf.apply_vector(*normal)),
        _ => (xf.apply(shape.center()), Vec2::Y),
    }
}

/// Closest point on the closed boundary of `vertices` to `p`.
fn closest_on_loop(p: Vec2, vertices: &[Vec2]) -> Vec2 {
    let n = vertices.len();
    let mut best = vertices[0];
    let mut best_dist = f32::MAX;
    for i in 0..n {
        let q = closest_point_on_segment(p, vertices[i], vertices[(i + 1) % n]);
        let d = q.distance_squared(p);
        if d < best_dist {
            best_dist = d;
            best = q;
        }
    }
    best
}

fn circle_circle(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
    let (ca, ra) = world_circle(a, xa);
    let (cb, rb) = world_circle(b, xb);
    let distance = ca.distance(cb);
    if distance >= ra + rb {
        return Collision::NULL;
    }
    let n = try_normalize(cb - ca).unwrap_or(Vec2::X);
    Collision::new(ca + n * ra, cb - n * rb)
}

/// Circle against any solid with a vertex loop (rectangle, polygon, tessellated ellipse).
fn circle_polygon(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
    let (c, r) = world_circle(a, xa);
    let vertices = world_points(b, xb);
    let q = closest_on_loop(c, &vertices);
    let fallback = || try_normalize(vertex_average(&vertices) - c).unwrap_or(Vec2::X);
    let n = if point_in_polygon(c, &vertices) {
        try_normalize(c - q).unwrap_or_else(fallback)
    } else {
        if c.distance(q) >= r {
            return Collision::NULL;
        }
        try_normalize(q - c).unwrap_or_else(fallback)
    };
    Collision::new(c + n * r, q)
}

fn circle_point(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
    let (c, r) = world_circle(a, xa);
    let p = xb.apply(b.center());
    if c.distance(p) >= r {
        return Collision::NULL;
    }
    let n = try_normalize(p - c).unwrap_or(Vec2::X);
    Collision::new(c + n * r, p)
}

fn circle_segment(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
    let (c, r) = world_circle(a, xa);
    let (s0, s1) = world_segment(b, xb);
    let q = closest_point_on_segment(c, s0, s1);
    if c.distance(q) >= r {
        return Collision::NULL;
    }
    let n = try_normalize(q - c)
        .or_else(|| try_normalize((s1 - s0).perp()))
        .unwrap_or(Vec2::X);
    Collision::new(c + n * r, q)
}

fn project(points: &[Vec2], axis: Vec2) -> (f32, f32) {
    points
        .iter()
        .map(|p| p.dot(axis))
        .fold((f32::MAX, f32::MIN), |(lo, hi), d| (lo.min(d), hi.max(d)))
}

fn edge_normals(points: &[Vec2]) -> impl Iterator<Item = Vec2> + '_ {
    let n = points.len();
    let edges = if n == 2 { 1 } else { n };
    (0..edges).filter_map(move |i| try_normalize((points[(i + 1) % n] - points[i]).perp()))
}

/// Separating-axis test over the edge normals of `a` followed by those of `b`.
///
/// The first axis with the strictly smallest overlap wins. The result is oriented from
/// A towards B; `p1` is the first vertex of A with maximal projection on the axis.
pub fn sat_points(a: &[Vec2], b: &[Vec2]) -> Collision {
    if a.len() < 2 || b.len() < 2 {
        return Collision::NULL;
    }
    let mut best: Option<(Vec2, f32)> = None;
    for axis in edge_normals(a).chain(edge_normals(b)) {
        let (a_min, a_max) = project(a, axis);
        let (b_min, b_max) = project(b, axis);
        let overlap = a_max.min(b_max) - a_min.max(b_min);
        if overlap <= 0.0 {
            return Collision::NULL;
        }
        if best.map_or(true, |(_, smallest)| overlap < smallest) {
            best = Some((axis, overlap));
        }
    }
    let Some((mut axis, overlap)) = best else {
        return Collision::NULL;
    };
    if (vertex_average(b) - vertex_average(a)).dot(axis) < 0.0 {
        axis = -axis;
    }

    let mut p1 = a[0];
    let mut max = p1.dot(axis);
    for v in &a[1..] {
        let d = v.dot(axis);
        if d > max {
            max = d;
            p1 = *v;
        }
    }
    Collision::new(p1, p1 - axis * overlap)
}

fn sat(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
    sat_points(&world_points(a, xa), &world_points(b, xb))
}

fn polygon_point(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
    let vertices = world_points(a, xa);
    let p = xb.apply(b.center());
    if !point_in_polygon(p, &vertices) {
        return Collision::NULL;
    }
    Collision::new(closest_on_loop(p, &vertices), p)
}

fn ellipse_point(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
    let Geometry::Ellipse { center, rx, ry } = a.geometry() else {
        return Collision::NULL;
    };
    let p = xb.apply(b.center());
    let local = xa.inverse_apply(p) - *center;
    let scaled = (local.x / rx).powi(2) + (local.y / ry).powi(2);
    if scaled > 1.0 {
        return Collision::NULL;
    }
    // Radial projection of the probe onto the boundary.
    let boundary = if scaled <= GEOMETRY_EPSILON {
        Vec2::new(*rx, 0.0)
    } else {
        local / scaled.sqrt()
    };
    Collision::new(xa.apply(*center + boundary), p)
}

fn chain_segments(shape: &Shape) -> Vec<Shape> {
    let vertices = shape.vertices();
    vertices
        .windows(2)
        .filter_map(|w| Shape::line_segment(w[0], w[1]).ok())
        .collect()
}

/// Chains collide segment by segment; the deepest segment result wins.
fn chain_any(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
    chain_segments(a)
        .iter()
        .map(|segment| NarrowPhase::collide(segment, xa, b, xb))
        .fold(Collision::NULL, Collision::deepest)
}

/// Zero-area probes never overlap one another.
fn probe_miss(_: &Shape, _: &Transform, _: &Shape, _: &Transform) -> Collision {
    Collision::NULL
}

fn half_plane_circle(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
    let (origin, n) = world_half_plane(a, xa);
    let (c, r) = world_circle(b, xb);
    let s = (c - origin).dot(n);
    if s >= r {
        return Collision::NULL;
    }
    let deepest = c - n * r;
    Collision::new(deepest + n * (r - s), deepest)
}

fn support_point(shape: &Shape, xf: &Transform, direction: Vec2) -> Vec2 {
    match shape.geometry() {
        Geometry::Ellipse { center, rx, ry } => {
            let d = xf.inverse_apply_vector(direction);
            let scaled = Vec2::new(rx * rx * d.x, ry * ry * d.y);
            let denom = (rx * rx * d.x * d.x + ry * ry * d.y * d.y).sqrt();
            if denom <= GEOMETRY_EPSILON {
                return xf.apply(*center);
            }
            xf.apply(*center + scaled / denom)
        }
        Geometry::Circle { center, radius } => xf.apply(*center) + direction * *radius,
        _ => world_points(shape, xf)
            .into_iter()
            .fold((Vec2::ZERO, f32::MIN), |(best, best_d), p| {
                let d = p.dot(direction);
                if d > best_d {
                    (p, d)
                } else {
                    (best, best_d)
                }
            })
            .0,
    }
}

fn half_plane_support(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
    let (origin, n) = world_half_plane(a, xa);
    let deepest = support_point(b, xb, -n);
    let s = (deepest - origin).dot(n);
    if s >= 0.0 {
        return Collision::NULL;
    }
    Collision::new(deepest - n * s, deepest)
}

/// Two half-planes have no finite penetration; reported as no collision.
fn unbounded_pair(_: &Shape, _: &Transform, _: &Shape, _: &Transform) -> Collision {
    Collision::NULL
}

fn segment_segment(a: &Shape, xa: &Transform, b: &Shape, xb: &Transform) -> Collision {
    let (a0, a1) = world_segment(a, xa);
    let (b0, b1) = world_segment(b, xb);
    let r = a1 - a0;
    let s = b1 - b0;
    let denom = cross(r, s);
    if denom.abs() <= GEOMETRY_EPSILON {
        return Collision::NULL;
    }
    let t = cross(b0 - a0, s) / denom;
    let u = cross(b0 - a0, r) / denom;
    if !(0.0..=1.0).contains(&t) || !(0.0..=1.0).contains(&u) {
        return Collision::NULL;
    }
    let crossing = a0 + r * t;
    Collision::new(crossing, crossing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn every_kind_pair_is_covered() {
        for a in ShapeKind::ALL {
            for b in ShapeKind::ALL {
                assert!(NarrowPhase::is_covered(a, b), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn off_diagonal_pairs_have_one_direction() {
        for a in ShapeKind::ALL {
            for b in ShapeKind::ALL {
                if a != b {
                    let both = NarrowPhase::pair_test(a, b).is_some()
                        && NarrowPhase::pair_test(b, a).is_some();
                    assert!(!both, "{a:?} vs {b:?} populated twice");
                }
            }
        }
    }

    #[test]
    fn overlapping_squares_resolve_along_x() {
        let a = Shape::rectangle(0.0, 0.0, 10.0, 10.0).unwrap();
        let b = Shape::rectangle(5.0, 0.0, 10.0, 10.0).unwrap();
        let hit = a.collide_with(&b);
        assert_relative_eq!(hit.penetration_depth(), 5.0, epsilon = 1e-5);
        let n = hit.normal().unwrap();
        assert_relative_eq!(n.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(n.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn circle_rests_on_half_plane() {
        let ground = Shape::half_plane(Vec2::ZERO, Vec2::new(0.0, -1.0)).unwrap();
        let ball = Shape::circle(1.0).unwrap();
        let xf = Transform::from_position(Vec2::new(0.0, -0.75));
        let hit = NarrowPhase::collide(&ground, &Transform::IDENTITY, &ball, &xf);
        assert_relative_eq!(hit.penetration_depth(), 0.25, epsilon = 1e-5);
        assert_eq!(hit.p2(), Some(Vec2::new(0.0, 0.25)));

        let above = Transform::from_position(Vec2::new(0.0, -1.5));
        assert!(NarrowPhase::collide(&ground, &Transform::IDENTITY, &ball, &above).is_null());
    }

    #[test]
    fn crossing_segments_touch_at_intersection() {
        let a = Shape::line_segment(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)).unwrap();
        let b = Shape::line_segment(Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0)).unwrap();
        let hit = a.collide_with(&b);
        assert!(hit.is_hit());
        assert_eq!(hit.p1(), Some(Vec2::ZERO));
        assert_eq!(hit.penetration_depth(), 0.0);

        let parallel = Shape::line_segment(Vec2::new(-1.0, 0.5), Vec2::new(1.0, 0.5)).unwrap();
        assert!(a.collide_with(&parallel).is_null());
    }
}
