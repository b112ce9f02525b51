//! Greiner–Hormann polygon clipping.
//!
//! Both input polygons are stored as rings of corner nodes in a single arena. Nodes
//! link to each other by index (`next`, `prev`, `neighbour`), so the cyclic graph needs
//! no shared ownership. Crossing points are inserted into both rings and paired through
//! `neighbour`; walking the rings and hopping between paired nodes traces the output
//! boundaries.
//!
//! The walk needs every contact between the boundaries to be a proper crossing. A vertex
//! lying on the other boundary (shared corners, collinear overlapping edges) is nudged a
//! short distance into its own polygon before the graph is built. Output vertices are
//! mapped back onto the unperturbed geometry.

use glam::Vec2;

use crate::{
    collision::shapes::Shape,
    config::GEOMETRY_EPSILON,
    error::{PhysicsError, Result},
    utils::math::{cross, distance_to_boundary, point_in_polygon, signed_area, try_normalize},
};

/// Nudge distance as a fraction of the inputs' combined extent.
const NUDGE_FRACTION: f32 = 1.0e-4;
/// Rounds of vertex nudging before the graph is built as is.
const NUDGE_PASSES: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Node {
    point: Vec2,
    /// Where the node lies on the unperturbed inputs.
    origin: Vec2,
    next: usize,
    prev: usize,
    neighbour: Option<usize>,
    intersect: bool,
    entry: bool,
    visited: bool,
    /// Parameter along the original edge the node was inserted on.
    alpha: f32,
}

impl Node {
    fn corner(point: Vec2, origin: Vec2) -> Self {
        Self {
            point,
            origin,
            next: 0,
            prev: 0,
            neighbour: None,
            intersect: false,
            entry: false,
            visited: false,
            alpha: 0.0,
        }
    }

    fn crossing(point: Vec2, origin: Vec2, alpha: f32) -> Self {
        Self {
            intersect: true,
            alpha,
            ..Self::corner(point, origin)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Intersection,
    Union,
}

/// Distances derived from the size of the inputs.
#[derive(Debug, Clone, Copy)]
struct Tolerance {
    nudge: f32,
    on_boundary: f32,
    snap: f32,
    sliver_area: f32,
}

impl Tolerance {
    fn for_inputs(subject: &[Vec2], clip: &[Vec2]) -> Self {
        let (min, max) = subject.iter().chain(clip).fold(
            (Vec2::splat(f32::MAX), Vec2::splat(f32::MIN)),
            |(lo, hi), p| (lo.min(*p), hi.max(*p)),
        );
        let extent = (max - min).max_element().max(1.0);
        let nudge = extent * NUDGE_FRACTION;
        Self {
            nudge,
            on_boundary: nudge * 0.1,
            snap: nudge * 8.0,
            sliver_area: nudge * extent,
        }
    }
}

/// Moves every vertex of `ring` that lies on the boundary of `other` into `ring`'s
/// interior. Returns whether anything moved.
fn nudge_off(ring: &mut [Vec2], other: &[Vec2], tolerance: &Tolerance) -> bool {
    let n = ring.len();
    let mut moved = false;
    for i in 0..n {
        let v = ring[i];
        if distance_to_boundary(v, other) > tolerance.on_boundary {
            continue;
        }
        let (prev, next) = (ring[(i + n - 1) % n], ring[(i + 1) % n]);
        let spread = (prev - v).normalize_or_zero() + (next - v).normalize_or_zero();
        let bisector = try_normalize(spread)
            .or_else(|| try_normalize((next - prev).perp()))
            .unwrap_or(Vec2::Y);
        let inward = if point_in_polygon(v + bisector * tolerance.nudge, ring) {
            bisector
        } else {
            -bisector
        };
        ring[i] = [0.0_f32, 0.5, -0.5]
            .iter()
            .map(|&turn| v + Vec2::from_angle(turn).rotate(inward) * tolerance.nudge)
            .find(|p| distance_to_boundary(*p, other) > tolerance.on_boundary)
            .unwrap_or(v + inward * tolerance.nudge);
        moved = true;
    }
    moved
}

/// Copies of both rings with no vertex left on the other ring's boundary.
fn separate(subject: &[Vec2], clip: &[Vec2], tolerance: &Tolerance) -> (Vec<Vec2>, Vec<Vec2>) {
    let (mut s, mut c) = (subject.to_vec(), clip.to_vec());
    for _ in 0..NUDGE_PASSES {
        let moved_subject = nudge_off(&mut s, &c, tolerance);
        let moved_clip = nudge_off(&mut c, &s, tolerance);
        if !moved_subject && !moved_clip {
            break;
        }
    }
    (s, c)
}

/// Location of a crossing on the unperturbed edges `p0-p1` and `q0-q1`.
///
/// Lines that still meet near the perturbed crossing give the exact point; a crossing
/// produced by a nudge resolves to the original corner it was nudged away from.
fn crossing_origin(point: Vec2, edges: [Vec2; 4], tolerance: &Tolerance) -> Vec2 {
    let [p0, p1, q0, q1] = edges;
    let (r, s) = (p1 - p0, q1 - q0);
    let denom = cross(r, s);
    if denom.abs() > GEOMETRY_EPSILON * r.length() * s.length() {
        let exact = p0 + r * (cross(q0 - p0, s) / denom);
        if exact.distance(point) <= tolerance.snap {
            return exact;
        }
    }
    edges
        .into_iter()
        .filter(|corner| corner.distance(point) <= tolerance.snap)
        .min_by(|a, b| a.distance(point).total_cmp(&b.distance(point)))
        .unwrap_or(point)
}

/// Drops repeated vertices and rejects rings that collapsed to a sliver.
fn tidy(mut ring: Vec<Vec2>, tolerance: &Tolerance) -> Option<Vec<Vec2>> {
    ring.dedup_by(|a, b| a.distance(*b) <= tolerance.on_boundary);
    while ring.len() > 1 && ring[0].distance(ring[ring.len() - 1]) <= tolerance.on_boundary {
        ring.pop();
    }
    (ring.len() >= 3 && signed_area(&ring).abs() > tolerance.sliver_area).then_some(ring)
}

struct ClipGraph {
    nodes: Vec<Node>,
    subject_start: usize,
    clip_start: usize,
    crossings: usize,
}

impl ClipGraph {
    fn new(
        subject: (&[Vec2], &[Vec2]),
        clip: (&[Vec2], &[Vec2]),
        tolerance: &Tolerance,
    ) -> Self {
        let mut graph = Self {
            nodes: Vec::with_capacity(subject.0.len() + clip.0.len()),
            subject_start: 0,
            clip_start: subject.0.len(),
            crossings: 0,
        };
        graph.push_ring(subject.0, subject.1);
        graph.push_ring(clip.0, clip.1);
        graph.insert_crossings(subject, clip, tolerance);
        graph
    }

    fn push_ring(&mut self, points: &[Vec2], origins: &[Vec2]) {
        let base = self.nodes.len();
        let n = points.len();
        for (i, (p, o)) in points.iter().zip(origins).enumerate() {
            let mut node = Node::corner(*p, *o);
            node.next = base + (i + 1) % n;
            node.prev = base + (i + n - 1) % n;
            self.nodes.push(node);
        }
    }

    /// Inserts `node` after the corner `from`, keeping crossings sorted by `alpha`.
    fn insert_sorted(&mut self, from: usize, node: Node) -> usize {
        let mut cursor = from;
        loop {
            let next = self.nodes[cursor].next;
            if self.nodes[next].intersect && self.nodes[next].alpha < node.alpha {
                cursor = next;
            } else {
                break;
            }
        }
        let index = self.nodes.len();
        let next = self.nodes[cursor].next;
        self.nodes.push(Node {
            prev: cursor,
            next,
            ..node
        });
        self.nodes[cursor].next = index;
        self.nodes[next].prev = index;
        index
    }

    fn insert_crossings(
        &mut self,
        (subject, subject_origin): (&[Vec2], &[Vec2]),
        (clip, clip_origin): (&[Vec2], &[Vec2]),
        tolerance: &Tolerance,
    ) {
        let (n, m) = (subject.len(), clip.len());
        for i in 0..n {
            let (p0, p1) = (subject[i], subject[(i + 1) % n]);
            for j in 0..m {
                let (q0, q1) = (clip[j], clip[(j + 1) % m]);
                let Some((alpha_p, alpha_q)) = crossing_parameters(p0, p1, q0, q1) else {
                    continue;
                };
                let point = p0 + (p1 - p0) * alpha_p;
                let edges = [
                    subject_origin[i],
                    subject_origin[(i + 1) % n],
                    clip_origin[j],
                    clip_origin[(j + 1) % m],
                ];
                let origin = crossing_origin(point, edges, tolerance);
                let a = self.insert_sorted(
                    self.subject_start + i,
                    Node::crossing(point, origin, alpha_p),
                );
                let b =
                    self.insert_sorted(self.clip_start + j, Node::crossing(point, origin, alpha_q));
                self.nodes[a].neighbour = Some(b);
                self.nodes[b].neighbour = Some(a);
                self.crossings += 1;
            }
        }
    }

    fn ring(&self, start: usize) -> Vec<usize> {
        let mut indices = vec![start];
        let mut cursor = self.nodes[start].next;
        while cursor != start && indices.len() <= self.nodes.len() {
            indices.push(cursor);
            cursor = self.nodes[cursor].next;
        }
        indices
    }

    /// Alternates entry/exit flags along a ring, seeded from the first corner.
    fn classify(&mut self, start: usize, first_inside_other: bool, operation: Operation) {
        let mut entry = match operation {
            Operation::Intersection => !first_inside_other,
            Operation::Union => first_inside_other,
        };
        for index in self.ring(start) {
            if self.nodes[index].intersect {
                self.nodes[index].entry = entry;
                entry = !entry;
            }
        }
    }

    fn visit(&mut self, index: usize) {
        self.nodes[index].visited = true;
        if let Some(neighbour) = self.nodes[index].neighbour {
            self.nodes[neighbour].visited = true;
        }
    }

    fn first_unvisited(&self) -> Option<usize> {
        self.ring(self.subject_start)
            .into_iter()
            .find(|&i| self.nodes[i].intersect && !self.nodes[i].visited)
    }

    fn walk(&mut self, tolerance: &Tolerance) -> Vec<Vec<Vec2>> {
        let budget = self.nodes.len() * 2 + 4;
        let mut output = Vec::new();
        while let Some(start) = self.first_unvisited() {
            let mut polygon = vec![self.nodes[start].origin];
            let mut current = start;
            let mut steps = 0;
            loop {
                self.visit(current);
                let forward = self.nodes[current].entry;
                loop {
                    current = if forward {
                        self.nodes[current].next
                    } else {
                        self.nodes[current].prev
                    };
                    polygon.push(self.nodes[current].origin);
                    steps += 1;
                    if self.nodes[current].intersect || steps > budget {
                        break;
                    }
                }
                match self.nodes[current].neighbour {
                    Some(neighbour) => current = neighbour,
                    None => break,
                }
                if self.nodes[current].visited || steps > budget {
                    break;
                }
            }
            if steps > budget {
                log::warn!("Polygon clipping walk did not close; dropping partial boundary");
                self.visit(start);
                continue;
            }
            if let Some(ring) = tidy(polygon, tolerance) {
                output.push(ring);
            }
        }
        output
    }
}

/// Edge parameters where `p0-p1` meets `q0-q1`, endpoints included.
///
/// Parallel edges never cross.
fn crossing_parameters(p0: Vec2, p1: Vec2, q0: Vec2, q1: Vec2) -> Option<(f32, f32)> {
    let r = p1 - p0;
    let s = q1 - q0;
    let denom = cross(r, s);
    if denom.abs() <= GEOMETRY_EPSILON * r.length().max(s.length()).max(1.0) {
        return None;
    }
    let d = q0 - p0;
    let alpha_p = cross(d, s) / denom;
    let alpha_q = cross(d, r) / denom;
    let on_edge = |t: f32| (0.0..=1.0).contains(&t);
    (on_edge(alpha_p) && on_edge(alpha_q)).then_some((alpha_p, alpha_q))
}

/// Result of clipping two rings whose boundaries may not cross at all.
enum Clipped {
    Rings(Vec<Vec<Vec2>>),
    /// The boundaries never cross; flags tell whether each input lies inside the other.
    Apart {
        subject_inside: bool,
        clip_inside: bool,
    },
}

fn run(subject: &[Vec2], clip: &[Vec2], operation: Operation) -> Clipped {
    if subject.len() < 3 || clip.len() < 3 {
        return Clipped::Rings(Vec::new());
    }
    let tolerance = Tolerance::for_inputs(subject, clip);
    let (nudged_subject, nudged_clip) = separate(subject, clip, &tolerance);
    let subject_inside = point_in_polygon(nudged_subject[0], &nudged_clip);
    let clip_inside = point_in_polygon(nudged_clip[0], &nudged_subject);

    let mut graph = ClipGraph::new(
        (nudged_subject.as_slice(), subject),
        (nudged_clip.as_slice(), clip),
        &tolerance,
    );
    if graph.crossings == 0 {
        return Clipped::Apart {
            subject_inside,
            clip_inside,
        };
    }
    graph.classify(graph.subject_start, subject_inside, operation);
    graph.classify(graph.clip_start, clip_inside, operation);
    Clipped::Rings(graph.walk(&tolerance))
}

/// Raw Greiner–Hormann intersection. Empty when no edges cross.
pub fn greiner_hormann_intersection(subject: &[Vec2], clip: &[Vec2]) -> Vec<Vec<Vec2>> {
    match run(subject, clip, Operation::Intersection) {
        Clipped::Rings(rings) => rings,
        Clipped::Apart { .. } => Vec::new(),
    }
}

/// Raw Greiner–Hormann union. Empty when no edges cross.
pub fn greiner_hormann_union(subject: &[Vec2], clip: &[Vec2]) -> Vec<Vec<Vec2>> {
    match run(subject, clip, Operation::Union) {
        Clipped::Rings(rings) => rings,
        Clipped::Apart { .. } => Vec::new(),
    }
}

/// Intersection of two simple polygons. Nested inputs yield the inner one.
pub fn intersection(subject: &[Vec2], clip: &[Vec2]) -> Vec<Vec<Vec2>> {
    match run(subject, clip, Operation::Intersection) {
        Clipped::Rings(rings) => rings,
        Clipped::Apart {
            subject_inside: true,
            ..
        } => vec![subject.to_vec()],
        Clipped::Apart {
            clip_inside: true, ..
        } => vec![clip.to_vec()],
        Clipped::Apart { .. } => Vec::new(),
    }
}

/// Union of two simple polygons. Nested inputs yield the outer one, disjoint inputs both.
pub fn union(subject: &[Vec2], clip: &[Vec2]) -> Vec<Vec<Vec2>> {
    match run(subject, clip, Operation::Union) {
        Clipped::Rings(rings) => rings,
        Clipped::Apart {
            subject_inside: true,
            ..
        } => vec![clip.to_vec()],
        Clipped::Apart {
            clip_inside: true, ..
        } => vec![subject.to_vec()],
        Clipped::Apart { .. } => vec![subject.to_vec(), clip.to_vec()],
    }
}

fn clip_outline(shape: &Shape) -> Result<Vec<Vec2>> {
    shape.outline().ok_or_else(|| {
        PhysicsError::invalid_argument(format!(
            "{:?} shapes have no closed outline to clip",
            shape.kind()
        ))
    })
}

fn into_polygons(rings: Vec<Vec<Vec2>>) -> Vec<Shape> {
    rings
        .into_iter()
        .filter_map(|ring| Shape::polygon(ring).ok())
        .collect()
}

impl Shape {
    /// Intersection of two solid shapes expressed in the same frame.
    ///
    /// Circles and ellipses are clipped through their tessellated outline.
    pub fn clip_intersection(&self, other: &Shape) -> Result<Vec<Shape>> {
        let (a, b) = (clip_outline(self)?, clip_outline(other)?);
        Ok(into_polygons(intersection(&a, &b)))
    }

    /// Union of two solid shapes expressed in the same frame.
    pub fn clip_union(&self, other: &Shape) -> Result<Vec<Shape>> {
        let (a, b) = (clip_outline(self)?, clip_outline(other)?);
        Ok(into_polygons(union(&a, &b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Vec2> {
        vec![
            Vec2::new(x0, y0),
            Vec2::new(x1, y0),
            Vec2::new(x1, y1),
            Vec2::new(x0, y1),
        ]
    }

    #[test]
    fn overlapping_rectangles_intersect_and_unite() {
        let p = rect(0.0, 0.0, 4.0, 4.0);
        let q = rect(2.0, 1.0, 6.0, 3.0);

        let inter = greiner_hormann_intersection(&p, &q);
        assert_eq!(inter.len(), 1);
        assert_eq!(inter[0].len(), 4);
        assert_relative_eq!(signed_area(&inter[0]).abs(), 4.0, epsilon = 1e-4);

        let uni = greiner_hormann_union(&p, &q);
        assert_eq!(uni.len(), 1);
        assert_eq!(uni[0].len(), 8);
        assert_relative_eq!(signed_area(&uni[0]).abs(), 20.0, epsilon = 1e-4);
    }

    #[test]
    fn raw_walk_is_empty_without_crossings() {
        let outer = rect(0.0, 0.0, 10.0, 10.0);
        let inner = rect(2.0, 2.0, 4.0, 4.0);
        assert!(greiner_hormann_intersection(&outer, &inner).is_empty());
        assert_eq!(intersection(&outer, &inner), vec![inner.clone()]);
        assert_eq!(union(&outer, &inner), vec![outer.clone()]);

        let far = rect(20.0, 20.0, 21.0, 21.0);
        assert!(intersection(&outer, &far).is_empty());
        assert_eq!(union(&outer, &far).len(), 2);
    }

    #[test]
    fn parallel_edges_never_cross() {
        let flat = crossing_parameters(Vec2::ZERO, Vec2::X, Vec2::Y, Vec2::new(1.0, 1.0));
        assert!(flat.is_none());
        let along =
            crossing_parameters(Vec2::ZERO, Vec2::X, Vec2::new(0.5, 0.0), Vec2::new(2.0, 0.0));
        assert!(along.is_none());
    }

    #[test]
    fn endpoint_contacts_count_as_crossings() {
        let (p, q) = crossing_parameters(
            Vec2::ZERO,
            Vec2::X,
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
        )
        .unwrap();
        assert_relative_eq!(p, 1.0, epsilon = 1e-6);
        assert_relative_eq!(q, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn shared_corners_are_nudged_inward() {
        let outer = rect(0.0, 0.0, 10.0, 10.0);
        let corner = rect(0.0, 0.0, 2.0, 2.0);
        let tolerance = Tolerance::for_inputs(&outer, &corner);
        let (nudged, _) = separate(&corner, &outer, &tolerance);
        for (moved, original) in nudged.iter().zip(&corner) {
            assert!(moved.distance(*original) <= tolerance.nudge * 2.0);
            assert!(distance_to_boundary(*moved, &outer) > tolerance.on_boundary);
        }
        assert!(point_in_polygon(nudged[0], &corner));
    }
}
