//! Closed family of 2D shapes used as fixtures, sensor areas and clipping inputs.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

use crate::{
    collision::{contact::Collision, narrowphase::NarrowPhase},
    config::ELLIPSE_SEGMENTS,
    core::types::Transform,
    error::{PhysicsError, Result},
    render::Surface,
    utils::math::{point_in_polygon, polygon_centroid, signed_area, try_normalize, vertex_average},
};

/// Length of the line used to draw a half-plane boundary.
const HALF_PLANE_DRAW_EXTENT: f32 = 1.0e4;

/// Discriminant of a [`Shape`], used to index the narrow-phase dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeKind {
    Circle,
    Rectangle,
    Ellipse,
    Polygon,
    PolygonalChain,
    Point,
    HalfPlane,
    LineSegment,
}

impl ShapeKind {
    pub const COUNT: usize = 8;

    pub const ALL: [ShapeKind; ShapeKind::COUNT] = [
        ShapeKind::Circle,
        ShapeKind::Rectangle,
        ShapeKind::Ellipse,
        ShapeKind::Polygon,
        ShapeKind::PolygonalChain,
        ShapeKind::Point,
        ShapeKind::HalfPlane,
        ShapeKind::LineSegment,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether shapes of this kind enclose area.
    pub fn is_solid(self) -> bool {
        matches!(
            self,
            ShapeKind::Circle
                | ShapeKind::Rectangle
                | ShapeKind::Ellipse
                | ShapeKind::Polygon
                | ShapeKind::HalfPlane
        )
    }
}

/// Raw geometry of a shape in its local frame.
///
/// This is the serialized form consumed from map loaders. It is only turned into a
/// [`Shape`] after validation, see [`Shape::try_from`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Circle { center: Vec2, radius: f32 },
    Rectangle { center: Vec2, width: f32, height: f32 },
    Ellipse { center: Vec2, rx: f32, ry: f32 },
    Polygon { vertices: Vec<Vec2> },
    PolygonalChain { vertices: Vec<Vec2> },
    Point { position: Vec2 },
    /// Solid region `{ p : (p - point) · normal <= 0 }`; the normal points out of the solid.
    HalfPlane { point: Vec2, normal: Vec2 },
    LineSegment { start: Vec2, end: Vec2 },
}

/// Immutable, validated shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Geometry", into = "Geometry")]
pub struct Shape {
    geometry: Geometry,
}

fn positive(value: f32, what: &str) -> Result<f32> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(PhysicsError::invalid_shape(format!(
            "{what} must be positive and finite, got {value}"
        )))
    }
}

fn finite_points(points: &[Vec2], what: &str) -> Result<()> {
    if points.iter().all(|p| p.is_finite()) {
        Ok(())
    } else {
        Err(PhysicsError::invalid_shape(format!(
            "{what} contains non-finite coordinates"
        )))
    }
}

impl TryFrom<Geometry> for Shape {
    type Error = PhysicsError;

    fn try_from(geometry: Geometry) -> Result<Self> {
        let geometry = match geometry {
            Geometry::Circle { center, radius } => {
                finite_points(&[center], "circle center")?;
                Geometry::Circle {
                    center,
                    radius: positive(radius, "circle radius")?,
                }
            }
            Geometry::Rectangle {
                center,
                width,
                height,
            } => {
                finite_points(&[center], "rectangle center")?;
                Geometry::Rectangle {
                    center,
                    width: positive(width, "rectangle width")?,
                    height: positive(height, "rectangle height")?,
                }
            }
            Geometry::Ellipse { center, rx, ry } => {
                finite_points(&[center], "ellipse center")?;
                Geometry::Ellipse {
                    center,
                    rx: positive(rx, "ellipse rx")?,
                    ry: positive(ry, "ellipse ry")?,
                }
            }
            Geometry::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(PhysicsError::invalid_shape(format!(
                        "polygon needs at least 3 vertices, got {}",
                        vertices.len()
                    )));
                }
                finite_points(&vertices, "polygon")?;
                Geometry::Polygon { vertices }
            }
            Geometry::PolygonalChain { vertices } => {
                if vertices.len() < 2 {
                    return Err(PhysicsError::invalid_shape(format!(
                        "polygonal chain needs at least 2 vertices, got {}",
                        vertices.len()
                    )));
                }
                finite_points(&vertices, "polygonal chain")?;
                Geometry::PolygonalChain { vertices }
            }
            Geometry::Point { position } => {
                finite_points(&[position], "point")?;
                Geometry::Point { position }
            }
            Geometry::HalfPlane { point, normal } => {
                finite_points(&[point, normal], "half-plane")?;
                let normal = try_normalize(normal).ok_or_else(|| {
                    PhysicsError::invalid_shape("half-plane normal must be non-zero")
                })?;
                Geometry::HalfPlane { point, normal }
            }
            Geometry::LineSegment { start, end } => {
                finite_points(&[start, end], "line segment")?;
                if start == end {
                    return Err(PhysicsError::invalid_shape(
                        "line segment endpoints must differ",
                    ));
                }
                Geometry::LineSegment { start, end }
            }
        };
        Ok(Shape { geometry })
    }
}

impl From<Shape> for Geometry {
    fn from(shape: Shape) -> Self {
        shape.geometry
    }
}

impl Shape {
    /// Circle centered on the local origin.
    pub fn circle(radius: f32) -> Result<Self> {
        Self::circle_at(Vec2::ZERO, radius)
    }

    pub fn circle_at(center: Vec2, radius: f32) -> Result<Self> {
        Self::try_from(Geometry::Circle { center, radius })
    }

    /// Axis-aligned rectangle described by its center and full extents.
    pub fn rectangle(center_x: f32, center_y: f32, width: f32, height: f32) -> Result<Self> {
        Self::try_from(Geometry::Rectangle {
            center: Vec2::new(center_x, center_y),
            width,
            height,
        })
    }

    pub fn ellipse(center: Vec2, rx: f32, ry: f32) -> Result<Self> {
        Self::try_from(Geometry::Ellipse { center, rx, ry })
    }

    pub fn polygon(vertices: Vec<Vec2>) -> Result<Self> {
        Self::try_from(Geometry::Polygon { vertices })
    }

    pub fn polygonal_chain(vertices: Vec<Vec2>) -> Result<Self> {
        Self::try_from(Geometry::PolygonalChain { vertices })
    }

    pub fn point(position: Vec2) -> Result<Self> {
        Self::try_from(Geometry::Point { position })
    }

    pub fn half_plane(point: Vec2, normal: Vec2) -> Result<Self> {
        Self::try_from(Geometry::HalfPlane { point, normal })
    }

    pub fn line_segment(start: Vec2, end: Vec2) -> Result<Self> {
        Self::try_from(Geometry::LineSegment { start, end })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn kind(&self) -> ShapeKind {
        match self.geometry {
            Geometry::Circle { .. } => ShapeKind::Circle,
            Geometry::Rectangle { .. } => ShapeKind::Rectangle,
            Geometry::Ellipse { .. } => ShapeKind::Ellipse,
            Geometry::Polygon { .. } => ShapeKind::Polygon,
            Geometry::PolygonalChain { .. } => ShapeKind::PolygonalChain,
            Geometry::Point { .. } => ShapeKind::Point,
            Geometry::HalfPlane { .. } => ShapeKind::HalfPlane,
            Geometry::LineSegment { .. } => ShapeKind::LineSegment,
        }
    }

    pub fn radius(&self) -> Option<f32> {
        match self.geometry {
            Geometry::Circle { radius, .. } => Some(radius),
            _ => None,
        }
    }

    /// Full width of rectangles and ellipses.
    pub fn width(&self) -> Option<f32> {
        match self.geometry {
            Geometry::Rectangle { width, .. } => Some(width),
            Geometry::Ellipse { rx, .. } => Some(2.0 * rx),
            _ => None,
        }
    }

    pub fn height(&self) -> Option<f32> {
        match self.geometry {
            Geometry::Rectangle { height, .. } => Some(height),
            Geometry::Ellipse { ry, .. } => Some(2.0 * ry),
            _ => None,
        }
    }

    /// Geometric center in the local frame. Half-planes report their boundary point.
    pub fn center(&self) -> Vec2 {
        match &self.geometry {
            Geometry::Circle { center, .. }
            | Geometry::Rectangle { center, .. }
            | Geometry::Ellipse { center, .. } => *center,
            Geometry::Polygon { vertices } => polygon_centroid(vertices),
            Geometry::PolygonalChain { vertices } => vertex_average(vertices),
            Geometry::Point { position } => *position,
            Geometry::HalfPlane { point, .. } => *point,
            Geometry::LineSegment { start, end } => (*start + *end) * 0.5,
        }
    }

    /// Vertex list in the local frame.
    ///
    /// Rectangles report their four corners counter-clockwise (Y-up), segments their two
    /// endpoints and points themselves. Circles, ellipses and half-planes have none.
    pub fn vertices(&self) -> Vec<Vec2> {
        match &self.geometry {
            Geometry::Rectangle {
                center,
                width,
                height,
            } => {
                let h = Vec2::new(width * 0.5, height * 0.5);
                vec![
                    *center + Vec2::new(-h.x, -h.y),
                    *center + Vec2::new(h.x, -h.y),
                    *center + Vec2::new(h.x, h.y),
                    *center + Vec2::new(-h.x, h.y),
                ]
            }
            Geometry::Polygon { vertices } | Geometry::PolygonalChain { vertices } => {
                vertices.clone()
            }
            Geometry::Point { position } => vec![*position],
            Geometry::LineSegment { start, end } => vec![*start, *end],
            Geometry::Circle { .. } | Geometry::Ellipse { .. } | Geometry::HalfPlane { .. } => {
                Vec::new()
            }
        }
    }

    /// Outward normal of a half-plane.
    pub fn normal(&self) -> Option<Vec2> {
        match self.geometry {
            Geometry::HalfPlane { normal, .. } => Some(normal),
            _ => None,
        }
    }

    /// Closed outline used by polygon algorithms; curved shapes are tessellated.
    pub fn outline(&self) -> Option<Vec<Vec2>> {
        match &self.geometry {
            Geometry::Rectangle { .. } | Geometry::Polygon { .. } => Some(self.vertices()),
            Geometry::Circle { center, radius } => {
                Some(ellipse_outline(*center, *radius, *radius, ELLIPSE_SEGMENTS))
            }
            Geometry::Ellipse { center, rx, ry } => {
                Some(ellipse_outline(*center, *rx, *ry, ELLIPSE_SEGMENTS))
            }
            _ => None,
        }
    }

    pub fn area(&self) -> f32 {
        match &self.geometry {
            Geometry::Circle { radius, .. } => PI * radius * radius,
            Geometry::Rectangle { width, height, .. } => width * height,
            Geometry::Ellipse { rx, ry, .. } => PI * rx * ry,
            Geometry::Polygon { vertices } => signed_area(vertices).abs(),
            Geometry::HalfPlane { .. } => f32::INFINITY,
            Geometry::PolygonalChain { .. }
            | Geometry::Point { .. }
            | Geometry::LineSegment { .. } => 0.0,
        }
    }

    /// Local-frame containment test. Zero-area probes never contain anything.
    pub fn contains(&self, point: Vec2) -> bool {
        match &self.geometry {
            Geometry::Circle { center, radius } => {
                point.distance_squared(*center) <= radius * radius
            }
            Geometry::Rectangle {
                center,
                width,
                height,
            } => {
                let d = (point - *center).abs();
                d.x <= width * 0.5 && d.y <= height * 0.5
            }
            Geometry::Ellipse { center, rx, ry } => {
                let d = point - *center;
                (d.x / rx).powi(2) + (d.y / ry).powi(2) <= 1.0
            }
            Geometry::Polygon { vertices } => point_in_polygon(point, vertices),
            Geometry::HalfPlane {
                point: origin,
                normal,
            } => (point - *origin).dot(*normal) <= 0.0,
            Geometry::PolygonalChain { .. }
            | Geometry::Point { .. }
            | Geometry::LineSegment { .. } => {
                false
            }
        }
    }

    /// Containment test for a world point with the shape placed at `transform`.
    pub fn contains_world(&self, transform: &Transform, point: Vec2) -> bool {
        self.contains(transform.inverse_apply(point))
    }

    /// Largest distance from the local origin to any point of the shape.
    pub fn bounding_radius(&self) -> f32 {
        match &self.geometry {
            Geometry::Circle { center, radius } => center.length() + radius,
            Geometry::Ellipse { center, rx, ry } => center.length() + rx.max(*ry),
            Geometry::HalfPlane { .. } => f32::INFINITY,
            _ => self
                .vertices()
                .iter()
                .map(|v| v.length())
                .fold(0.0, f32::max),
        }
    }

    /// World-space axis-aligned bounds, `None` for unbounded shapes.
    pub fn aabb(&self, transform: &Transform) -> Option<(Vec2, Vec2)> {
        match &self.geometry {
            Geometry::HalfPlane { .. } => None,
            Geometry::Circle { center, radius } => {
                let c = transform.apply(*center);
                Some((c - Vec2::splat(*radius), c + Vec2::splat(*radius)))
            }
            Geometry::Ellipse { center, rx, ry } => {
                let c = transform.apply(*center);
                let r = Vec2::splat(rx.max(*ry));
                Some((c - r, c + r))
            }
            _ => {
                let mut min = Vec2::splat(f32::MAX);
                let mut max = Vec2::splat(f32::MIN);
                for v in self.vertices() {
                    let w = transform.apply(v);
                    min = min.min(w);
                    max = max.max(w);
                }
                Some((min, max))
            }
        }
    }

    /// Uniformly scaled copy; used at the world/backend unit boundary.
    pub fn scaled(&self, factor: f32) -> Result<Shape> {
        let factor = positive(factor, "scale factor")?;
        let geometry = match &self.geometry {
            Geometry::Circle { center, radius } => Geometry::Circle {
                center: *center * factor,
                radius: radius * factor,
            },
            Geometry::Rectangle {
                center,
                width,
                height,
            } => Geometry::Rectangle {
                center: *center * factor,
                width: width * factor,
                height: height * factor,
            },
            Geometry::Ellipse { center, rx, ry } => Geometry::Ellipse {
                center: *center * factor,
                rx: rx * factor,
                ry: ry * factor,
            },
            Geometry::Polygon { vertices } => Geometry::Polygon {
                vertices: vertices.iter().map(|v| *v * factor).collect(),
            },
            Geometry::PolygonalChain { vertices } => Geometry::PolygonalChain {
                vertices: vertices.iter().map(|v| *v * factor).collect(),
            },
            Geometry::Point { position } => Geometry::Point {
                position: *position * factor,
            },
            Geometry::HalfPlane { point, normal } => Geometry::HalfPlane {
                point: *point * factor,
                normal: *normal,
            },
            Geometry::LineSegment { start, end } => Geometry::LineSegment {
                start: *start * factor,
                end: *end * factor,
            },
        };
        Shape::try_from(geometry)
    }

    /// Collision test with both shapes in the same frame.
    pub fn collide_with(&self, other: &Shape) -> Collision {
        NarrowPhase::collide(self, &Transform::IDENTITY, other, &Transform::IDENTITY)
    }

    /// Draws the shape in its local frame; the caller sets the surface transform.
    pub fn draw(&self, surface: &mut dyn Surface) {
        match &self.geometry {
            Geometry::Circle { center, radius } => surface.draw_circle(*center, *radius),
            Geometry::Rectangle {
                center,
                width,
                height,
            } => surface.draw_rectangle(*center, *width, *height),
            Geometry::Ellipse { center, rx, ry } => surface.draw_ellipse(*center, *rx, *ry),
            Geometry::Polygon { vertices } => surface.draw_polygon(vertices),
            Geometry::PolygonalChain { vertices } => surface.draw_polyline(vertices),
            Geometry::Point { position } => surface.draw_point(*position),
            Geometry::HalfPlane { point, normal } => {
                let tangent = normal.perp() * HALF_PLANE_DRAW_EXTENT;
                surface.draw_line(*point - tangent, *point + tangent);
            }
            Geometry::LineSegment { start, end } => surface.draw_line(*start, *end),
        }
    }
}

/// Closed polygon approximating an axis-aligned ellipse.
pub fn ellipse_outline(center: Vec2, rx: f32, ry: f32, segments: usize) -> Vec<Vec2> {
    let segments = segments.max(3);
    (0..segments)
        .map(|i| {
            let angle = TAU * i as f32 / segments as f32;
            center + Vec2::new(rx * angle.cos(), ry * angle.sin())
        })
        .collect()
}
