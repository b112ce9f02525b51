//! Mass properties derived from fixture shapes and density.

use glam::Vec2;
use std::f32::consts::PI;

use crate::{
    collision::shapes::{Geometry, Shape},
    utils::math::cross,
};

/// Mass, rotational inertia about the center of mass, and the local center of mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassProperties {
    pub mass: f32,
    pub inverse_mass: f32,
    pub inertia: f32,
    pub inverse_inertia: f32,
    pub local_center: Vec2,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self::immovable()
    }
}

impl MassProperties {
    /// Infinite mass: static and kinematic bodies.
    pub fn immovable() -> Self {
        Self {
            mass: 0.0,
            inverse_mass: 0.0,
            inertia: 0.0,
            inverse_inertia: 0.0,
            local_center: Vec2::ZERO,
        }
    }

    /// Accumulates every finite-area shape with the given density.
    ///
    /// A dynamic body without mass-bearing shapes gets a unit mass at its origin.
    pub fn from_shapes<'a>(
        shapes: impl IntoIterator<Item = &'a Shape>,
        density: f32,
        fixed_rotation: bool,
    ) -> Self {
        let density = density.max(0.0);
        let mut mass = 0.0;
        let mut first_moment = Vec2::ZERO;
        let mut origin_inertia = 0.0;
        for shape in shapes {
            if let Some((m, center, i)) = shape_mass(shape, density) {
                mass += m;
                first_moment += center * m;
                origin_inertia += i;
            }
        }

        if mass <= f32::EPSILON {
            return Self {
                mass: 1.0,
                inverse_mass: 1.0,
                inertia: 0.0,
                inverse_inertia: 0.0,
                local_center: Vec2::ZERO,
            };
        }

        let local_center = first_moment / mass;
        let inertia = (origin_inertia - mass * local_center.length_squared()).max(0.0);
        let inverse_inertia = if fixed_rotation || inertia <= f32::EPSILON {
            0.0
        } else {
            1.0 / inertia
        };
        Self {
            mass,
            inverse_mass: 1.0 / mass,
            inertia,
            inverse_inertia,
            local_center,
        }
    }
}

/// `(mass, local centroid, inertia about the local origin)` for a single shape.
fn shape_mass(shape: &Shape, density: f32) -> Option<(f32, Vec2, f32)> {
    match shape.geometry() {
        Geometry::Circle { center, radius } => {
            let m = density * PI * radius * radius;
            Some((m, *center, m * (0.5 * radius * radius + center.length_squared())))
        }
        Geometry::Rectangle {
            center,
            width,
            height,
        } => {
            let m = density * width * height;
            let i = m * (width * width + height * height) / 12.0;
            Some((m, *center, i + m * center.length_squared()))
        }
        Geometry::Ellipse { center, rx, ry } => {
            let m = density * PI * rx * ry;
            let i = m * (rx * rx + ry * ry) / 4.0;
            Some((m, *center, i + m * center.length_squared()))
        }
        Geometry::Polygon { vertices } => polygon_mass(vertices, density),
        Geometry::HalfPlane { .. }
        | Geometry::PolygonalChain { .. }
        | Geometry::Point { .. }
        | Geometry::LineSegment { .. } => None,
    }
}

fn polygon_mass(vertices: &[Vec2], density: f32) -> Option<(f32, Vec2, f32)> {
    let n = vertices.len();
    let mut area = 0.0;
    let mut centroid = Vec2::ZERO;
    let mut inertia = 0.0;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        let c = cross(a, b);
        area += 0.5 * c;
        centroid += (a + b) * c;
        inertia += c * (a.dot(a) + a.dot(b) + b.dot(b));
    }
    if area.abs() <= f32::EPSILON {
        return None;
    }
    // Orientation cancels out once both sums share the area's sign.
    let centroid = centroid / (6.0 * area);
    let mass = density * area.abs();
    let inertia = density * (inertia / 12.0).abs();
    Some((mass, centroid, inertia))
}
