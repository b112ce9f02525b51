//! Drawing collaborator used for debug rendering of shapes, figures and bodies.
//!
//! The core never touches pixels. It places the surface with [`Surface::set_transform`]
//! and then issues primitives in local coordinates.

use glam::Vec2;

use crate::core::types::Transform;

/// Abstract drawing target supplied by the host application.
pub trait Surface {
    /// Sets the transform applied to every following primitive.
    fn set_transform(&mut self, transform: Transform);

    fn draw_circle(&mut self, center: Vec2, radius: f32);

    fn draw_ellipse(&mut self, center: Vec2, rx: f32, ry: f32);

    /// Axis-aligned in the current local frame.
    fn draw_rectangle(&mut self, center: Vec2, width: f32, height: f32);

    /// Closed polygon.
    fn draw_polygon(&mut self, points: &[Vec2]);

    /// Open polyline.
    fn draw_polyline(&mut self, points: &[Vec2]);

    fn draw_line(&mut self, from: Vec2, to: Vec2);

    fn draw_point(&mut self, point: Vec2);
}

/// A single primitive captured by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    SetTransform(Transform),
    Circle { center: Vec2, radius: f32 },
    Ellipse { center: Vec2, rx: f32, ry: f32 },
    Rectangle { center: Vec2, width: f32, height: f32 },
    Polygon(Vec<Vec2>),
    Polyline(Vec<Vec2>),
    Line { from: Vec2, to: Vec2 },
    Point(Vec2),
}

/// Surface that records every call, for headless debugging and tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingSurface {
    pub commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded primitives, ignoring transform changes.
    pub fn primitive_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| !matches!(c, DrawCommand::SetTransform(_)))
            .count()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl Surface for RecordingSurface {
    fn set_transform(&mut self, transform: Transform) {
        self.commands.push(DrawCommand::SetTransform(transform));
    }

    fn draw_circle(&mut self, center: Vec2, radius: f32) {
        self.commands.push(DrawCommand::Circle { center, radius });
    }

    fn draw_ellipse(&mut self, center: Vec2, rx: f32, ry: f32) {
        self.commands.push(DrawCommand::Ellipse { center, rx, ry });
    }

    fn draw_rectangle(&mut self, center: Vec2, width: f32, height: f32) {
        self.commands.push(DrawCommand::Rectangle {
            center,
            width,
            height,
        });
    }

    fn draw_polygon(&mut self, points: &[Vec2]) {
        self.commands.push(DrawCommand::Polygon(points.to_vec()));
    }

    fn draw_polyline(&mut self, points: &[Vec2]) {
        self.commands.push(DrawCommand::Polyline(points.to_vec()));
    }

    fn draw_line(&mut self, from: Vec2, to: Vec2) {
        self.commands.push(DrawCommand::Line { from, to });
    }

    fn draw_point(&mut self, point: Vec2) {
        self.commands.push(DrawCommand::Point(point));
    }
}
