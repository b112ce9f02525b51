use glam::{Affine2, Vec2};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::PhysicsError;

/// Rigid 2D placement: rotation about the origin followed by a translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec2,
    /// Rotation in radians.
    pub rotation: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec2::ZERO,
        rotation: 0.0,
    };

    pub fn new(position: Vec2, rotation: f32) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec2) -> Self {
        Self {
            position,
            rotation: 0.0,
        }
    }

    /// Builds a homogeneous matrix representation of the transform.
    pub fn to_matrix(&self) -> Affine2 {
        Affine2::from_angle_translation(self.rotation, self.position)
    }

    pub fn apply(&self, point: Vec2) -> Vec2 {
        self.position + self.apply_vector(point)
    }

    pub fn apply_vector(&self, vector: Vec2) -> Vec2 {
        Vec2::from_angle(self.rotation).rotate(vector)
    }

    /// Maps a world point back into this transform's local frame.
    pub fn inverse_apply(&self, point: Vec2) -> Vec2 {
        Vec2::from_angle(-self.rotation).rotate(point - self.position)
    }

    pub fn inverse_apply_vector(&self, vector: Vec2) -> Vec2 {
        Vec2::from_angle(-self.rotation).rotate(vector)
    }

    pub fn inverse(&self) -> Transform {
        Transform {
            position: Vec2::from_angle(-self.rotation).rotate(-self.position),
            rotation: -self.rotation,
        }
    }

    /// Applies `other` (expressed in this frame) on top of this transform.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.apply(other.position),
            rotation: self.rotation + other.rotation,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.position == Vec2::ZERO && self.rotation == 0.0
    }
}

/// Linear and angular velocity of a body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec2,
    pub angular: f32,
}

/// Surface and mass coefficients shared by all fixtures of a body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            density: 1.0,
            friction: 0.2,
            restitution: 0.0,
        }
    }
}

impl Material {
    pub fn rubber() -> Self {
        Self {
            density: 1.4,
            friction: 1.0,
            restitution: 0.8,
        }
    }

    pub fn ice() -> Self {
        Self {
            density: 0.9,
            friction: 0.03,
            restitution: 0.05,
        }
    }

    /// Friction used for a contact between two materials.
    pub fn mixed_friction(&self, other: &Material) -> f32 {
        (self.friction.max(0.0) * other.friction.max(0.0)).sqrt()
    }

    pub fn mixed_restitution(&self, other: &Material) -> f32 {
        self.restitution.max(other.restitution)
    }
}

/// How the simulation treats a body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    #[default]
    Dynamic,
    Kinematic,
    Static,
}

impl BodyType {
    pub fn is_dynamic(self) -> bool {
        matches!(self, BodyType::Dynamic)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BodyType::Dynamic => "dynamic",
            BodyType::Kinematic => "kinematic",
            BodyType::Static => "static",
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BodyType {
    type Err = PhysicsError;

    /// Parses body-type strings as produced by map loaders (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dynamic" => Ok(BodyType::Dynamic),
            "kinematic" => Ok(BodyType::Kinematic),
            "static" => Ok(BodyType::Static),
            other => Err(PhysicsError::invalid_argument(format!(
                "unknown body type '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn inverse_undoes_transform() {
        let xf = Transform::new(Vec2::new(3.0, -2.0), 0.7);
        let p = Vec2::new(1.5, 4.0);
        let back = xf.inverse().apply(xf.apply(p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-5);

        let local = xf.inverse_apply(xf.apply(p));
        assert_relative_eq!(local.x, p.x, epsilon = 1e-5);
        assert_relative_eq!(local.y, p.y, epsilon = 1e-5);
    }

    #[test]
    fn combine_matches_matrix_product() {
        let parent = Transform::new(Vec2::new(10.0, 0.0), FRAC_PI_2);
        let child = Transform::from_position(Vec2::new(1.0, 0.0));
        let world = parent.combine(&child);
        assert_relative_eq!(world.position.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(world.position.y, 1.0, epsilon = 1e-5);

        let via_matrix = (parent.to_matrix() * child.to_matrix()).transform_point2(Vec2::ZERO);
        assert_relative_eq!(via_matrix.x, world.position.x, epsilon = 1e-5);
        assert_relative_eq!(via_matrix.y, world.position.y, epsilon = 1e-5);
    }

    #[test]
    fn body_type_parses_loader_strings() {
        assert_eq!("Dynamic".parse::<BodyType>(), Ok(BodyType::Dynamic));
        assert_eq!(" static ".parse::<BodyType>(), Ok(BodyType::Static));
        assert!("floating".parse::<BodyType>().is_err());
    }
}
