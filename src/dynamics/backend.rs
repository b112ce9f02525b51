//! Interface between the world container and the rigid-body simulation it drives.
//!
//! Everything crossing this boundary is expressed in backend units; the world applies
//! its scale factor before calling in and after reading back.

use glam::Vec2;

use crate::{
    collision::shapes::Shape,
    core::types::{BodyType, Material},
    utils::allocator::Handle,
};

/// Identifies which owned shape of a body a fixture was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FixtureSlot {
    /// Index into the body's shape list.
    Shape(usize),
    /// Identity of the hosting sensor, stable across re-attachment.
    Sensor(usize),
}

impl FixtureSlot {
    pub fn is_sensor(self) -> bool {
        matches!(self, FixtureSlot::Sensor(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureDef {
    pub shape: Shape,
    pub slot: FixtureSlot,
}

impl FixtureDef {
    pub fn new(shape: Shape, slot: FixtureSlot) -> Self {
        Self { shape, slot }
    }

    pub fn is_sensor(&self) -> bool {
        self.slot.is_sensor()
    }
}

/// Everything needed to create a simulation body.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendBodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub fixed_rotation: bool,
    pub material: Material,
    pub fixtures: Vec<FixtureDef>,
}

/// Mutable state read back from a simulation body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendBodyState {
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointKind {
    /// Keeps the anchors at a fixed distance.
    Rod { length: f32 },
    /// Keeps the anchors at most `max_length` apart.
    Rope { max_length: f32 },
    /// Pins both anchors to one shared point.
    Hinge,
}

/// Constraint between two simulation bodies; anchors are world points in backend units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendJointDef {
    pub body_a: Handle,
    pub body_b: Handle,
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,
    pub kind: JointKind,
}

/// One touching fixture pair, with `body_a <= body_b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureContact {
    pub body_a: Handle,
    pub slot_a: FixtureSlot,
    pub body_b: Handle,
    pub slot_b: FixtureSlot,
}

impl FixtureContact {
    /// Builds the pair in canonical order.
    pub fn new(body_a: Handle, slot_a: FixtureSlot, body_b: Handle, slot_b: FixtureSlot) -> Self {
        if (body_b, slot_b) < (body_a, slot_a) {
            Self {
                body_a: body_b,
                slot_a: slot_b,
                body_b: body_a,
                slot_b: slot_a,
            }
        } else {
            Self {
                body_a,
                slot_a,
                body_b,
                slot_b,
            }
        }
    }

    pub fn involves(&self, body: Handle) -> bool {
        self.body_a == body || self.body_b == body
    }
}

/// Rigid-body simulation driven by a [`PhysicsWorld`](crate::world::PhysicsWorld).
///
/// Operations on unknown handles are ignored and report `false`/`None`.
pub trait PhysicsBackend: Send + Sync {
    fn name(&self) -> &str;

    fn set_gravity(&mut self, gravity: Vec2);

    fn gravity(&self) -> Vec2;

    fn create_body(&mut self, def: &BackendBodyDef) -> Handle;

    /// Removes the body and every joint attached to it, returning its last state.
    fn destroy_body(&mut self, body: Handle) -> Option<BackendBodyState>;

    fn body_state(&self, body: Handle) -> Option<BackendBodyState>;

    fn set_linear_velocity(&mut self, body: Handle, velocity: Vec2) -> bool;

    fn set_angular_velocity(&mut self, body: Handle, velocity: f32) -> bool;

    fn set_damping(&mut self, body: Handle, linear: f32, angular: f32) -> bool;

    fn set_fixed_rotation(&mut self, body: Handle, fixed: bool) -> bool;

    /// Force applied at a world point, accumulated until the next step.
    fn apply_force(&mut self, body: Handle, force: Vec2, point: Vec2) -> bool;

    fn apply_torque(&mut self, body: Handle, torque: f32) -> bool;

    fn apply_linear_impulse(&mut self, body: Handle, impulse: Vec2, point: Vec2) -> bool;

    fn apply_angular_impulse(&mut self, body: Handle, impulse: f32) -> bool;

    /// Mass the backend derived from the body's fixtures; zero for non-dynamic bodies.
    fn mass(&self, body: Handle) -> Option<f32>;

    fn create_joint(&mut self, def: &BackendJointDef) -> Option<Handle>;

    fn destroy_joint(&mut self, joint: Handle) -> bool;

    fn step(&mut self, dt: f32);

    /// Fixture pairs found touching during the last step.
    fn touching(&self) -> &[FixtureContact];

    fn body_count(&self) -> usize;

    fn joint_count(&self) -> usize;
}
