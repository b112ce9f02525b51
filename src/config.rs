//! Configuration constants and the per-world settings block.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Default gravity vector applied in the physics world (Y-down screen space).
pub const DEFAULT_GRAVITY: [f32; 2] = [0.0, 9.81];

/// Default number of world units per backend unit.
pub const DEFAULT_SCALE: f32 = 1.0;

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Number of velocity iterations performed by the impulse backend per step.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 8;

/// Frame budget after which a step is reported as slow.
pub const DEFAULT_FRAME_BUDGET_MS: f32 = 4.0;

/// Penetration allowed before positional correction kicks in (backend units).
pub const LINEAR_SLOP: f32 = 0.005;

/// Fraction of the positional error fed back into the velocity solve.
pub const BAUMGARTE: f32 = 0.2;

/// Approach speed below which contacts do not bounce (backend units per second).
pub const RESTITUTION_THRESHOLD: f32 = 1.0;

/// Tolerance used by geometric predicates (parallel edges, degenerate normals).
pub const GEOMETRY_EPSILON: f32 = 1e-6;

/// Number of segments used when an ellipse has to be treated as a polygon.
pub const ELLIPSE_SEGMENTS: usize = 32;

/// Settings handed to a [`PhysicsWorld`](crate::world::PhysicsWorld) at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: Vec2,
    /// World units per backend unit.
    pub scale: f32,
    pub paused: bool,
    pub debug_draw: bool,
    pub solver_iterations: u32,
    pub frame_budget_ms: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::from_array(DEFAULT_GRAVITY),
            scale: DEFAULT_SCALE,
            paused: false,
            debug_draw: false,
            solver_iterations: DEFAULT_SOLVER_ITERATIONS,
            frame_budget_ms: DEFAULT_FRAME_BUDGET_MS,
        }
    }
}

impl WorldConfig {
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_solver_iterations(mut self, iterations: u32) -> Self {
        self.solver_iterations = iterations;
        self
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    pub fn debug_draw(mut self, enabled: bool) -> Self {
        self.debug_draw = enabled;
        self
    }
}
