//! kinetic2d – 2D collision and physics integration layer.
//!
//! This crate provides a closed family of collision shapes with narrow-phase routines
//! and polygon clipping, a figure/transform hierarchy, and a body lifecycle layer that
//! moves bodies in and out of a pluggable rigid-body backend owned by a
//! [`PhysicsWorld`].

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod render;
pub mod utils;
pub mod world;

pub use glam::Vec2;

pub use collision::{
    clipping::{intersection, union},
    contact::Collision,
    narrowphase::NarrowPhase,
    shapes::{Geometry, Shape, ShapeKind},
};
pub use config::WorldConfig;
pub use core::{
    body::{Body, BodyDef, BodyKey, BodyListener, BodySnapshot},
    constraints::Joint,
    figure::Figure,
    sensor::{FixtureRef, Sensor},
    types::{BodyType, Material, Transform, Velocity},
};
pub use dynamics::{backend::PhysicsBackend, impulse::ImpulseBackend, JointKind};
pub use error::{PhysicsError, Result};
pub use render::{DrawCommand, RecordingSurface, Surface};
pub use world::PhysicsWorld;

/// High-level convenience wrapper that drives a [`PhysicsWorld`] at a fixed timestep.
pub struct PhysicsEngine {
    world: PhysicsWorld,
    timestep: f32,
    accumulator: f32,
    max_substeps: u32,
}

impl PhysicsEngine {
    /// Creates a new engine stepping a fresh world with the provided fixed timestep.
    pub fn new(timestep: f32) -> Self {
        Self::with_world(PhysicsWorld::default(), timestep)
    }

    pub fn with_world(world: PhysicsWorld, timestep: f32) -> Self {
        let timestep = if timestep.is_finite() && timestep > 0.0 {
            timestep
        } else {
            log::warn!("Invalid timestep {timestep}; using {}", config::DEFAULT_TIME_STEP);
            config::DEFAULT_TIME_STEP
        };
        Self {
            world,
            timestep,
            accumulator: 0.0,
            max_substeps: 8,
        }
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn timestep(&self) -> f32 {
        self.timestep
    }

    /// Caps how many fixed steps one call to [`PhysicsEngine::advance`] may run.
    pub fn set_max_substeps(&mut self, max_substeps: u32) {
        self.max_substeps = max_substeps.max(1);
    }

    /// Adds `elapsed` seconds of frame time and runs as many fixed steps as fit.
    /// Returns the number of steps taken. Time beyond the substep cap is dropped.
    pub fn advance(&mut self, elapsed: f32) -> u32 {
        if !elapsed.is_finite() || elapsed <= 0.0 {
            return 0;
        }
        self.accumulator += elapsed;
        let mut steps = 0;
        while self.accumulator >= self.timestep && steps < self.max_substeps {
            self.world.step(self.timestep);
            self.accumulator -= self.timestep;
            steps += 1;
        }
        if steps == self.max_substeps && self.accumulator >= self.timestep {
            log::debug!("Dropping {:.4}s of simulation backlog", self.accumulator);
            self.accumulator %= self.timestep;
        }
        steps
    }

    /// Fraction of a timestep left in the accumulator, for render interpolation.
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.timestep
    }
}
