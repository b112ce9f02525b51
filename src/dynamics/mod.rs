//! Simulation backends: the backend interface, the default impulse solver and mass properties.

pub mod backend;
pub mod impulse;
pub mod mass;

pub use backend::{
    BackendBodyDef, BackendBodyState, BackendJointDef, FixtureContact, FixtureDef, FixtureSlot,
    JointKind, PhysicsBackend,
};
pub use impulse::ImpulseBackend;
pub use mass::MassProperties;
