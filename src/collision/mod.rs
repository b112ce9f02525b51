//! Collision detection: shapes, contact values, narrow-phase dispatch and polygon clipping.

pub mod clipping;
pub mod contact;
pub mod narrowphase;
pub mod shapes;

pub use clipping::{greiner_hormann_intersection, greiner_hormann_union, intersection, union};
pub use contact::Collision;
pub use narrowphase::{NarrowPhase, PairTest};
pub use shapes::{Geometry, Shape, ShapeKind};
