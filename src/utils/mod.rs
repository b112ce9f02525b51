//! Utility helpers: generational arena, logging timers and 2D math.

pub mod allocator;
pub mod logging;
pub mod math;

pub use allocator::{Arena, Handle};
pub use math::*;
