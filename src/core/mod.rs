//! Core value types, the figure hierarchy, bodies, sensors and joints.

pub mod body;
pub mod constraints;
pub mod figure;
pub mod sensor;
pub mod types;

pub use body::{Body, BodyDef, BodyKey, BodyListener, BodySnapshot};
pub use constraints::Joint;
pub use figure::Figure;
pub use sensor::{FixtureRef, Sensor};
pub use types::{BodyType, Material, Transform, Velocity};
