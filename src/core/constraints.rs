//! Joints linking two bodies attached to the same world.

use glam::Vec2;
use log::debug;
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use crate::{
    core::body::Body,
    dynamics::backend::JointKind,
    error::{PhysicsError, Result},
    utils::allocator::Handle,
    world::WorldInner,
};

struct JointShared {
    kind: JointKind,
    body_a: Body,
    body_b: Body,
    anchor_a: Vec2,
    anchor_b: Vec2,
    world: Weak<Mutex<WorldInner>>,
    record: Handle,
    destroyed: Arc<AtomicBool>,
}

/// Handle to a rod, rope or hinge constraint.
///
/// Once destroyed, either explicitly or because one endpoint left its world, the joint
/// stays inert.
#[derive(Clone)]
pub struct Joint {
    shared: Arc<JointShared>,
}

impl PartialEq for Joint {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Joint {}

impl fmt::Debug for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Joint")
            .field("kind", &self.shared.kind)
            .field("anchor_a", &self.shared.anchor_a)
            .field("anchor_b", &self.shared.anchor_b)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl Joint {
    /// Fixed-length link between two world-space anchors; both ends rotate freely.
    pub fn rod(a: &Body, b: &Body, anchor_a: Vec2, anchor_b: Vec2) -> Result<Joint> {
        let length = anchor_a.distance(anchor_b);
        Self::create(a, b, anchor_a, anchor_b, JointKind::Rod { length })
    }

    /// Link that only stops the anchors from moving further than `max_length` apart.
    pub fn rope(
        a: &Body,
        b: &Body,
        anchor_a: Vec2,
        anchor_b: Vec2,
        max_length: f32,
    ) -> Result<Joint> {
        if !max_length.is_finite() || max_length <= 0.0 {
            return Err(PhysicsError::invalid_argument(format!(
                "rope length must be positive, got {max_length}"
            )));
        }
        Self::create(a, b, anchor_a, anchor_b, JointKind::Rope { max_length })
    }

    /// Pins both bodies to one shared world-space point.
    pub fn hinge(a: &Body, b: &Body, anchor: Vec2) -> Result<Joint> {
        Self::create(a, b, anchor, anchor, JointKind::Hinge)
    }

    fn create(
        a: &Body,
        b: &Body,
        anchor_a: Vec2,
        anchor_b: Vec2,
        kind: JointKind,
    ) -> Result<Joint> {
        if a == b {
            return Err(PhysicsError::illegal_state(
                "a joint needs two distinct bodies",
            ));
        }
        let world_a = a
            .world()
            .ok_or_else(|| PhysicsError::illegal_state("first joint body is not attached"))?;
        let world_b = b
            .world()
            .ok_or_else(|| PhysicsError::illegal_state("second joint body is not attached"))?;
        if world_a != world_b {
            return Err(PhysicsError::illegal_state(
                "joint bodies are attached to different worlds",
            ));
        }

        let (record, destroyed) =
            world_a
                .inner()
                .lock()
                .create_joint(a, b, anchor_a, anchor_b, kind)?;
        Ok(Joint {
            shared: Arc::new(JointShared {
                kind,
                body_a: a.clone(),
                body_b: b.clone(),
                anchor_a,
                anchor_b,
                world: Arc::downgrade(world_a.inner()),
                record,
                destroyed,
            }),
        })
    }

    pub fn kind(&self) -> JointKind {
        self.shared.kind
    }

    pub fn body_a(&self) -> &Body {
        &self.shared.body_a
    }

    pub fn body_b(&self) -> &Body {
        &self.shared.body_b
    }

    /// World-space anchors at construction time.
    pub fn anchors(&self) -> (Vec2, Vec2) {
        (self.shared.anchor_a, self.shared.anchor_b)
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }

    /// Removes the constraint from its world. Further calls do nothing.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(world) = self.shared.world.upgrade() {
            world.lock().remove_joint_record(self.shared.record);
        }
        debug!("Destroyed {:?} joint", self.shared.kind);
    }
}
