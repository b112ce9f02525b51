//! Parent-relative placement nodes with lazily cached world transforms.

use glam::Vec2;
use parking_lot::Mutex;
use std::{fmt, sync::Arc};

use crate::{
    collision::{contact::Collision, narrowphase::NarrowPhase, shapes::Shape},
    core::types::Transform,
    error::{PhysicsError, Result},
    render::Surface,
    utils::math::normalize_angle,
};

#[derive(Debug, Clone, Copy)]
struct CachedTransform {
    revision: u64,
    parent_world: Option<Transform>,
    world: Transform,
    inverse: Transform,
}

struct FigureInner {
    position: Vec2,
    rotation: f32,
    parent: Option<Figure>,
    shapes: Vec<Shape>,
    revision: u64,
    cache: Option<CachedTransform>,
}

impl FigureInner {
    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

/// Shared handle to a node of the figure hierarchy.
///
/// The world transform is recomputed on demand whenever the figure's own placement
/// changed or its parent's world transform differs from the one the cache was built on,
/// so a stale transform is never observed.
#[derive(Clone)]
pub struct Figure {
    inner: Arc<Mutex<FigureInner>>,
}

impl Default for Figure {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Figure {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Figure {}

impl fmt::Debug for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Figure")
            .field("position", &inner.position)
            .field("rotation", &inner.rotation)
            .field("has_parent", &inner.parent.is_some())
            .field("shapes", &inner.shapes.len())
            .finish()
    }
}

impl Figure {
    pub fn new() -> Self {
        Self::with_placement(Vec2::ZERO, 0.0)
    }

    pub fn with_placement(position: Vec2, rotation: f32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FigureInner {
                position,
                rotation: normalize_angle(rotation),
                parent: None,
                shapes: Vec::new(),
                revision: 0,
                cache: None,
            })),
        }
    }

    pub fn with_shape(self, shape: Shape) -> Self {
        self.add_shape(shape);
        self
    }

    pub fn position(&self) -> Vec2 {
        self.inner.lock().position
    }

    pub fn set_position(&self, position: Vec2) {
        let mut inner = self.inner.lock();
        inner.position = position;
        inner.touch();
    }

    pub fn translate(&self, delta: Vec2) {
        let mut inner = self.inner.lock();
        inner.position += delta;
        inner.touch();
    }

    /// Relative rotation in `[0, 2π)`.
    pub fn rotation(&self) -> f32 {
        self.inner.lock().rotation
    }

    pub fn set_rotation(&self, rotation: f32) {
        let mut inner = self.inner.lock();
        inner.rotation = normalize_angle(rotation);
        inner.touch();
    }

    pub fn rotate(&self, delta: f32) {
        let mut inner = self.inner.lock();
        inner.rotation = normalize_angle(inner.rotation + delta);
        inner.touch();
    }

    pub fn parent(&self) -> Option<Figure> {
        self.inner.lock().parent.clone()
    }

    /// Re-parents the figure. Parenting to itself or to a descendant is rejected.
    pub fn set_parent(&self, parent: Option<&Figure>) -> Result<()> {
        if let Some(candidate) = parent {
            let mut cursor = Some(candidate.clone());
            while let Some(node) = cursor {
                if node == *self {
                    return Err(PhysicsError::illegal_state(
                        "figure cannot be parented to itself or one of its descendants",
                    ));
                }
                cursor = node.parent();
            }
        }
        let mut inner = self.inner.lock();
        inner.parent = parent.cloned();
        inner.touch();
        Ok(())
    }

    pub fn local_transform(&self) -> Transform {
        let inner = self.inner.lock();
        Transform::new(inner.position, inner.rotation)
    }

    fn cached(&self) -> CachedTransform {
        let mut inner = self.inner.lock();
        // Lock order runs child to parent; cycles are rejected in `set_parent`.
        let parent_world = inner.parent.as_ref().map(Figure::world_transform);
        if let Some(cache) = inner.cache {
            if cache.revision == inner.revision && cache.parent_world == parent_world {
                return cache;
            }
        }
        let local = Transform::new(inner.position, inner.rotation);
        let world = match parent_world {
            Some(parent) => parent.combine(&local),
            None => local,
        };
        let cache = CachedTransform {
            revision: inner.revision,
            parent_world,
            world,
            inverse: world.inverse(),
        };
        inner.cache = Some(cache);
        cache
    }

    /// Placement of the figure in world space.
    pub fn world_transform(&self) -> Transform {
        self.cached().world
    }

    pub fn inverse_world_transform(&self) -> Transform {
        self.cached().inverse
    }

    pub fn to_world(&self, local: Vec2) -> Vec2 {
        self.world_transform().apply(local)
    }

    pub fn to_local(&self, world: Vec2) -> Vec2 {
        self.inverse_world_transform().apply(world)
    }

    pub fn shapes(&self) -> Vec<Shape> {
        self.inner.lock().shapes.clone()
    }

    pub fn add_shape(&self, shape: Shape) {
        self.inner.lock().shapes.push(shape);
    }

    pub fn set_shapes(&self, shapes: Vec<Shape>) {
        self.inner.lock().shapes = shapes;
    }

    pub fn clear_shapes(&self) {
        self.inner.lock().shapes.clear();
    }

    /// Whether any owned shape contains the world point.
    pub fn contains(&self, world: Vec2) -> bool {
        let local = self.to_local(world);
        self.inner.lock().shapes.iter().any(|s| s.contains(local))
    }

    /// Deepest collision between any pair of owned shapes.
    pub fn collide_with(&self, other: &Figure) -> Collision {
        let (xa, xb) = (self.world_transform(), other.world_transform());
        let (sa, sb) = (self.shapes(), other.shapes());
        let mut result = Collision::NULL;
        for a in &sa {
            for b in &sb {
                result = result.deepest(NarrowPhase::collide(a, &xa, b, &xb));
            }
        }
        result
    }

    pub fn draw(&self, surface: &mut dyn Surface) {
        surface.set_transform(self.world_transform());
        for shape in self.shapes() {
            shape.draw(surface);
        }
    }
}
