//! Physics bodies and their detached/attached lifecycle.
//!
//! A [`Body`] is a shared handle. Behind it exactly one [`Representation`] is active:
//! a detached snapshot owned by the body, or a live simulation body owned by a
//! [`PhysicsWorld`]. Moving between the two copies every mutable property across, so
//! the round trip is lossless.
//!
//! Locks are always taken body first, then world. Listener callbacks run with no world
//! lock held.

use glam::Vec2;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, Weak},
};

use crate::{
    collision::{contact::Collision, narrowphase::NarrowPhase, shapes::Shape},
    core::{
        sensor::Sensor,
        types::{BodyType, Material, Transform, Velocity},
    },
    error::{PhysicsError, Result},
    render::Surface,
    utils::allocator::Handle,
    world::{PhysicsWorld, WorldInner},
};

/// Hooks invoked by the world that owns the body.
///
/// Contact hooks fire once per touching fixture pair.
pub trait BodyListener: Send {
    fn on_begin_contact(&mut self, _body: &Body, _other: &Body) {}

    fn on_end_contact(&mut self, _body: &Body, _other: &Body) {}

    /// Called once per world step, after every contact notification of that step.
    fn on_step(&mut self, _body: &Body, _dt: f32) {}
}

/// Motion state that lives in the simulation while a body is attached.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
}

/// Loader-facing description of a body, in world units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDef {
    pub name: Option<String>,
    pub image: Option<String>,
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub fixed_rotation: bool,
    pub material: Material,
    pub shapes: Vec<Shape>,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            name: None,
            image: None,
            body_type: BodyType::Dynamic,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            fixed_rotation: false,
            material: Material::default(),
            shapes: Vec::new(),
        }
    }
}

impl BodyDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        self
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_linear_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, velocity: f32) -> Self {
        self.angular_velocity = velocity;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.material.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.material.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.material.restitution = restitution;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shapes.push(shape);
        self
    }

    pub fn with_shapes(mut self, shapes: impl IntoIterator<Item = Shape>) -> Self {
        self.shapes.extend(shapes);
        self
    }

    fn snapshot(&self) -> BodySnapshot {
        BodySnapshot {
            position: self.position,
            angle: self.angle,
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
        }
    }
}

pub(crate) struct AttachedBody {
    pub(crate) handle: Handle,
    pub(crate) world: Weak<Mutex<WorldInner>>,
    /// State at attach time, used if the world disappears without detaching.
    pub(crate) fallback: BodySnapshot,
}

pub(crate) enum Representation {
    Detached(BodySnapshot),
    Attached(AttachedBody),
}

pub(crate) struct BodyInner {
    pub(crate) name: Option<String>,
    pub(crate) image: Option<String>,
    pub(crate) body_type: BodyType,
    pub(crate) material: Material,
    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) fixed_rotation: bool,
    pub(crate) shapes: Vec<Shape>,
    pub(crate) sensors: Vec<Sensor>,
    pub(crate) representation: Representation,
    listener: Option<Box<dyn BodyListener>>,
}

impl BodyInner {
    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    fn detached_mut(&mut self) -> Option<&mut BodySnapshot> {
        match &mut self.representation {
            Representation::Detached(snapshot) => Some(snapshot),
            Representation::Attached(_) => None,
        }
    }
}

/// Identity of a body, stable for as long as any handle to it exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyKey(usize);

/// Shared handle to a physics body.
#[derive(Clone)]
pub struct Body {
    pub(crate) inner: Arc<Mutex<BodyInner>>,
}

impl PartialEq for Body {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Body {}

impl Hash for Body {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Some(inner) => f
                .debug_struct("Body")
                .field("name", &inner.name)
                .field("body_type", &inner.body_type)
                .field("shapes", &inner.shapes.len())
                .field(
                    "attached",
                    &matches!(inner.representation, Representation::Attached(_)),
                )
                .finish(),
            None => f.debug_struct("Body").field("key", &self.key()).finish_non_exhaustive(),
        }
    }
}

impl Body {
    /// Creates a detached body.
    pub fn new(def: BodyDef) -> Self {
        let snapshot = def.snapshot();
        Self {
            inner: Arc::new(Mutex::new(BodyInner {
                name: def.name,
                image: def.image,
                body_type: def.body_type,
                material: def.material,
                linear_damping: def.linear_damping,
                angular_damping: def.angular_damping,
                fixed_rotation: def.fixed_rotation,
                shapes: def.shapes,
                sensors: Vec::new(),
                representation: Representation::Detached(snapshot),
                listener: None,
            })),
        }
    }

    pub fn key(&self) -> BodyKey {
        BodyKey(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    pub(crate) fn downgrade(&self) -> Weak<Mutex<BodyInner>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<Mutex<BodyInner>>) -> Self {
        Self { inner }
    }

    /// Live world of an attached body. A body whose world vanished reverts to its
    /// attach-time snapshot.
    pub(crate) fn live(inner: &mut BodyInner) -> Option<(Handle, Arc<Mutex<WorldInner>>)> {
        let (handle, weak, fallback) = match &inner.representation {
            Representation::Attached(attached) => {
                (attached.handle, attached.world.clone(), attached.fallback)
            }
            Representation::Detached(_) => return None,
        };
        match weak.upgrade() {
            Some(world) => Some((handle, world)),
            None => {
                warn!(
                    "Body '{}' lost its physics world; reverting to its attach-time state",
                    inner.display_name()
                );
                inner.representation = Representation::Detached(fallback);
                None
            }
        }
    }

    fn snapshot_of(inner: &mut BodyInner) -> BodySnapshot {
        if let Some((handle, world)) = Self::live(inner) {
            if let Some(snapshot) = world.lock().read_snapshot(handle) {
                return snapshot;
            }
        }
        match &inner.representation {
            Representation::Detached(snapshot) => *snapshot,
            Representation::Attached(attached) => attached.fallback,
        }
    }

    /// Detaches, applies `mutate` to the detached state, and re-attaches to the same world.
    fn rehome(&self, mutate: impl FnOnce(&mut BodyInner)) {
        self.rehome_in(|_, inner| mutate(inner));
    }

    /// Like [`Body::rehome`], also handing `mutate` the world while it is detached from it.
    fn rehome_in(&self, mutate: impl FnOnce(Option<&mut WorldInner>, &mut BodyInner)) {
        let mut inner = self.inner.lock();
        match Self::live(&mut inner) {
            Some((_, world)) => {
                let mut guard = world.lock();
                guard.detach(self, &mut inner, false);
                mutate(Some(&mut *guard), &mut inner);
                guard.attach(self, &mut inner, Arc::downgrade(&world));
                debug!("Re-homed body '{}'", inner.display_name());
            }
            None => mutate(None, &mut inner),
        }
    }

    pub fn is_attached(&self) -> bool {
        Self::live(&mut self.inner.lock()).is_some()
    }

    /// World the body is attached to, if any.
    pub fn world(&self) -> Option<PhysicsWorld> {
        Self::live(&mut self.inner.lock()).map(|(_, world)| PhysicsWorld::from_inner(world))
    }

    pub fn is_attached_to(&self, world: &PhysicsWorld) -> bool {
        Self::live(&mut self.inner.lock())
            .is_some_and(|(_, current)| Arc::ptr_eq(&current, world.inner()))
    }

    pub fn name(&self) -> Option<String> {
        self.inner.lock().name.clone()
    }

    pub fn set_name(&self, name: Option<String>) {
        self.inner.lock().name = name;
    }

    pub fn image(&self) -> Option<String> {
        self.inner.lock().image.clone()
    }

    pub fn set_image(&self, image: Option<String>) {
        self.inner.lock().image = image;
    }

    pub fn body_type(&self) -> BodyType {
        self.inner.lock().body_type
    }

    /// Changing the type of an attached body re-creates its simulation body.
    pub fn set_body_type(&self, body_type: BodyType) {
        if self.body_type() == body_type {
            return;
        }
        self.rehome(|inner| inner.body_type = body_type);
    }

    /// Current motion state, read from the simulation when attached.
    pub fn snapshot(&self) -> BodySnapshot {
        Self::snapshot_of(&mut self.inner.lock())
    }

    pub fn position(&self) -> Vec2 {
        self.snapshot().position
    }

    /// Teleports the body; attached bodies are re-homed in their world.
    pub fn set_position(&self, position: Vec2) {
        self.rehome(|inner| {
            if let Some(snapshot) = inner.detached_mut() {
                snapshot.position = position;
            }
        });
    }

    pub fn angle(&self) -> f32 {
        self.snapshot().angle
    }

    pub fn set_angle(&self, angle: f32) {
        self.rehome(|inner| {
            if let Some(snapshot) = inner.detached_mut() {
                snapshot.angle = angle;
            }
        });
    }

    pub fn set_transform(&self, position: Vec2, angle: f32) {
        self.rehome(|inner| {
            if let Some(snapshot) = inner.detached_mut() {
                snapshot.position = position;
                snapshot.angle = angle;
            }
        });
    }

    pub fn transform(&self) -> Transform {
        let snapshot = self.snapshot();
        Transform::new(snapshot.position, snapshot.angle)
    }

    pub fn velocity(&self) -> Velocity {
        let snapshot = self.snapshot();
        Velocity {
            linear: snapshot.linear_velocity,
            angular: snapshot.angular_velocity,
        }
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.snapshot().linear_velocity
    }

    pub fn set_linear_velocity(&self, velocity: Vec2) {
        let mut inner = self.inner.lock();
        if let Some((handle, world)) = Self::live(&mut inner) {
            let mut world = world.lock();
            let scaled = velocity / world.scale();
            world.backend_mut().set_linear_velocity(handle, scaled);
        } else if let Some(snapshot) = inner.detached_mut() {
            snapshot.linear_velocity = velocity;
        }
    }

    pub fn angular_velocity(&self) -> f32 {
        self.snapshot().angular_velocity
    }

    pub fn set_angular_velocity(&self, velocity: f32) {
        let mut inner = self.inner.lock();
        if let Some((handle, world)) = Self::live(&mut inner) {
            world.lock().backend_mut().set_angular_velocity(handle, velocity);
        } else if let Some(snapshot) = inner.detached_mut() {
            snapshot.angular_velocity = velocity;
        }
    }

    pub fn linear_damping(&self) -> f32 {
        self.inner.lock().linear_damping
    }

    pub fn angular_damping(&self) -> f32 {
        self.inner.lock().angular_damping
    }

    pub fn set_damping(&self, linear: f32, angular: f32) {
        let mut inner = self.inner.lock();
        inner.linear_damping = linear;
        inner.angular_damping = angular;
        if let Some((handle, world)) = Self::live(&mut inner) {
            world.lock().backend_mut().set_damping(handle, linear, angular);
        }
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.inner.lock().fixed_rotation
    }

    pub fn set_fixed_rotation(&self, fixed: bool) {
        let mut inner = self.inner.lock();
        inner.fixed_rotation = fixed;
        if let Some((handle, world)) = Self::live(&mut inner) {
            world.lock().backend_mut().set_fixed_rotation(handle, fixed);
        }
    }

    pub fn material(&self) -> Material {
        self.inner.lock().material
    }

    pub fn density(&self) -> f32 {
        self.material().density
    }

    pub fn friction(&self) -> f32 {
        self.material().friction
    }

    pub fn restitution(&self) -> f32 {
        self.material().restitution
    }

    fn set_material_field(
        &self,
        what: &str,
        value: f32,
        apply: impl FnOnce(&mut Material),
    ) -> Result<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(PhysicsError::invalid_argument(format!(
                "{what} must be finite and non-negative, got {value}"
            )));
        }
        let mut inner = self.inner.lock();
        if Self::live(&mut inner).is_some() {
            return Err(PhysicsError::illegal_state(format!(
                "cannot change {what} of body '{}' while it is attached",
                inner.display_name()
            )));
        }
        apply(&mut inner.material);
        Ok(())
    }

    pub fn set_density(&self, density: f32) -> Result<()> {
        self.set_material_field("density", density, |m| m.density = density)
    }

    pub fn set_friction(&self, friction: f32) -> Result<()> {
        self.set_material_field("friction", friction, |m| m.friction = friction)
    }

    pub fn set_restitution(&self, restitution: f32) -> Result<()> {
        self.set_material_field("restitution", restitution, |m| m.restitution = restitution)
    }

    pub fn shapes(&self) -> Vec<Shape> {
        self.inner.lock().shapes.clone()
    }

    /// Replaces the fixture list; attached bodies are re-homed.
    /// Replaces the fixture list.
    ///
    /// Contacts are tracked by fixture index, so every contact on an index whose shape
    /// changed ends; it begins again on the next step if the new shape still touches.
    pub fn set_shapes(&self, shapes: Vec<Shape>) {
        let key = self.key();
        self.rehome_in(|world, inner| {
            if let Some(world) = world {
                let previous = &inner.shapes;
                world.retire_shape_fixtures(key, |index| previous.get(index) == shapes.get(index));
            }
            inner.shapes = shapes;
        });
    }

    pub fn add_shape(&self, shape: Shape) {
        self.rehome(|inner| inner.shapes.push(shape));
    }

    pub fn sensors(&self) -> Vec<Sensor> {
        self.inner.lock().sensors.clone()
    }

    pub(crate) fn sensor_by_key(&self, key: usize) -> Option<Sensor> {
        self.inner
            .lock()
            .sensors
            .iter()
            .find(|s| s.key() == key)
            .cloned()
    }

    pub(crate) fn push_sensor(&self, sensor: Sensor) {
        self.rehome(|inner| inner.sensors.push(sensor));
    }

    /// Detaches a sensor from this body. Returns `false` if it was not hosted here.
    pub fn remove_sensor(&self, sensor: &Sensor) -> bool {
        if !self.inner.lock().sensors.contains(sensor) {
            return false;
        }
        self.rehome(|inner| inner.sensors.retain(|s| s != sensor));
        sensor.clear();
        true
    }

    fn with_attached<T>(
        &self,
        action: &str,
        apply: impl FnOnce(&mut WorldInner, Handle) -> T,
    ) -> Result<T> {
        let mut inner = self.inner.lock();
        match Self::live(&mut inner) {
            Some((handle, world)) => {
                let mut world = world.lock();
                Ok(apply(&mut world, handle))
            }
            None => Err(PhysicsError::illegal_state(format!(
                "cannot {action} on detached body '{}'",
                inner.display_name()
            ))),
        }
    }

    /// Applies a force at a world point until the next step.
    pub fn apply_force(&self, force: Vec2, point: Vec2) -> Result<()> {
        self.with_attached("apply a force", |world, handle| {
            let scale = world.scale();
            world
                .backend_mut()
                .apply_force(handle, force / scale, point / scale);
        })
    }

    pub fn apply_torque(&self, torque: f32) -> Result<()> {
        self.with_attached("apply a torque", |world, handle| {
            let scale = world.scale();
            world
                .backend_mut()
                .apply_torque(handle, torque / (scale * scale));
        })
    }

    pub fn apply_linear_impulse(&self, impulse: Vec2, point: Vec2) -> Result<()> {
        self.with_attached("apply an impulse", |world, handle| {
            let scale = world.scale();
            world
                .backend_mut()
                .apply_linear_impulse(handle, impulse / scale, point / scale);
        })
    }

    pub fn apply_angular_impulse(&self, impulse: f32) -> Result<()> {
        self.with_attached("apply an impulse", |world, handle| {
            let scale = world.scale();
            world
                .backend_mut()
                .apply_angular_impulse(handle, impulse / (scale * scale));
        })
    }

    /// Full description of the body's current state.
    pub fn to_def(&self) -> BodyDef {
        let mut inner = self.inner.lock();
        let snapshot = Self::snapshot_of(&mut inner);
        BodyDef {
            name: inner.name.clone(),
            image: inner.image.clone(),
            body_type: inner.body_type,
            position: snapshot.position,
            angle: snapshot.angle,
            linear_velocity: snapshot.linear_velocity,
            angular_velocity: snapshot.angular_velocity,
            linear_damping: inner.linear_damping,
            angular_damping: inner.angular_damping,
            fixed_rotation: inner.fixed_rotation,
            material: inner.material,
            shapes: inner.shapes.clone(),
        }
    }

    /// Whether any fixture contains the world point.
    pub fn contains(&self, point: Vec2) -> bool {
        let transform = self.transform();
        let local = transform.inverse_apply(point);
        self.inner.lock().shapes.iter().any(|s| s.contains(local))
    }

    /// Deepest collision between the fixtures of the two bodies at their current placement.
    pub fn collide_with(&self, other: &Body) -> Collision {
        let (xa, sa) = (self.transform(), self.shapes());
        let (xb, sb) = (other.transform(), other.shapes());
        let mut result = Collision::NULL;
        for a in &sa {
            for b in &sb {
                result = result.deepest(NarrowPhase::collide(a, &xa, b, &xb));
            }
        }
        result
    }

    pub fn draw(&self, surface: &mut dyn Surface) {
        let transform = self.transform();
        let (shapes, sensors) = {
            let inner = self.inner.lock();
            (inner.shapes.clone(), inner.sensors.clone())
        };
        surface.set_transform(transform);
        for shape in &shapes {
            shape.draw(surface);
        }
        for sensor in &sensors {
            sensor.shape().draw(surface);
        }
    }

    pub fn set_listener(&self, listener: impl BodyListener + 'static) {
        self.inner.lock().listener = Some(Box::new(listener));
    }

    pub fn clear_listener(&self) {
        self.inner.lock().listener = None;
    }

    pub fn has_listener(&self) -> bool {
        self.inner.lock().listener.is_some()
    }

    /// Runs `f` on the listener with the body unlocked, so callbacks may use the body.
    fn with_listener(&self, f: impl FnOnce(&mut dyn BodyListener)) {
        let taken = self.inner.lock().listener.take();
        if let Some(mut listener) = taken {
            f(listener.as_mut());
            let mut inner = self.inner.lock();
            if inner.listener.is_none() {
                inner.listener = Some(listener);
            }
        }
    }

    pub(crate) fn notify_contact(&self, begin: bool, other: &Body) {
        self.with_listener(|listener| {
            if begin {
                listener.on_begin_contact(self, other);
            } else {
                listener.on_end_contact(self, other);
            }
        });
    }

    pub(crate) fn notify_step(&self, dt: f32) {
        self.with_listener(|listener| listener.on_step(self, dt));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_body_keeps_its_state() {
        let body = Body::new(
            BodyDef::new()
                .with_name("crate")
                .with_position(Vec2::new(1.0, 2.0))
                .with_angle(0.5)
                .with_linear_velocity(Vec2::new(3.0, 0.0))
                .with_shape(Shape::circle(1.0).unwrap()),
        );
        assert!(!body.is_attached());
        body.set_position(Vec2::new(4.0, 5.0));
        body.set_angular_velocity(2.0);
        let def = body.to_def();
        assert_eq!(def.position, Vec2::new(4.0, 5.0));
        assert_eq!(def.angle, 0.5);
        assert_eq!(def.linear_velocity, Vec2::new(3.0, 0.0));
        assert_eq!(def.angular_velocity, 2.0);
        assert_eq!(def.name.as_deref(), Some("crate"));
    }

    #[test]
    fn forces_need_an_attached_body() {
        let body = Body::new(BodyDef::new());
        let err = body.apply_force(Vec2::X, Vec2::ZERO).unwrap_err();
        assert!(err.is_illegal_state());
        assert!(body.apply_torque(1.0).is_err());
        assert!(body.apply_linear_impulse(Vec2::X, Vec2::ZERO).is_err());
    }

    #[test]
    fn material_is_editable_while_detached() {
        let body = Body::new(BodyDef::new());
        body.set_density(3.0).unwrap();
        body.set_friction(0.7).unwrap();
        assert_eq!(body.density(), 3.0);
        assert_eq!(body.friction(), 0.7);
        assert!(matches!(
            body.set_restitution(-1.0),
            Err(PhysicsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn handles_compare_by_identity() {
        let a = Body::new(BodyDef::new());
        let b = Body::new(BodyDef::new());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.key(), b.key());
    }
}
