//! Physics world container.
//!
//! The world owns the simulation backend and the ordered set of attached bodies. Each
//! [`PhysicsWorld::step`] advances the backend, turns the backend's touching fixture
//! pairs into begin/end events, updates sensors, notifies listeners and finally runs
//! every member's step hook in insertion order.

use glam::Vec2;
use log::{debug, warn};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Instant,
};

use crate::{
    config::{WorldConfig, DEFAULT_SCALE},
    core::{
        body::{AttachedBody, Body, BodyInner, BodyKey, BodySnapshot, Representation},
        sensor::FixtureRef,
        types::Transform,
    },
    dynamics::{
        backend::{
            BackendBodyDef, BackendJointDef, FixtureDef, FixtureSlot, JointKind, PhysicsBackend,
        },
        impulse::ImpulseBackend,
    },
    error::{PhysicsError, Result},
    render::Surface,
    utils::{
        allocator::{Arena, Handle},
        logging::{warn_if_frame_budget_exceeded, ScopedTimer},
    },
};

struct Member {
    body: Body,
    handle: Handle,
}

/// Bookkeeping for a joint; anchors and lengths in backend units.
struct JointRecord {
    body_a: Body,
    body_b: Body,
    kind: JointKind,
    local_a: Vec2,
    local_b: Vec2,
    backend: Option<Handle>,
    destroyed: Arc<AtomicBool>,
}

impl JointRecord {
    fn involves(&self, key: BodyKey) -> bool {
        self.body_a.key() == key || self.body_b.key() == key
    }
}

type FixtureId = (BodyKey, FixtureSlot);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TouchKey {
    a: FixtureId,
    b: FixtureId,
}

#[derive(Clone)]
struct TouchSide {
    body: Body,
    slot: FixtureSlot,
}

#[derive(Clone)]
struct Touch {
    a: TouchSide,
    b: TouchSide,
}

#[derive(Clone)]
struct ContactEvent {
    begin: bool,
    touch: Touch,
    /// Set when one side left the world; only the other side is notified.
    departed: Option<BodyKey>,
}

impl ContactEvent {
    fn notifies(&self, side: &TouchSide) -> bool {
        self.departed != Some(side.body.key())
    }
}

fn scale_kind(kind: JointKind, factor: f32) -> JointKind {
    match kind {
        JointKind::Rod { length } => JointKind::Rod {
            length: length * factor,
        },
        JointKind::Rope { max_length } => JointKind::Rope {
            max_length: max_length * factor,
        },
        JointKind::Hinge => JointKind::Hinge,
    }
}

pub(crate) struct WorldInner {
    config: WorldConfig,
    backend: Box<dyn PhysicsBackend>,
    members: Vec<Member>,
    joints: Arena<JointRecord>,
    touching: BTreeMap<TouchKey, Touch>,
    pending: Vec<ContactEvent>,
}

impl WorldInner {
    pub(crate) fn scale(&self) -> f32 {
        self.config.scale
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn PhysicsBackend {
        self.backend.as_mut()
    }

    fn member_handle(&self, key: BodyKey) -> Option<Handle> {
        self.members
            .iter()
            .find(|m| m.body.key() == key)
            .map(|m| m.handle)
    }

    fn backend_transform(&self, handle: Handle) -> Option<Transform> {
        self.backend
            .body_state(handle)
            .map(|s| Transform::new(s.position, s.angle))
    }

    pub(crate) fn read_snapshot(&self, handle: Handle) -> Option<BodySnapshot> {
        let scale = self.config.scale;
        self.backend.body_state(handle).map(|s| BodySnapshot {
            position: s.position * scale,
            angle: s.angle,
            linear_velocity: s.linear_velocity * scale,
            angular_velocity: s.angular_velocity,
        })
    }

    /// Moves a detached body into the simulation.
    pub(crate) fn attach(
        &mut self,
        body: &Body,
        inner: &mut BodyInner,
        world: Weak<Mutex<WorldInner>>,
    ) {
        let snapshot = match &inner.representation {
            Representation::Detached(snapshot) => *snapshot,
            Representation::Attached(attached) => attached.fallback,
        };
        let to_backend = 1.0 / self.config.scale;
        let mut fixtures = Vec::with_capacity(inner.shapes.len() + inner.sensors.len());
        for (index, shape) in inner.shapes.iter().enumerate() {
            match shape.scaled(to_backend) {
                Ok(shape) => fixtures.push(FixtureDef::new(shape, FixtureSlot::Shape(index))),
                Err(err) => warn!("Skipping fixture {index}: {err}"),
            }
        }
        for sensor in &inner.sensors {
            match sensor.shape().scaled(to_backend) {
                Ok(shape) => {
                    fixtures.push(FixtureDef::new(shape, FixtureSlot::Sensor(sensor.key())))
                }
                Err(err) => warn!("Skipping sensor fixture: {err}"),
            }
        }

        let def = BackendBodyDef {
            body_type: inner.body_type,
            position: snapshot.position * to_backend,
            angle: snapshot.angle,
            linear_velocity: snapshot.linear_velocity * to_backend,
            angular_velocity: snapshot.angular_velocity,
            linear_damping: inner.linear_damping,
            angular_damping: inner.angular_damping,
            fixed_rotation: inner.fixed_rotation,
            material: inner.material,
            fixtures,
        };
        let handle = self.backend.create_body(&def);
        let key = body.key();
        match self.members.iter_mut().find(|m| m.body.key() == key) {
            Some(member) => member.handle = handle,
            None => self.members.push(Member {
                body: body.clone(),
                handle,
            }),
        }
        inner.representation = Representation::Attached(AttachedBody {
            handle,
            world,
            fallback: snapshot,
        });
        self.rebind_joints(key);
        debug!(
            "Attached body {:?} as {:?} with {} fixtures",
            inner.name,
            inner.body_type,
            def.fixtures.len()
        );
    }

    /// Reads the simulation state back into a detached snapshot.
    ///
    /// With `leaving` set the body also stops being a member: its joints are destroyed and
    /// its partners get end-contact events at the next step. Otherwise the body is about to
    /// be re-attached and keeps its membership, joints and contacts.
    pub(crate) fn detach(&mut self, body: &Body, inner: &mut BodyInner, leaving: bool) {
        let (handle, fallback) = match &inner.representation {
            Representation::Attached(attached) => (attached.handle, attached.fallback),
            Representation::Detached(_) => return,
        };
        let key = body.key();

        let related: Vec<Handle> = self
            .joints
            .iter()
            .filter(|(_, r)| r.involves(key))
            .map(|(h, _)| h)
            .collect();
        for record_handle in related {
            if leaving {
                if let Some(record) = self.joints.remove(record_handle) {
                    record.destroyed.store(true, Ordering::Release);
                    if let Some(joint) = record.backend {
                        self.backend.destroy_joint(joint);
                    }
                    debug!("Destroyed {:?} joint with departing body", record.kind);
                }
            } else if let Some(record) = self.joints.get_mut(record_handle) {
                if let Some(joint) = record.backend.take() {
                    self.backend.destroy_joint(joint);
                }
            }
        }

        let snapshot = self.read_snapshot(handle).unwrap_or(fallback);
        self.backend.destroy_body(handle);
        inner.representation = Representation::Detached(snapshot);

        if leaving {
            self.members.retain(|m| m.body.key() != key);
            let ended: Vec<TouchKey> = self
                .touching
                .keys()
                .filter(|k| k.a.0 == key || k.b.0 == key)
                .copied()
                .collect();
            for touch_key in ended {
                if let Some(touch) = self.touching.remove(&touch_key) {
                    self.pending.push(ContactEvent {
                        begin: false,
                        touch,
                        departed: Some(key),
                    });
                }
            }
            for sensor in &inner.sensors {
                sensor.clear();
            }
            debug!("Detached body {:?}", inner.name);
        }
    }

    fn rebind_joints(&mut self, key: BodyKey) {
        let pending: Vec<Handle> = self
            .joints
            .iter()
            .filter(|(_, r)| r.backend.is_none() && r.involves(key))
            .map(|(h, _)| h)
            .collect();
        for record_handle in pending {
            let Some(record) = self.joints.get(record_handle) else {
                continue;
            };
            let (Some(ha), Some(hb)) = (
                self.member_handle(record.body_a.key()),
                self.member_handle(record.body_b.key()),
            ) else {
                continue;
            };
            let (Some(xa), Some(xb)) = (self.backend_transform(ha), self.backend_transform(hb))
            else {
                continue;
            };
            let def = BackendJointDef {
                body_a: ha,
                body_b: hb,
                anchor_a: xa.apply(record.local_a),
                anchor_b: xb.apply(record.local_b),
                kind: record.kind,
            };
            let joint = self.backend.create_joint(&def);
            if joint.is_none() {
                warn!("Backend refused to rebuild a {:?} joint", record.kind);
            }
            if let Some(record) = self.joints.get_mut(record_handle) {
                record.backend = joint;
            }
        }
    }

    pub(crate) fn create_joint(
        &mut self,
        a: &Body,
        b: &Body,
        anchor_a: Vec2,
        anchor_b: Vec2,
        kind: JointKind,
    ) -> Result<(Handle, Arc<AtomicBool>)> {
        let not_member = || PhysicsError::illegal_state("joint body is not a member of this world");
        let ha = self.member_handle(a.key()).ok_or_else(not_member)?;
        let hb = self.member_handle(b.key()).ok_or_else(not_member)?;
        let xa = self.backend_transform(ha).ok_or_else(not_member)?;
        let xb = self.backend_transform(hb).ok_or_else(not_member)?;

        let to_backend = 1.0 / self.config.scale;
        let def = BackendJointDef {
            body_a: ha,
            body_b: hb,
            anchor_a: anchor_a * to_backend,
            anchor_b: anchor_b * to_backend,
            kind: scale_kind(kind, to_backend),
        };
        let joint = self
            .backend
            .create_joint(&def)
            .ok_or_else(|| PhysicsError::illegal_state("backend rejected the joint"))?;

        let destroyed = Arc::new(AtomicBool::new(false));
        let record = self.joints.insert(JointRecord {
            body_a: a.clone(),
            body_b: b.clone(),
            kind: def.kind,
            local_a: xa.inverse_apply(def.anchor_a),
            local_b: xb.inverse_apply(def.anchor_b),
            backend: Some(joint),
            destroyed: Arc::clone(&destroyed),
        });
        // Jointed bodies no longer collide; close out their open contacts.
        let (ka, kb) = (a.key(), b.key());
        let ended: Vec<TouchKey> = self
            .touching
            .keys()
            .filter(|k| (k.a.0 == ka && k.b.0 == kb) || (k.a.0 == kb && k.b.0 == ka))
            .copied()
            .collect();
        for touch_key in ended {
            if let Some(touch) = self.touching.remove(&touch_key) {
                self.pending.push(ContactEvent {
                    begin: false,
                    touch,
                    departed: None,
                });
            }
        }
        debug!("Created {kind:?} joint");
        Ok((record, destroyed))
    }

    /// Ends the contacts of `key`'s shape fixtures whose index `keep` rejects.
    pub(crate) fn retire_shape_fixtures(&mut self, key: BodyKey, keep: impl Fn(usize) -> bool) {
        let stale = |(body, slot): &FixtureId| {
            *body == key && matches!(slot, FixtureSlot::Shape(index) if !keep(*index))
        };
        let retired: Vec<TouchKey> = self
            .touching
            .keys()
            .filter(|k| stale(&k.a) || stale(&k.b))
            .copied()
            .collect();
        for touch_key in retired {
            if let Some(touch) = self.touching.remove(&touch_key) {
                self.pending.push(ContactEvent {
                    begin: false,
                    touch,
                    departed: None,
                });
            }
        }
    }

    pub(crate) fn remove_joint_record(&mut self, record: Handle) {
        if let Some(record) = self.joints.remove(record) {
            record.destroyed.store(true, Ordering::Release);
            if let Some(joint) = record.backend {
                self.backend.destroy_joint(joint);
            }
        }
    }

    /// Steps the backend and diffs its touching pairs against the previous step.
    fn advance(&mut self, dt: f32) -> (Vec<ContactEvent>, Vec<Body>) {
        {
            let _timer = ScopedTimer::new("world::backend_step");
            self.backend.step(dt);
        }

        let _timer = ScopedTimer::new("world::contact_diff");
        let by_handle: HashMap<Handle, &Body> =
            self.members.iter().map(|m| (m.handle, &m.body)).collect();
        let mut current = BTreeMap::new();
        for contact in self.backend.touching() {
            let (Some(body_a), Some(body_b)) =
                (by_handle.get(&contact.body_a), by_handle.get(&contact.body_b))
            else {
                continue;
            };
            let mut a = TouchSide {
                body: (*body_a).clone(),
                slot: contact.slot_a,
            };
            let mut b = TouchSide {
                body: (*body_b).clone(),
                slot: contact.slot_b,
            };
            if (b.body.key(), b.slot) < (a.body.key(), a.slot) {
                std::mem::swap(&mut a, &mut b);
            }
            let key = TouchKey {
                a: (a.body.key(), a.slot),
                b: (b.body.key(), b.slot),
            };
            current.insert(key, Touch { a, b });
        }

        let mut events = std::mem::take(&mut self.pending);
        for (key, touch) in &self.touching {
            if !current.contains_key(key) {
                events.push(ContactEvent {
                    begin: false,
                    touch: touch.clone(),
                    departed: None,
                });
            }
        }
        for (key, touch) in &current {
            if !self.touching.contains_key(key) {
                events.push(ContactEvent {
                    begin: true,
                    touch: touch.clone(),
                    departed: None,
                });
            }
        }
        self.touching = current;

        let members = self.members.iter().map(|m| m.body.clone()).collect();
        (events, members)
    }
}

impl Drop for WorldInner {
    fn drop(&mut self) {
        for (_, record) in self.joints.iter() {
            record.destroyed.store(true, Ordering::Release);
        }
        let scale = self.config.scale;
        for member in &self.members {
            let Some(mut inner) = member.body.inner.try_lock() else {
                warn!("Body busy during world drop; it reverts to its attach-time state");
                continue;
            };
            if let Some(state) = self.backend.body_state(member.handle) {
                inner.representation = Representation::Detached(BodySnapshot {
                    position: state.position * scale,
                    angle: state.angle,
                    linear_velocity: state.linear_velocity * scale,
                    angular_velocity: state.angular_velocity,
                });
            }
            for sensor in &inner.sensors {
                sensor.clear();
            }
        }
    }
}

/// Shared handle to a physics world.
#[derive(Clone)]
pub struct PhysicsWorld {
    inner: Arc<Mutex<WorldInner>>,
}

impl PartialEq for PhysicsWorld {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PhysicsWorld {}

impl fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PhysicsWorld")
            .field("config", &inner.config)
            .field("backend", &inner.backend.name())
            .field("bodies", &inner.members.len())
            .field("joints", &inner.joints.len())
            .finish()
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl PhysicsWorld {
    /// Creates a world driven by the default [`ImpulseBackend`].
    pub fn new(config: WorldConfig) -> Self {
        let backend = ImpulseBackend::new(config.solver_iterations);
        Self::with_backend(config, backend)
    }

    pub fn with_backend<B>(mut config: WorldConfig, backend: B) -> Self
    where
        B: PhysicsBackend + 'static,
    {
        if !(config.scale.is_finite() && config.scale > 0.0) {
            warn!("Invalid world scale {}; using {DEFAULT_SCALE}", config.scale);
            config.scale = DEFAULT_SCALE;
        }
        let mut backend: Box<dyn PhysicsBackend> = Box::new(backend);
        backend.set_gravity(config.gravity / config.scale);
        Self {
            inner: Arc::new(Mutex::new(WorldInner {
                config,
                backend,
                members: Vec::new(),
                joints: Arena::new(),
                touching: BTreeMap::new(),
                pending: Vec::new(),
            })),
        }
    }

    pub(crate) fn from_inner(inner: Arc<Mutex<WorldInner>>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<Mutex<WorldInner>> {
        &self.inner
    }

    pub fn config(&self) -> WorldConfig {
        self.inner.lock().config
    }

    pub fn backend_name(&self) -> String {
        self.inner.lock().backend.name().to_string()
    }

    pub fn gravity(&self) -> Vec2 {
        self.inner.lock().config.gravity
    }

    pub fn set_gravity(&self, gravity: Vec2) {
        let mut inner = self.inner.lock();
        inner.config.gravity = gravity;
        let scaled = gravity / inner.config.scale;
        inner.backend.set_gravity(scaled);
    }

    /// World units per backend unit.
    pub fn scale(&self) -> f32 {
        self.inner.lock().config.scale
    }

    /// The scale can only change while the world is empty.
    pub fn set_scale(&self, scale: f32) -> Result<()> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(PhysicsError::invalid_argument(format!(
                "world scale must be positive, got {scale}"
            )));
        }
        let mut inner = self.inner.lock();
        if !inner.members.is_empty() {
            return Err(PhysicsError::illegal_state(
                "cannot change the scale of a world with attached bodies",
            ));
        }
        inner.config.scale = scale;
        let scaled = inner.config.gravity / scale;
        inner.backend.set_gravity(scaled);
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().config.paused
    }

    pub fn set_paused(&self, paused: bool) {
        self.inner.lock().config.paused = paused;
    }

    pub fn debug_draw(&self) -> bool {
        self.inner.lock().config.debug_draw
    }

    pub fn set_debug_draw(&self, enabled: bool) {
        self.inner.lock().config.debug_draw = enabled;
    }

    /// Attaches `body`, detaching it from any other world first. No-op for members.
    pub fn add(&self, body: &Body) {
        let mut inner = body.inner.lock();
        if let Some((_, current)) = Body::live(&mut inner) {
            if Arc::ptr_eq(&current, &self.inner) {
                return;
            }
            current.lock().detach(body, &mut inner, true);
        }
        self.inner
            .lock()
            .attach(body, &mut inner, Arc::downgrade(&self.inner));
    }

    /// Detaches `body` if it is a member. Returns whether anything changed.
    pub fn remove(&self, body: &Body) -> bool {
        let mut inner = body.inner.lock();
        match Body::live(&mut inner) {
            Some((_, current)) if Arc::ptr_eq(&current, &self.inner) => {
                self.inner.lock().detach(body, &mut inner, true);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, body: &Body) -> bool {
        let key = body.key();
        self.inner.lock().members.iter().any(|m| m.body.key() == key)
    }

    /// Members in insertion order. The returned list is a copy.
    pub fn bodies(&self) -> Vec<Body> {
        self.inner
            .lock()
            .members
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    pub fn body_count(&self) -> usize {
        self.inner.lock().members.len()
    }

    pub fn joint_count(&self) -> usize {
        self.inner.lock().joints.len()
    }

    /// Advances the simulation by `dt` seconds. Does nothing while paused.
    pub fn step(&self, dt: f32) {
        let started = Instant::now();
        let (events, members, budget) = {
            let mut inner = self.inner.lock();
            if inner.config.paused {
                return;
            }
            let (events, members) = inner.advance(dt);
            (events, members, inner.config.frame_budget_ms)
        };

        {
            let _timer = ScopedTimer::new("world::sensors");
            for event in &events {
                self.dispatch_sensor(event);
            }
        }
        {
            let _timer = ScopedTimer::new("world::contacts");
            for event in &events {
                self.dispatch_contact(event);
            }
        }
        {
            let _timer = ScopedTimer::new("world::on_step");
            for body in &members {
                body.notify_step(dt);
            }
        }
        warn_if_frame_budget_exceeded(started.elapsed(), budget);
    }

    fn dispatch_sensor(&self, event: &ContactEvent) {
        let Touch { a, b } = &event.touch;
        for (host, other) in [(a, b), (b, a)] {
            let (FixtureSlot::Sensor(sensor_key), FixtureSlot::Shape(index)) =
                (host.slot, other.slot)
            else {
                continue;
            };
            if !event.notifies(host) {
                continue;
            }
            let Some(sensor) = host.body.sensor_by_key(sensor_key) else {
                continue;
            };
            let fixture = FixtureRef::new(other.body.clone(), index);
            if event.begin {
                if host.body.is_attached_to(self) && other.body.is_attached_to(self) {
                    sensor.begin_contact(fixture);
                }
            } else {
                sensor.end_contact(&fixture);
            }
        }
    }

    fn dispatch_contact(&self, event: &ContactEvent) {
        let Touch { a, b } = &event.touch;
        if a.slot.is_sensor() || b.slot.is_sensor() {
            return;
        }
        match event.departed {
            None => {
                if !(a.body.is_attached_to(self) && b.body.is_attached_to(self)) {
                    return;
                }
                a.body.notify_contact(event.begin, &b.body);
                b.body.notify_contact(event.begin, &a.body);
            }
            Some(_) => {
                for (side, other) in [(a, b), (b, a)] {
                    if event.notifies(side) && side.body.is_attached_to(self) {
                        side.body.notify_contact(event.begin, &other.body);
                    }
                }
            }
        }
    }

    /// Draws every member when debug drawing is enabled.
    pub fn draw(&self, surface: &mut dyn Surface) {
        if !self.debug_draw() {
            return;
        }
        for body in self.bodies() {
            body.draw(surface);
        }
    }
}
