//! Default simulation backend: a small sequential-impulse rigid-body solver.
//!
//! Each step integrates velocities, runs the narrow phase over every body pair with at
//! least one dynamic participant, iterates joint and contact impulses, then integrates
//! positions. Positional drift is fed back through a Baumgarte velocity bias.

use glam::{Mat2, Vec2};

use crate::{
    collision::narrowphase::NarrowPhase,
    config::{
        BAUMGARTE, DEFAULT_SOLVER_ITERATIONS, GEOMETRY_EPSILON, LINEAR_SLOP,
        RESTITUTION_THRESHOLD,
    },
    core::types::{BodyType, Material, Transform},
    dynamics::{
        backend::{
            BackendBodyDef, BackendBodyState, BackendJointDef, FixtureContact, FixtureDef,
            JointKind, PhysicsBackend,
        },
        mass::MassProperties,
    },
    utils::{
        allocator::{Arena, Handle},
        logging::ScopedTimer,
        math::{cross, cross_sv},
    },
};

#[derive(Debug, Clone)]
struct SimBody {
    body_type: BodyType,
    /// World-space center of mass.
    center: Vec2,
    angle: f32,
    linear_velocity: Vec2,
    angular_velocity: f32,
    linear_damping: f32,
    angular_damping: f32,
    fixed_rotation: bool,
    material: Material,
    fixtures: Vec<FixtureDef>,
    mass: MassProperties,
    force: Vec2,
    torque: f32,
}

impl SimBody {
    fn from_def(def: &BackendBodyDef) -> Self {
        let mass = if def.body_type.is_dynamic() {
            MassProperties::from_shapes(
                def.fixtures.iter().filter(|f| !f.is_sensor()).map(|f| &f.shape),
                def.material.density,
                false,
            )
        } else {
            MassProperties::immovable()
        };
        let center = def.position + Vec2::from_angle(def.angle).rotate(mass.local_center);
        Self {
            body_type: def.body_type,
            center,
            angle: def.angle,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            fixed_rotation: def.fixed_rotation,
            material: def.material,
            fixtures: def.fixtures.clone(),
            mass,
            force: Vec2::ZERO,
            torque: 0.0,
        }
    }

    fn transform(&self) -> Transform {
        let origin = self.center - Vec2::from_angle(self.angle).rotate(self.mass.local_center);
        Transform::new(origin, self.angle)
    }

    fn state(&self) -> BackendBodyState {
        BackendBodyState {
            position: self.transform().position,
            angle: self.angle,
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
        }
    }

    fn inverse_mass(&self) -> f32 {
        if self.body_type.is_dynamic() {
            self.mass.inverse_mass
        } else {
            0.0
        }
    }

    fn inverse_inertia(&self) -> f32 {
        if self.body_type.is_dynamic() && !self.fixed_rotation {
            self.mass.inverse_inertia
        } else {
            0.0
        }
    }

    fn velocity_at(&self, r: Vec2) -> Vec2 {
        self.linear_velocity + cross_sv(self.angular_velocity, r)
    }

    fn apply_impulse(&mut self, impulse: Vec2, r: Vec2) {
        self.linear_velocity += impulse * self.inverse_mass();
        self.angular_velocity += self.inverse_inertia() * cross(r, impulse);
    }

    fn integrate_velocity(&mut self, gravity: Vec2, dt: f32) {
        if !self.body_type.is_dynamic() {
            return;
        }
        self.linear_velocity += (gravity + self.force * self.mass.inverse_mass) * dt;
        self.angular_velocity += self.torque * self.inverse_inertia() * dt;
        self.linear_velocity *= 1.0 / (1.0 + dt * self.linear_damping.max(0.0));
        self.angular_velocity *= 1.0 / (1.0 + dt * self.angular_damping.max(0.0));
        if self.fixed_rotation {
            self.angular_velocity = 0.0;
        }
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    fn integrate_position(&mut self, dt: f32) {
        if self.body_type == BodyType::Static {
            return;
        }
        self.center += self.linear_velocity * dt;
        self.angle += self.angular_velocity * dt;
    }
}

#[derive(Debug, Clone)]
struct SimJoint {
    body_a: Handle,
    body_b: Handle,
    /// Anchors relative to each body's center of mass, in the body frame.
    local_a: Vec2,
    local_b: Vec2,
    kind: JointKind,
    accumulated: f32,
}

#[derive(Debug, Clone)]
struct ContactConstraint {
    body_a: Handle,
    body_b: Handle,
    point: Vec2,
    normal: Vec2,
    friction: f32,
    velocity_bias: f32,
    normal_impulse: f32,
    tangent_impulse: f32,
}

fn aabbs_overlap(a: Option<(Vec2, Vec2)>, b: Option<(Vec2, Vec2)>) -> bool {
    match (a, b) {
        (Some((a_min, a_max)), Some((b_min, b_max))) => {
            a_min.x <= b_max.x && b_min.x <= a_max.x && a_min.y <= b_max.y && b_min.y <= a_max.y
        }
        _ => true,
    }
}

fn effective_mass(a: &SimBody, b: &SimBody, ra: Vec2, rb: Vec2, axis: Vec2) -> f32 {
    a.inverse_mass()
        + b.inverse_mass()
        + a.inverse_inertia() * cross(ra, axis).powi(2)
        + b.inverse_inertia() * cross(rb, axis).powi(2)
}

/// Sequential-impulse backend used by default in [`PhysicsWorld`](crate::world::PhysicsWorld).
#[derive(Debug, Clone)]
pub struct ImpulseBackend {
    bodies: Arena<SimBody>,
    joints: Arena<SimJoint>,
    gravity: Vec2,
    iterations: u32,
    parallel_enabled: bool,
    touching: Vec<FixtureContact>,
}

impl Default for ImpulseBackend {
    fn default() -> Self {
        Self::new(DEFAULT_SOLVER_ITERATIONS)
    }
}

impl ImpulseBackend {
    pub fn new(iterations: u32) -> Self {
        Self {
            bodies: Arena::new(),
            joints: Arena::new(),
            gravity: Vec2::ZERO,
            iterations: iterations.max(1),
            parallel_enabled: false,
            touching: Vec::new(),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn set_iterations(&mut self, iterations: u32) {
        self.iterations = iterations.max(1);
    }

    /// Runs velocity integration on the rayon pool when the `parallel` feature is on.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.parallel_enabled = enabled;
    }

    pub fn parallel_enabled(&self) -> bool {
        self.parallel_enabled
    }

    fn connected(&self, a: Handle, b: Handle) -> bool {
        self.joints.iter().any(|(_, j)| {
            (j.body_a == a && j.body_b == b) || (j.body_a == b && j.body_b == a)
        })
    }

    fn integrate_velocities(&mut self, dt: f32) {
        let gravity = self.gravity;
        #[cfg(feature = "parallel")]
        if self.parallel_enabled {
            self.bodies
                .par_for_each_mut(|body| body.integrate_velocity(gravity, dt));
            return;
        }
        for body in self.bodies.values_mut() {
            body.integrate_velocity(gravity, dt);
        }
    }

    fn collide(&mut self, dt: f32) -> Vec<ContactConstraint> {
        let _timer = ScopedTimer::new("backend::collide");
        let handles = self.bodies.handles();
        let mut touching = Vec::new();
        let mut constraints = Vec::new();

        for (i, &ha) in handles.iter().enumerate() {
            for &hb in &handles[i + 1..] {
                let (Some(a), Some(b)) = (self.bodies.get(ha), self.bodies.get(hb)) else {
                    continue;
                };
                if !a.body_type.is_dynamic() && !b.body_type.is_dynamic() {
                    continue;
                }
                if self.connected(ha, hb) {
                    continue;
                }
                let (xa, xb) = (a.transform(), b.transform());
                for fa in &a.fixtures {
                    for fb in &b.fixtures {
                        if fa.is_sensor() && fb.is_sensor() {
                            continue;
                        }
                        if !aabbs_overlap(fa.shape.aabb(&xa), fb.shape.aabb(&xb)) {
                            continue;
                        }
                        let hit = NarrowPhase::collide(&fa.shape, &xa, &fb.shape, &xb);
                        if hit.is_null() {
                            continue;
                        }
                        touching.push(FixtureContact::new(ha, fa.slot, hb, fb.slot));
                        if fa.is_sensor() || fb.is_sensor() {
                            continue;
                        }
                        let (Some(normal), Some(point)) = (hit.normal(), hit.midpoint()) else {
                            continue;
                        };
                        let ra = point - a.center;
                        let rb = point - b.center;
                        let approach = (b.velocity_at(rb) - a.velocity_at(ra)).dot(normal);
                        let restitution = a.material.mixed_restitution(&b.material);
                        let mut velocity_bias =
                            BAUMGARTE / dt * (hit.penetration_depth() - LINEAR_SLOP).max(0.0);
                        if approach < -RESTITUTION_THRESHOLD {
                            velocity_bias = velocity_bias.max(-restitution * approach);
                        }
                        constraints.push(ContactConstraint {
                            body_a: ha,
                            body_b: hb,
                            point,
                            normal,
                            friction: a.material.mixed_friction(&b.material),
                            velocity_bias,
                            normal_impulse: 0.0,
                            tangent_impulse: 0.0,
                        });
                    }
                }
            }
        }

        touching.sort();
        touching.dedup();
        self.touching = touching;
        constraints
    }

    fn solve_contact(bodies: &mut Arena<SimBody>, contact: &mut ContactConstraint) {
        let Some((a, b)) = bodies.get2_mut(contact.body_a, contact.body_b) else {
            return;
        };
        let n = contact.normal;
        let ra = contact.point - a.center;
        let rb = contact.point - b.center;

        let k_normal = effective_mass(a, b, ra, rb, n);
        if k_normal <= GEOMETRY_EPSILON {
            return;
        }
        let vn = (b.velocity_at(rb) - a.velocity_at(ra)).dot(n);
        let lambda = (contact.velocity_bias - vn) / k_normal;
        let total = (contact.normal_impulse + lambda).max(0.0);
        let delta = total - contact.normal_impulse;
        contact.normal_impulse = total;
        a.apply_impulse(-n * delta, ra);
        b.apply_impulse(n * delta, rb);

        let t = n.perp();
        let k_tangent = effective_mass(a, b, ra, rb, t);
        if k_tangent <= GEOMETRY_EPSILON {
            return;
        }
        let vt = (b.velocity_at(rb) - a.velocity_at(ra)).dot(t);
        let limit = contact.friction * contact.normal_impulse;
        let total = (contact.tangent_impulse - vt / k_tangent).clamp(-limit, limit);
        let delta = total - contact.tangent_impulse;
        contact.tangent_impulse = total;
        a.apply_impulse(-t * delta, ra);
        b.apply_impulse(t * delta, rb);
    }

    fn solve_joint(bodies: &mut Arena<SimBody>, joint: &mut SimJoint, dt: f32) {
        let Some((a, b)) = bodies.get2_mut(joint.body_a, joint.body_b) else {
            return;
        };
        let ra = Vec2::from_angle(a.angle).rotate(joint.local_a);
        let rb = Vec2::from_angle(b.angle).rotate(joint.local_b);
        let separation = (b.center + rb) - (a.center + ra);
        let relative = b.velocity_at(rb) - a.velocity_at(ra);

        match joint.kind {
            JointKind::Hinge => {
                let (ma, mb) = (a.inverse_mass(), b.inverse_mass());
                let (ia, ib) = (a.inverse_inertia(), b.inverse_inertia());
                let k11 = ma + mb + ia * ra.y * ra.y + ib * rb.y * rb.y;
                let k12 = -ia * ra.x * ra.y - ib * rb.x * rb.y;
                let k22 = ma + mb + ia * ra.x * ra.x + ib * rb.x * rb.x;
                let k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
                if k.determinant().abs() <= GEOMETRY_EPSILON {
                    return;
                }
                let impulse = -(k.inverse() * (relative + separation * (BAUMGARTE / dt)));
                a.apply_impulse(-impulse, ra);
                b.apply_impulse(impulse, rb);
            }
            JointKind::Rod { length } | JointKind::Rope { max_length: length } => {
                let current = separation.length();
                if current <= GEOMETRY_EPSILON {
                    return;
                }
                let u = separation / current;
                let k = effective_mass(a, b, ra, rb, u);
                if k <= GEOMETRY_EPSILON {
                    return;
                }
                let error = current - length;
                let cdot = u.dot(relative);
                let delta = if matches!(joint.kind, JointKind::Rope { .. }) {
                    // Slack rope only limits the approach that would overshoot its length.
                    let bias = if error > 0.0 {
                        BAUMGARTE / dt * error
                    } else {
                        error / dt
                    };
                    let lambda = -(cdot + bias) / k;
                    let total = (joint.accumulated + lambda).min(0.0);
                    let delta = total - joint.accumulated;
                    joint.accumulated = total;
                    delta
                } else {
                    -(cdot + BAUMGARTE / dt * error) / k
                };
                a.apply_impulse(-u * delta, ra);
                b.apply_impulse(u * delta, rb);
            }
        }
    }
}

impl PhysicsBackend for ImpulseBackend {
    fn name(&self) -> &str {
        "impulse"
    }

    fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    fn gravity(&self) -> Vec2 {
        self.gravity
    }

    fn create_body(&mut self, def: &BackendBodyDef) -> Handle {
        self.bodies.insert(SimBody::from_def(def))
    }

    fn destroy_body(&mut self, body: Handle) -> Option<BackendBodyState> {
        let removed = self.bodies.remove(body)?;
        let attached: Vec<Handle> = self
            .joints
            .iter()
            .filter(|(_, j)| j.body_a == body || j.body_b == body)
            .map(|(h, _)| h)
            .collect();
        for joint in attached {
            self.joints.remove(joint);
        }
        self.touching.retain(|c| !c.involves(body));
        Some(removed.state())
    }

    fn body_state(&self, body: Handle) -> Option<BackendBodyState> {
        self.bodies.get(body).map(SimBody::state)
    }

    fn set_linear_velocity(&mut self, body: Handle, velocity: Vec2) -> bool {
        self.bodies
            .get_mut(body)
            .map(|b| b.linear_velocity = velocity)
            .is_some()
    }

    fn set_angular_velocity(&mut self, body: Handle, velocity: f32) -> bool {
        self.bodies
            .get_mut(body)
            .map(|b| b.angular_velocity = velocity)
            .is_some()
    }

    fn set_damping(&mut self, body: Handle, linear: f32, angular: f32) -> bool {
        self.bodies
            .get_mut(body)
            .map(|b| {
                b.linear_damping = linear;
                b.angular_damping = angular;
            })
            .is_some()
    }

    fn set_fixed_rotation(&mut self, body: Handle, fixed: bool) -> bool {
        self.bodies
            .get_mut(body)
            .map(|b| {
                b.fixed_rotation = fixed;
                if fixed {
                    b.angular_velocity = 0.0;
                }
            })
            .is_some()
    }

    fn apply_force(&mut self, body: Handle, force: Vec2, point: Vec2) -> bool {
        self.bodies
            .get_mut(body)
            .map(|b| {
                b.force += force;
                b.torque += cross(point - b.center, force);
            })
            .is_some()
    }

    fn apply_torque(&mut self, body: Handle, torque: f32) -> bool {
        self.bodies
            .get_mut(body)
            .map(|b| b.torque += torque)
            .is_some()
    }

    fn apply_linear_impulse(&mut self, body: Handle, impulse: Vec2, point: Vec2) -> bool {
        self.bodies
            .get_mut(body)
            .map(|b| {
                let r = point - b.center;
                b.apply_impulse(impulse, r);
            })
            .is_some()
    }

    fn apply_angular_impulse(&mut self, body: Handle, impulse: f32) -> bool {
        self.bodies
            .get_mut(body)
            .map(|b| b.angular_velocity += b.inverse_inertia() * impulse)
            .is_some()
    }

    fn mass(&self, body: Handle) -> Option<f32> {
        self.bodies.get(body).map(|b| {
            if b.body_type.is_dynamic() {
                b.mass.mass
            } else {
                0.0
            }
        })
    }

    fn create_joint(&mut self, def: &BackendJointDef) -> Option<Handle> {
        if def.body_a == def.body_b {
            return None;
        }
        let a = self.bodies.get(def.body_a)?;
        let b = self.bodies.get(def.body_b)?;
        let joint = SimJoint {
            body_a: def.body_a,
            body_b: def.body_b,
            local_a: Vec2::from_angle(-a.angle).rotate(def.anchor_a - a.center),
            local_b: Vec2::from_angle(-b.angle).rotate(def.anchor_b - b.center),
            kind: def.kind,
            accumulated: 0.0,
        };
        // Jointed bodies stop colliding with each other.
        self.touching
            .retain(|c| !(c.involves(def.body_a) && c.involves(def.body_b)));
        Some(self.joints.insert(joint))
    }

    fn destroy_joint(&mut self, joint: Handle) -> bool {
        self.joints.remove(joint).is_some()
    }

    fn step(&mut self, dt: f32) {
        if dt <= 0.0 || !dt.is_finite() {
            return;
        }
        let _timer = ScopedTimer::new("backend::step");

        self.integrate_velocities(dt);
        let mut contacts = self.collide(dt);

        {
            let _solver_timer = ScopedTimer::new("backend::solve");
            for joint in self.joints.values_mut() {
                joint.accumulated = 0.0;
            }
            let joint_handles = self.joints.handles();
            for _ in 0..self.iterations {
                for &handle in &joint_handles {
                    if let Some(joint) = self.joints.get_mut(handle) {
                        Self::solve_joint(&mut self.bodies, joint, dt);
                    }
                }
                for contact in &mut contacts {
                    Self::solve_contact(&mut self.bodies, contact);
                }
            }
        }

        for body in self.bodies.values_mut() {
            body.integrate_position(dt);
        }
    }

    fn touching(&self) -> &[FixtureContact] {
        &self.touching
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn joint_count(&self) -> usize {
        self.joints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collision::shapes::Shape, dynamics::backend::FixtureSlot};
    use approx::assert_relative_eq;

    fn def(body_type: BodyType, position: Vec2, shape: Shape) -> BackendBodyDef {
        BackendBodyDef {
            body_type,
            position,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            fixed_rotation: false,
            material: Material::default(),
            fixtures: vec![FixtureDef::new(shape, FixtureSlot::Shape(0))],
        }
    }

    #[test]
    fn free_fall_matches_semi_implicit_euler() {
        let mut backend = ImpulseBackend::default();
        backend.set_gravity(Vec2::new(0.0, 10.0));
        let ball = backend.create_body(&def(
            BodyType::Dynamic,
            Vec2::ZERO,
            Shape::circle(0.5).unwrap(),
        ));
        backend.step(0.1);
        let state = backend.body_state(ball).unwrap();
        assert_relative_eq!(state.linear_velocity.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(state.position.y, 0.1, epsilon = 1e-5);
    }

    #[test]
    fn static_bodies_do_not_move() {
        let mut backend = ImpulseBackend::default();
        backend.set_gravity(Vec2::new(0.0, 10.0));
        let floor = backend.create_body(&def(
            BodyType::Static,
            Vec2::new(0.0, 5.0),
            Shape::rectangle(0.0, 0.0, 10.0, 1.0).unwrap(),
        ));
        for _ in 0..10 {
            backend.step(1.0 / 60.0);
        }
        assert_eq!(backend.body_state(floor).unwrap().position, Vec2::new(0.0, 5.0));
        assert_eq!(backend.mass(floor), Some(0.0));
    }

    #[test]
    fn overlapping_bodies_report_touching_fixtures() {
        let mut backend = ImpulseBackend::default();
        let a = backend.create_body(&def(
            BodyType::Dynamic,
            Vec2::ZERO,
            Shape::circle(1.0).unwrap(),
        ));
        let b = backend.create_body(&def(
            BodyType::Static,
            Vec2::new(1.5, 0.0),
            Shape::circle(1.0).unwrap(),
        ));
        backend.step(1.0 / 60.0);
        assert_eq!(
            backend.touching(),
            &[FixtureContact::new(a, FixtureSlot::Shape(0), b, FixtureSlot::Shape(0))]
        );
        assert!(backend.body_state(a).unwrap().linear_velocity.x < 0.0);

        backend.destroy_body(b);
        assert!(backend.touching().is_empty());
    }

    #[test]
    fn rod_keeps_its_length() {
        let mut backend = ImpulseBackend::default();
        backend.set_gravity(Vec2::new(0.0, 10.0));
        let anchor = backend.create_body(&def(
            BodyType::Static,
            Vec2::ZERO,
            Shape::circle(0.1).unwrap(),
        ));
        let bob = backend.create_body(&def(
            BodyType::Dynamic,
            Vec2::new(2.0, 0.0),
            Shape::circle(0.1).unwrap(),
        ));
        let joint = backend
            .create_joint(&BackendJointDef {
                body_a: anchor,
                body_b: bob,
                anchor_a: Vec2::ZERO,
                anchor_b: Vec2::new(2.0, 0.0),
                kind: JointKind::Rod { length: 2.0 },
            })
            .unwrap();
        for _ in 0..120 {
            backend.step(1.0 / 60.0);
        }
        let length = backend.body_state(bob).unwrap().position.length();
        assert!((length - 2.0).abs() < 0.1, "length drifted to {length}");
        assert!(backend.destroy_joint(joint));
        assert!(!backend.destroy_joint(joint));
    }
}
