use approx::assert_relative_eq;
use kinetic2d::{
    Body, BodyDef, BodyListener, BodyType, PhysicsEngine, PhysicsError, PhysicsWorld,
    RecordingSurface, Shape, Vec2, WorldConfig,
};
use parking_lot::Mutex;
use std::sync::Arc;

type EventLog = Arc<Mutex<Vec<String>>>;

struct Recorder {
    log: EventLog,
}

impl BodyListener for Recorder {
    fn on_begin_contact(&mut self, body: &Body, other: &Body) {
        self.log.lock().push(format!(
            "begin {} {}",
            body.name().unwrap_or_default(),
            other.name().unwrap_or_default()
        ));
    }

    fn on_end_contact(&mut self, body: &Body, other: &Body) {
        self.log.lock().push(format!(
            "end {} {}",
            body.name().unwrap_or_default(),
            other.name().unwrap_or_default()
        ));
    }

    fn on_step(&mut self, body: &Body, _dt: f32) {
        self.log
            .lock()
            .push(format!("step {}", body.name().unwrap_or_default()));
    }
}

fn zero_gravity() -> PhysicsWorld {
    PhysicsWorld::new(WorldConfig::default().with_gravity(Vec2::ZERO))
}

fn ball(name: &str, position: Vec2, log: &EventLog) -> Body {
    let body = Body::new(
        BodyDef::new()
            .with_name(name)
            .with_position(position)
            .with_shape(Shape::circle(1.0).unwrap()),
    );
    body.set_listener(Recorder {
        log: Arc::clone(log),
    });
    body
}

fn count(log: &EventLog, entry: &str) -> usize {
    log.lock().iter().filter(|e| e.as_str() == entry).count()
}

#[test]
fn test_ball_settles_on_static_floor() {
    let world = PhysicsWorld::default();
    let ball = Body::new(
        BodyDef::new()
            .with_name("ball")
            .with_shape(Shape::circle(0.5).unwrap()),
    );
    let floor = Body::new(
        BodyDef::new()
            .with_name("floor")
            .with_body_type(BodyType::Static)
            .with_position(Vec2::new(0.0, 10.0))
            .with_shape(Shape::rectangle(0.0, 0.0, 20.0, 1.0).unwrap()),
    );
    world.add(&ball);
    world.add(&floor);

    let dt = 1.0 / 60.0;
    let mut previous = ball.position().y;
    for _ in 0..240 {
        world.step(dt);
        let y = ball.position().y;
        if y < 8.9 {
            assert!(y >= previous, "ball rose from {previous} to {y} while falling");
        }
        previous = y;
    }

    let resting = ball.position().y;
    assert!(resting > 8.8 && resting < 9.1, "ball rests at {resting}");
    assert!(ball.linear_velocity().y.abs() < 0.2);
    assert_eq!(floor.position(), Vec2::new(0.0, 10.0));
}

#[test]
fn test_paused_world_does_not_step() {
    let log = EventLog::default();
    let world = PhysicsWorld::default();
    let body = ball("a", Vec2::ZERO, &log);
    world.add(&body);

    world.set_paused(true);
    world.step(1.0 / 60.0);
    assert_eq!(body.position(), Vec2::ZERO);
    assert!(log.lock().is_empty());

    world.set_paused(false);
    world.step(1.0 / 60.0);
    assert!(body.position().y > 0.0);
    assert_eq!(count(&log, "step a"), 1);
}

#[test]
fn test_bodies_returns_a_copy() {
    let world = zero_gravity();
    let log = EventLog::default();
    world.add(&ball("a", Vec2::ZERO, &log));
    world.add(&ball("b", Vec2::new(5.0, 0.0), &log));

    let mut bodies = world.bodies();
    bodies.clear();
    assert_eq!(world.bodies().len(), 2);
    assert_eq!(world.body_count(), 2);
}

#[test]
fn test_on_step_runs_in_insertion_order() {
    let world = zero_gravity();
    let log = EventLog::default();
    for (name, x) in [("c", 0.0), ("a", 10.0), ("b", 20.0)] {
        world.add(&ball(name, Vec2::new(x, 0.0), &log));
    }
    world.step(1.0 / 60.0);
    assert_eq!(*log.lock(), vec!["step c", "step a", "step b"]);
}

#[test]
fn test_begin_and_end_contact_reach_both_bodies() {
    let world = zero_gravity();
    let log = EventLog::default();
    let a = ball("a", Vec2::ZERO, &log);
    let b = ball("b", Vec2::new(1.5, 0.0), &log);
    world.add(&a);
    world.add(&b);

    world.step(1.0 / 60.0);
    assert_eq!(count(&log, "begin a b"), 1);
    assert_eq!(count(&log, "begin b a"), 1);

    // Contact events come before the step hooks of the same step.
    let entries = log.lock().clone();
    let last_contact = entries.iter().rposition(|e| e.starts_with("begin")).unwrap();
    let first_step = entries.iter().position(|e| e.starts_with("step")).unwrap();
    assert!(last_contact < first_step);

    b.set_position(Vec2::new(50.0, 0.0));
    world.step(1.0 / 60.0);
    assert_eq!(count(&log, "end a b"), 1);
    assert_eq!(count(&log, "end b a"), 1);
    assert_eq!(count(&log, "begin a b"), 1);
}

#[test]
fn test_rehome_does_not_repeat_contact_events() {
    let world = zero_gravity();
    let log = EventLog::default();
    let a = ball("a", Vec2::ZERO, &log);
    let b = ball("b", Vec2::new(1.9, 0.0), &log);
    world.add(&a);
    world.add(&b);
    world.step(1.0 / 60.0);
    assert_eq!(count(&log, "begin a b"), 1);

    let nudged = b.position() + Vec2::new(0.0, 0.01);
    b.set_position(nudged);
    world.step(1.0 / 60.0);
    assert_eq!(count(&log, "begin a b"), 1);
    assert_eq!(count(&log, "end a b"), 0);
}

#[test]
fn test_replaced_shape_restarts_its_contacts() {
    let world = zero_gravity();
    let log = EventLog::default();
    let a = ball("a", Vec2::ZERO, &log);
    let b = ball("b", Vec2::new(1.5, 0.0), &log);
    world.add(&a);
    world.add(&b);
    world.step(1.0 / 60.0);
    assert_eq!(count(&log, "begin a b"), 1);

    // Appending keeps every existing fixture index.
    b.add_shape(Shape::circle_at(Vec2::new(0.0, 5.0), 0.5).unwrap());
    world.step(1.0 / 60.0);
    assert_eq!(count(&log, "end a b"), 0);

    // A different shape at index 0 is a different fixture.
    b.set_shapes(vec![Shape::circle_at(Vec2::new(0.1, 0.0), 1.0).unwrap()]);
    world.step(1.0 / 60.0);
    assert_eq!(count(&log, "end a b"), 1);
    assert_eq!(count(&log, "begin a b"), 2);
    assert_eq!(count(&log, "end b a"), 1);
}

#[test]
fn test_removed_body_gets_no_end_contact() {
    let world = zero_gravity();
    let log = EventLog::default();
    let a = ball("a", Vec2::ZERO, &log);
    let b = ball("b", Vec2::new(1.5, 0.0), &log);
    world.add(&a);
    world.add(&b);
    world.step(1.0 / 60.0);

    world.remove(&b);
    world.step(1.0 / 60.0);
    assert_eq!(count(&log, "end a b"), 1);
    assert_eq!(count(&log, "end b a"), 0);
    assert_eq!(count(&log, "step b"), 1);
}

#[test]
fn test_scale_converts_units() {
    let world = PhysicsWorld::new(WorldConfig::default().with_scale(2.0));
    let body = Body::new(
        BodyDef::new()
            .with_position(Vec2::new(4.0, 0.0))
            .with_shape(Shape::circle(1.0).unwrap()),
    );
    world.add(&body);

    let dt = 1.0 / 60.0;
    world.step(dt);
    assert_relative_eq!(body.linear_velocity().y, 9.81 * dt, epsilon = 1e-4);
    assert_relative_eq!(body.position().x, 4.0, epsilon = 1e-4);

    assert!(matches!(
        world.set_scale(3.0),
        Err(PhysicsError::IllegalState(_))
    ));
    world.remove(&body);
    world.set_scale(3.0).unwrap();
    assert_eq!(world.scale(), 3.0);
}

#[test]
fn test_invalid_scale_falls_back_to_default() {
    let world = PhysicsWorld::new(WorldConfig::default().with_scale(-1.0));
    assert_eq!(world.scale(), 1.0);
    assert!(world.set_scale(0.0).is_err());
}

#[test]
fn test_debug_draw_toggle() {
    let world = zero_gravity();
    let log = EventLog::default();
    world.add(&ball("a", Vec2::ZERO, &log));

    let mut surface = RecordingSurface::new();
    world.draw(&mut surface);
    assert_eq!(surface.primitive_count(), 0);

    world.set_debug_draw(true);
    world.draw(&mut surface);
    assert_eq!(surface.primitive_count(), 1);
}

#[test]
fn test_engine_runs_fixed_steps() {
    let mut engine = PhysicsEngine::new(0.01);
    let log = EventLog::default();
    engine.world().add(&ball("a", Vec2::ZERO, &log));

    assert_eq!(engine.advance(0.035), 3);
    assert_relative_eq!(engine.alpha(), 0.5, epsilon = 1e-3);
    assert_eq!(count(&log, "step a"), 3);

    engine.set_max_substeps(2);
    assert_eq!(engine.advance(1.0), 2);
    assert!(engine.alpha() < 1.0);
}
