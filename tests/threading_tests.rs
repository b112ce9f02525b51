use kinetic2d::{Body, BodyDef, Joint, PhysicsWorld, Sensor, Shape, Vec2};
use std::thread;

#[test]
fn test_handles_are_sync_and_send() {
    fn assert_sync_send<T: Sync + Send>() {}
    assert_sync_send::<PhysicsWorld>();
    assert_sync_send::<Body>();
    assert_sync_send::<Joint>();
    assert_sync_send::<Sensor>();
}

#[test]
fn test_world_moved_to_simulation_thread() {
    let body = Body::new(
        BodyDef::new()
            .with_name("falling")
            .with_shape(Shape::circle(0.5).unwrap()),
    );
    let world = PhysicsWorld::default();
    world.add(&body);

    let handle = thread::spawn(move || {
        for _ in 0..30 {
            world.step(1.0 / 60.0);
        }
        world
    });
    let world = handle.join().unwrap();

    assert!(body.position().y > 0.0);
    assert!(body.is_attached_to(&world));
}

#[test]
fn test_shared_world_across_threads() {
    let world = PhysicsWorld::default();
    let bodies: Vec<Body> = (0..4)
        .map(|i| {
            let body = Body::new(
                BodyDef::new()
                    .with_position(Vec2::new(i as f32 * 5.0, 0.0))
                    .with_shape(Shape::circle(1.0).unwrap()),
            );
            world.add(&body);
            body
        })
        .collect();

    let mut handles = vec![];
    for body in bodies.iter().cloned() {
        let world = world.clone();
        handles.push(thread::spawn(move || {
            world.step(1.0 / 60.0);
            body.set_linear_velocity(Vec2::new(1.0, 0.0));
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(world.body_count(), 4);
    for body in &bodies {
        assert!(body.linear_velocity().x > 0.0);
    }
}
