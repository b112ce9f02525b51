use kinetic2d::{
    Body, BodyDef, BodyType, Joint, JointKind, PhysicsError, PhysicsWorld, Shape, Vec2,
    WorldConfig,
};

fn make_world() -> PhysicsWorld {
    PhysicsWorld::new(WorldConfig::default().with_solver_iterations(16))
}

fn pivot(position: Vec2) -> Body {
    Body::new(
        BodyDef::new()
            .with_name("pivot")
            .with_body_type(BodyType::Static)
            .with_position(position)
            .with_shape(Shape::circle(0.1).unwrap()),
    )
}

fn bob(position: Vec2) -> Body {
    Body::new(
        BodyDef::new()
            .with_name("bob")
            .with_position(position)
            .with_shape(Shape::circle(0.2).unwrap()),
    )
}

#[test]
fn test_rod_keeps_distance_while_swinging() {
    let world = make_world();
    let anchor = pivot(Vec2::ZERO);
    let weight = bob(Vec2::new(3.0, 0.0));
    world.add(&anchor);
    world.add(&weight);

    let joint = Joint::rod(&anchor, &weight, Vec2::ZERO, Vec2::new(3.0, 0.0)).unwrap();
    assert_eq!(joint.kind(), JointKind::Rod { length: 3.0 });
    assert_eq!(world.joint_count(), 1);

    let mut lowest = f32::MIN;
    for _ in 0..180 {
        world.step(1.0 / 60.0);
        let distance = weight.position().length();
        assert!((distance - 3.0).abs() < 0.15, "rod stretched to {distance}");
        lowest = lowest.max(weight.position().y);
    }
    assert!(lowest > 2.5, "bob only swung down to {lowest}");
}

#[test]
fn test_rope_only_limits_maximum_length() {
    let world = make_world();
    let anchor = pivot(Vec2::ZERO);
    let weight = bob(Vec2::new(0.0, 1.0));
    world.add(&anchor);
    world.add(&weight);

    Joint::rope(&anchor, &weight, Vec2::ZERO, Vec2::new(0.0, 1.0), 2.0).unwrap();
    for _ in 0..240 {
        world.step(1.0 / 60.0);
    }
    let hanging = weight.position().length();
    assert!(hanging > 1.8 && hanging < 2.15, "rope length {hanging}");
}

#[test]
fn test_hinge_pins_bodies_together() {
    let world = make_world();
    let anchor = pivot(Vec2::ZERO);
    let plank = Body::new(
        BodyDef::new()
            .with_position(Vec2::new(1.0, 0.0))
            .with_shape(Shape::rectangle(0.0, 0.0, 2.0, 0.2).unwrap()),
    );
    world.add(&anchor);
    world.add(&plank);
    Joint::hinge(&anchor, &plank, Vec2::ZERO).unwrap();

    let mut swing = 0.0_f32;
    for _ in 0..120 {
        world.step(1.0 / 60.0);
        // The plank's left end stays on the pivot while the plank swings down.
        let left_end = plank.transform().apply(Vec2::new(-1.0, 0.0));
        assert!(left_end.length() < 0.1, "hinge drifted to {left_end:?}");
        swing = swing.max(plank.angle().abs());
    }
    assert!(swing > 1.0, "plank only rotated {swing} rad");
}

#[test]
fn test_joint_needs_two_attached_bodies_in_one_world() {
    let world = make_world();
    let attached = bob(Vec2::ZERO);
    let detached = bob(Vec2::new(1.0, 0.0));
    world.add(&attached);

    let err = Joint::rod(&attached, &detached, Vec2::ZERO, Vec2::X).unwrap_err();
    assert!(matches!(err, PhysicsError::IllegalState(_)));
    assert_eq!(world.joint_count(), 0);

    let other_world = make_world();
    other_world.add(&detached);
    assert!(Joint::hinge(&attached, &detached, Vec2::ZERO)
        .unwrap_err()
        .is_illegal_state());
    assert!(Joint::rod(&attached, &attached, Vec2::ZERO, Vec2::X).is_err());
    assert_eq!(world.joint_count(), 0);
    assert_eq!(other_world.joint_count(), 0);
}

#[test]
fn test_rope_length_must_be_positive() {
    let world = make_world();
    let a = bob(Vec2::ZERO);
    let b = bob(Vec2::X);
    world.add(&a);
    world.add(&b);
    assert!(matches!(
        Joint::rope(&a, &b, Vec2::ZERO, Vec2::X, 0.0),
        Err(PhysicsError::InvalidArgument(_))
    ));
}

#[test]
fn test_destroy_is_idempotent() {
    let world = make_world();
    let a = pivot(Vec2::ZERO);
    let b = bob(Vec2::new(2.0, 0.0));
    world.add(&a);
    world.add(&b);

    let joint = Joint::rod(&a, &b, Vec2::ZERO, Vec2::new(2.0, 0.0)).unwrap();
    let copy = joint.clone();
    joint.destroy();
    assert!(copy.is_destroyed());
    assert_eq!(world.joint_count(), 0);
    copy.destroy();
    assert_eq!(world.joint_count(), 0);
}

#[test]
fn test_removing_a_body_destroys_its_joints() {
    let world = make_world();
    let a = pivot(Vec2::ZERO);
    let b = bob(Vec2::new(2.0, 0.0));
    world.add(&a);
    world.add(&b);
    let joint = Joint::rod(&a, &b, Vec2::ZERO, Vec2::new(2.0, 0.0)).unwrap();

    world.remove(&b);
    assert!(joint.is_destroyed());
    assert_eq!(world.joint_count(), 0);

    world.add(&b);
    assert_eq!(world.joint_count(), 0);
}

#[test]
fn test_joint_survives_rehome() {
    let world = make_world();
    let a = pivot(Vec2::ZERO);
    let b = bob(Vec2::new(2.0, 0.0));
    world.add(&a);
    world.add(&b);
    let joint = Joint::rod(&a, &b, Vec2::ZERO, Vec2::new(2.0, 0.0)).unwrap();

    b.add_shape(Shape::circle_at(Vec2::new(0.0, 0.3), 0.1).unwrap());
    assert!(!joint.is_destroyed());
    assert_eq!(world.joint_count(), 1);

    for _ in 0..60 {
        world.step(1.0 / 60.0);
    }
    let distance = b.position().length();
    assert!((distance - 2.0).abs() < 0.2, "rod stretched to {distance}");
}

#[test]
fn test_dropping_the_world_latches_joints() {
    let a = pivot(Vec2::ZERO);
    let b = bob(Vec2::new(2.0, 0.0));
    let joint = {
        let world = make_world();
        world.add(&a);
        world.add(&b);
        Joint::rod(&a, &b, Vec2::ZERO, Vec2::new(2.0, 0.0)).unwrap()
    };
    assert!(joint.is_destroyed());
    joint.destroy();
}
