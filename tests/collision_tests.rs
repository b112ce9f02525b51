use approx::assert_relative_eq;
use kinetic2d::{
    collision::{narrowphase::sat_points, shapes::ShapeKind},
    Collision, Figure, Geometry, NarrowPhase, PhysicsError, Shape, Transform, Vec2,
};

fn all_sample_shapes() -> Vec<Shape> {
    vec![
        Shape::circle(1.0).unwrap(),
        Shape::rectangle(0.5, 0.0, 2.0, 1.0).unwrap(),
        Shape::ellipse(Vec2::ZERO, 1.5, 0.75).unwrap(),
        Shape::polygon(vec![
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(0.0, 1.0),
        ])
        .unwrap(),
        Shape::polygonal_chain(vec![
            Vec2::new(-2.0, 0.5),
            Vec2::new(0.0, -0.5),
            Vec2::new(2.0, 0.5),
        ])
        .unwrap(),
        Shape::point(Vec2::new(0.25, 0.0)).unwrap(),
        Shape::half_plane(Vec2::new(0.0, 0.5), Vec2::new(0.0, -1.0)).unwrap(),
        Shape::line_segment(Vec2::new(-1.0, 0.2), Vec2::new(1.0, -0.2)).unwrap(),
    ]
}

#[test]
fn test_circle_circle_depth_matches_radius_sum() {
    let a = Shape::circle(2.0).unwrap();
    let b = Shape::circle(1.0).unwrap();

    for distance in [0.5_f32, 1.0, 2.5, 2.999, 3.0, 4.0] {
        let xb = Transform::from_position(Vec2::new(distance, 0.0));
        let hit = NarrowPhase::collide(&a, &Transform::IDENTITY, &b, &xb);
        if distance >= 3.0 {
            assert!(hit.is_null(), "distance {distance} should not collide");
        } else {
            assert_relative_eq!(hit.penetration_depth(), 3.0 - distance, epsilon = 1e-4);
        }
    }
}

#[test]
fn test_swapped_pairs_invert_each_other() {
    let shapes = all_sample_shapes();
    let offsets = [
        Transform::new(Vec2::new(0.3, 0.1), 0.2),
        Transform::new(Vec2::new(-0.4, 0.6), 1.1),
        Transform::new(Vec2::new(5.0, 5.0), 0.0),
    ];
    for a in &shapes {
        for b in &shapes {
            for xb in &offsets {
                let forward = NarrowPhase::collide(a, &Transform::IDENTITY, b, xb);
                let backward = NarrowPhase::collide(b, xb, a, &Transform::IDENTITY);
                assert_eq!(
                    forward.inverse(),
                    backward,
                    "{:?} vs {:?} at {:?}",
                    a.kind(),
                    b.kind(),
                    xb
                );
            }
        }
    }
}

#[test]
fn test_null_inverts_to_null() {
    assert_eq!(Collision::NULL.inverse(), Collision::NULL);
    let hit = Collision::new(Vec2::ZERO, Vec2::X);
    assert_eq!(hit.inverse().inverse(), hit);
}

#[test]
fn test_rectangle_sat_picks_x_axis() {
    let a = Shape::rectangle(0.0, 0.0, 10.0, 10.0).unwrap();
    let b = Shape::rectangle(5.0, 0.0, 10.0, 10.0).unwrap();
    let hit = a.collide_with(&b);
    assert_relative_eq!(hit.penetration_depth(), 5.0, epsilon = 1e-5);
    let p1 = hit.p1().unwrap();
    let p2 = hit.p2().unwrap();
    assert_relative_eq!(p1.y, p2.y, epsilon = 1e-5);
    assert!(p1.x > p2.x);
}

#[test]
fn test_sat_separated_polygons_do_not_collide() {
    let a = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];
    let b: Vec<Vec2> = a.iter().map(|v| *v + Vec2::new(1.5, 0.0)).collect();
    assert!(sat_points(&a, &b).is_null());

    let touching: Vec<Vec2> = a.iter().map(|v| *v + Vec2::new(1.0, 0.0)).collect();
    assert!(sat_points(&a, &touching).is_null());
}

#[test]
fn test_half_plane_circle_reports_signed_distance() {
    let floor = Shape::half_plane(Vec2::new(0.0, 10.0), Vec2::new(0.0, -1.0)).unwrap();
    let ball = Shape::circle(1.0).unwrap();
    let resting = Transform::from_position(Vec2::new(3.0, 9.5));
    let hit = NarrowPhase::collide(&ball, &resting, &floor, &Transform::IDENTITY);
    assert_relative_eq!(hit.penetration_depth(), 0.5, epsilon = 1e-5);
    let n = hit.normal().unwrap();
    assert_relative_eq!(n.y, 1.0, epsilon = 1e-5);
}

#[test]
fn test_point_probe_hits_only_inside() {
    let probe = Shape::point(Vec2::ZERO).unwrap();
    let circle = Shape::circle_at(Vec2::new(0.5, 0.0), 1.0).unwrap();
    assert!(probe.collide_with(&circle).is_hit());
    assert!(circle.collide_with(&probe).is_hit());

    let far = Transform::from_position(Vec2::new(10.0, 0.0));
    assert!(NarrowPhase::collide(&probe, &far, &circle, &Transform::IDENTITY).is_null());
}

#[test]
fn test_ellipse_contains_point_exactly() {
    let ellipse = Shape::ellipse(Vec2::ZERO, 2.0, 1.0).unwrap();
    assert!(ellipse.contains(Vec2::new(1.9, 0.0)));
    assert!(!ellipse.contains(Vec2::new(0.0, 1.1)));
    let probe = Shape::point(Vec2::new(1.9, 0.0)).unwrap();
    assert!(ellipse.collide_with(&probe).is_hit());
}

#[test]
fn test_chain_uses_deepest_segment() {
    let chain = Shape::polygonal_chain(vec![
        Vec2::new(-4.0, 0.0),
        Vec2::new(0.0, 0.0),
        Vec2::new(0.0, -4.0),
    ])
    .unwrap();
    let ball = Shape::circle(1.0).unwrap();
    let xf = Transform::from_position(Vec2::new(-2.0, 0.5));
    let hit = NarrowPhase::collide(&chain, &Transform::IDENTITY, &ball, &xf);
    assert_relative_eq!(hit.penetration_depth(), 0.5, epsilon = 1e-4);
}

#[test]
fn test_every_kind_pair_is_dispatched() {
    for a in ShapeKind::ALL {
        for b in ShapeKind::ALL {
            assert!(NarrowPhase::is_covered(a, b));
        }
    }
}

#[test]
fn test_invalid_shapes_are_rejected() {
    assert!(Shape::circle(0.0).is_err());
    assert!(Shape::circle(f32::NAN).is_err());
    assert!(Shape::rectangle(0.0, 0.0, -1.0, 1.0).is_err());
    assert!(Shape::polygon(vec![Vec2::ZERO, Vec2::X]).is_err());
    assert!(Shape::polygonal_chain(vec![Vec2::ZERO]).is_err());
    assert!(Shape::half_plane(Vec2::ZERO, Vec2::ZERO).is_err());
    assert!(Shape::line_segment(Vec2::X, Vec2::X).is_err());
}

#[test]
fn test_figure_hierarchy_collides_in_world_space() {
    let parent = Figure::with_placement(Vec2::new(10.0, 0.0), 0.0);
    let child = Figure::with_placement(Vec2::new(2.0, 0.0), 0.0)
        .with_shape(Shape::circle(1.0).unwrap());
    child.set_parent(Some(&parent)).unwrap();
    let other = Figure::with_placement(Vec2::new(13.5, 0.0), 0.0)
        .with_shape(Shape::circle(1.0).unwrap());

    let hit = child.collide_with(&other);
    assert_relative_eq!(hit.penetration_depth(), 0.5, epsilon = 1e-5);

    parent.translate(Vec2::new(-5.0, 0.0));
    assert!(child.collide_with(&other).is_null());
    assert_relative_eq!(child.world_transform().position.x, 7.0, epsilon = 1e-5);
}

#[test]
fn test_loader_geometry_is_validated() {
    let good = Geometry::Circle {
        center: Vec2::ZERO,
        radius: 2.0,
    };
    let shape = Shape::try_from(good.clone()).unwrap();
    assert_eq!(shape.geometry(), &good);

    let bad = Geometry::Rectangle {
        center: Vec2::ZERO,
        width: 0.0,
        height: 1.0,
    };
    assert!(matches!(
        Shape::try_from(bad),
        Err(PhysicsError::InvalidShape(_))
    ));
}
