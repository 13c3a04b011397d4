use approx::assert_abs_diff_eq;
use rigid2d::*;

fn pendulum(angle: f64) -> (PhysicsWorld, EntityId) {
    let mut world = PhysicsWorld::new();
    world.add_force_law(GravityLaw::default());
    let mut bar = make_block("bar", 0.1, 2.0, 1.0).unwrap();
    bar.set_position(DVec2::ZERO, angle);
    let bar = world.add_body(bar);
    world
        .add_joints(Joint::pin_to_world("pivot", bar, DVec2::new(0.0, 1.0), DVec2::ZERO))
        .unwrap();
    world.align_joints();
    (world, bar)
}

fn pivot(world: &PhysicsWorld, bar: EntityId) -> DVec2 {
    world.body(bar).unwrap().body_to_world(DVec2::new(0.0, 1.0))
}

#[test]
fn align_joints_moves_pivot_onto_anchor() {
    let (world, bar) = pendulum(0.3);
    assert!(pivot(&world, bar).length() < 1e-12);
    assert_abs_diff_eq!(world.body(bar).unwrap().angle(), 0.3, epsilon = 1e-12);
}

#[test]
fn hanging_bar_stays_still() {
    let (mut world, bar) = pendulum(0.0);
    for _ in 0..40 {
        world.advance(0.025).unwrap();
    }
    let body = world.body(bar).unwrap();
    assert!(pivot(&world, bar).length() < 1e-6);
    assert_abs_diff_eq!(body.position().y, -1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(body.velocity.angular, 0.0, epsilon = 1e-6);
}

#[test]
fn pendulum_swings_and_conserves_energy() {
    let (mut world, bar) = pendulum(0.4);
    let start = world.energy().total();
    let initial_angle = world.body(bar).unwrap().angle();

    for _ in 0..80 {
        world.advance(0.025).unwrap();
        assert!(pivot(&world, bar).length() < 1e-4);
    }

    assert_ne!(world.body(bar).unwrap().angle(), initial_angle);
    let end = world.energy().total();
    assert!((end - start).abs() < 1e-2 * start.abs().max(1.0), "energy {start} -> {end}");
}

#[test]
fn redundant_joints_are_a_configuration_error() {
    let (mut world, bar) = pendulum(0.0);
    world
        .add_joints(Joint::pin_to_world("again", bar, DVec2::new(0.0, 1.0), DVec2::ZERO))
        .unwrap();
    let before = world.state_vector();

    let result = world.advance(0.025);

    assert!(matches!(result, Err(PhysicsError::Configuration(_))));
    assert_eq!(world.state_vector(), before);
    assert_eq!(world.time(), 0.0);
}

#[test]
fn jointed_pair_takes_collision_together() {
    let mut world = PhysicsWorld::new();
    let mut a = make_ball("a", 0.5, 1.0);
    a.set_position(DVec2::new(-1.0, 0.0), 0.0);
    a.set_velocity(DVec2::new(1.0, 0.0), 0.0);
    let mut b = make_ball("b", 0.5, 1.0);
    b.set_position(DVec2::new(-1.0, 2.5), 0.0);
    b.set_velocity(DVec2::new(1.0, 0.0), 0.0);
    let mut wall = RigidBody::fixed("wall", Shape::block(0.5, 2.0).unwrap());
    wall.set_position(DVec2::new(1.0, 0.0), 0.0);
    let a = world.add_body(a);
    let b = world.add_body(b);
    world.add_body(wall);
    world
        .add_joint(Joint::new(
            "link",
            Anchor::on_body(a, DVec2::ZERO),
            Anchor::on_body(b, DVec2::ZERO),
            CoordType::World,
            DVec2::X,
        ))
        .unwrap();

    world.advance(1.5).unwrap();

    let va = world.body(a).unwrap().velocity.linear.x;
    let vb = world.body(b).unwrap().velocity.linear.x;
    assert_abs_diff_eq!(va, vb, epsilon = 1e-9);
    assert!(va < 0.0);
}

fn bob_on_rope(rope_kind: RopeKind, start: DVec2, length: f64) -> (PhysicsWorld, EntityId) {
    let mut world = PhysicsWorld::new();
    world.add_force_law(GravityLaw::default());
    let mut bob = make_ball("bob", 0.1, 1.0);
    bob.set_position(start, 0.0);
    let bob = world.add_body(bob);
    world
        .add_rope(Rope::new(
            "rope",
            Anchor::World(DVec2::ZERO),
            Anchor::on_body(bob, DVec2::ZERO),
            length,
            rope_kind,
        ))
        .unwrap();
    (world, bob)
}

#[test]
fn rigid_rope_keeps_a_swinging_bob_at_its_length() {
    let (mut world, bob) = bob_on_rope(RopeKind::Rigid, DVec2::new(1.0, 0.0), 1.0);
    let mut lowest: f64 = 0.0;
    for _ in 0..80 {
        world.advance(0.025).unwrap();
        let position = world.body(bob).unwrap().position();
        assert_abs_diff_eq!(position.length(), 1.0, epsilon = 1e-4);
        lowest = lowest.min(position.y);
    }
    assert!(lowest < -0.9, "bob never swung down: {lowest}");
}

#[test]
fn rigid_rope_also_resists_compression() {
    let (mut world, bob) = bob_on_rope(RopeKind::Rigid, DVec2::new(0.0, 1.0), 1.0);
    for _ in 0..40 {
        world.advance(0.025).unwrap();
    }
    let position = world.body(bob).unwrap().position();
    assert_abs_diff_eq!(position.y, 1.0, epsilon = 1e-4);
}

#[test]
fn flexible_rope_is_slack_then_catches_the_bob() {
    let (mut world, bob) = bob_on_rope(RopeKind::Flexible, DVec2::new(0.0, -1.0), 2.0);
    let tol = world.config().distance_tol;

    for _ in 0..12 {
        world.advance(0.025).unwrap();
    }
    assert_abs_diff_eq!(world.body(bob).unwrap().velocity.linear.y, -9.8 * 0.3, epsilon = 1e-9);

    let mut collisions = 0;
    for _ in 0..68 {
        collisions += world.advance(0.025).unwrap().collisions;
        let slack = world.ropes()[0].slack(world.bodies()).unwrap();
        assert!(slack >= 0.0, "rope overstretched by {}", -slack);
    }
    assert!(collisions >= 1);
    let body = world.body(bob).unwrap();
    assert_abs_diff_eq!(body.position().y, -2.0, epsilon = tol);
    assert_abs_diff_eq!(body.velocity.linear.y, 0.0, epsilon = 1e-3);
}
