use approx::assert_abs_diff_eq;
use rigid2d::*;

fn head_on_pair(elasticity: f64) -> (PhysicsWorld, EntityId, EntityId) {
    let mut world = PhysicsWorld::new();
    let mut a = make_ball("a", 0.5, 1.0);
    a.set_position(DVec2::new(-2.0, 0.0), 0.0);
    a.set_velocity(DVec2::new(1.0, 0.0), 0.0);
    let mut b = make_ball("b", 0.5, 1.0);
    b.set_position(DVec2::new(2.0, 0.0), 0.0);
    b.set_velocity(DVec2::new(-1.0, 0.0), 0.0);
    let a = world.add_body(a);
    let b = world.add_body(b);
    world.set_elasticity(elasticity);
    (world, a, b)
}

#[test]
fn elastic_head_on_collision_reverses_both_balls() {
    let (mut world, a, b) = head_on_pair(1.0);
    let report = world.advance(2.0).expect("step should succeed");

    assert_eq!(report.collisions, 1);
    assert_abs_diff_eq!(world.time(), 2.0, epsilon = 1e-12);
    let ball_a = world.body(a).unwrap();
    let ball_b = world.body(b).unwrap();
    assert_abs_diff_eq!(ball_a.velocity.linear.x, -1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(ball_b.velocity.linear.x, 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(ball_a.position().x, -1.0, epsilon = 0.01);
    assert_abs_diff_eq!(ball_b.position().x, 1.0, epsilon = 0.01);
}

#[test]
fn collision_is_found_across_many_small_steps() {
    let (mut world, a, _) = head_on_pair(1.0);
    let mut collisions = 0;
    for _ in 0..80 {
        collisions += world.advance(0.025).unwrap().collisions;
        assert!(!world.contacts().has_penetration());
    }
    assert_eq!(collisions, 1);
    assert_abs_diff_eq!(world.body(a).unwrap().position().x, -1.0, epsilon = 0.01);
}

#[test]
fn inelastic_collision_stops_equal_masses() {
    let (mut world, a, b) = head_on_pair(0.0);
    world.advance(2.0).unwrap();
    assert_abs_diff_eq!(world.body(a).unwrap().velocity.linear.x, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(world.body(b).unwrap().velocity.linear.x, 0.0, epsilon = 1e-9);
    assert!(!world.contacts().has_penetration());
}

#[test]
fn heavy_ball_keeps_moving_after_hitting_light_one() {
    let mut world = PhysicsWorld::new();
    let mut heavy = make_ball("heavy", 0.5, 3.0);
    heavy.set_position(DVec2::new(-2.0, 0.0), 0.0);
    heavy.set_velocity(DVec2::new(2.0, 0.0), 0.0);
    let light = make_ball("light", 0.5, 1.0);
    let heavy = world.add_body(heavy);
    let light = world.add_body(light);

    world.advance(1.0).unwrap();

    let vh = world.body(heavy).unwrap().velocity.linear.x;
    let vl = world.body(light).unwrap().velocity.linear.x;
    assert_abs_diff_eq!(3.0 * vh + vl, 6.0, epsilon = 1e-9);
    assert_abs_diff_eq!(vh, 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(vl, 3.0, epsilon = 1e-9);
}

#[test]
fn ball_bounces_inside_walls_without_penetrating() {
    let mut world = PhysicsWorld::new();
    let walls = Walls::enclose(DVec2::new(-3.0, 0.0), DVec2::new(3.0, 4.0), 0.5).unwrap();
    let floor = walls.zero_energy_level;
    world.add_walls(walls);
    world.add_force_law(GravityLaw::default().with_zero_energy_level(floor));
    let mut ball = make_ball("ball", 0.25, 1.0);
    ball.set_position(DVec2::new(0.3, 2.0), 0.0);
    ball.set_velocity(DVec2::new(1.5, 0.0), 0.0);
    let ball = world.add_body(ball);

    let start = world.energy().total();
    let mut collisions = 0;
    for _ in 0..80 {
        collisions += world.advance(0.025).unwrap().collisions;
        assert!(!world.contacts().has_penetration());
        let position = world.body(ball).unwrap().position();
        assert!(position.y > 0.2 && position.y < 3.8, "escaped at {position}");
        assert!(position.x > -2.8 && position.x < 2.8, "escaped at {position}");
    }
    assert!(collisions >= 1);
    let end = world.energy().total();
    assert!((end - start).abs() < 0.05 * start, "energy {start} -> {end}");
}

#[test]
fn spinning_block_hits_wall_and_rebounds() {
    let mut world = PhysicsWorld::new();
    let mut wall = RigidBody::fixed("wall", Shape::block(0.5, 6.0).unwrap());
    wall.set_position(DVec2::new(3.0, 0.0), 0.0);
    world.add_body(wall);
    let mut block = make_block("block", 1.0, 0.5, 1.0).unwrap();
    block.set_velocity(DVec2::new(2.0, 0.0), 0.4);
    let block = world.add_body(block);

    let start = world.energy().kinetic();
    let mut collisions = 0;
    for _ in 0..60 {
        collisions += world.advance(0.025).unwrap().collisions;
        assert!(!world.contacts().has_penetration());
        assert!(world.body(block).unwrap().position().x < 2.75);
    }
    assert!(collisions >= 1);
    assert!(world.energy().kinetic() <= start * (1.0 + 1e-6));
}

#[test]
fn slow_elastic_collision_keeps_its_speed() {
    let mut world = PhysicsWorld::new();
    let mut ids = Vec::new();
    for (name, x, v) in [("a", -1.0, 0.2), ("b", 1.0, -0.2)] {
        let mut ball = make_ball(name, 0.5, 1.0);
        ball.set_position(DVec2::new(x, 0.0), 0.0);
        ball.set_velocity(DVec2::new(v, 0.0), 0.0);
        ids.push(world.add_body(ball));
    }

    let mut collisions = 0;
    for _ in 0..200 {
        collisions += world.advance(0.025).unwrap().collisions;
    }

    assert_eq!(collisions, 1);
    assert_abs_diff_eq!(world.body(ids[0]).unwrap().velocity.linear.x, -0.2, epsilon = 1e-9);
    assert_abs_diff_eq!(world.body(ids[1]).unwrap().velocity.linear.x, 0.2, epsilon = 1e-9);
}

/// A moving ball about to strike two balls that already touch.
fn ball_into_touching_pair(handling: CollisionHandling) -> (PhysicsWorld, [EntityId; 3]) {
    let mut world = PhysicsWorld::new();
    world.set_collision_handling(handling);
    let rest = world.config().resting_gap();
    let mut striker = make_ball("striker", 0.5, 1.0);
    striker.set_position(DVec2::new(-2.0, 0.0), 0.0);
    striker.set_velocity(DVec2::new(1.0, 0.0), 0.0);
    let mut middle = make_ball("middle", 0.5, 1.0);
    middle.set_position(DVec2::ZERO, 0.0);
    let mut end = make_ball("end", 0.5, 1.0);
    end.set_position(DVec2::new(1.0 + rest, 0.0), 0.0);
    let ids = [
        world.add_body(striker),
        world.add_body(middle),
        world.add_body(end),
    ];
    (world, ids)
}

fn run_and_read_velocities(world: &mut PhysicsWorld, ids: [EntityId; 3]) -> [f64; 3] {
    for _ in 0..80 {
        world.advance(0.025).unwrap();
        assert!(!world.contacts().has_penetration());
    }
    ids.map(|id| world.body(id).unwrap().velocity.linear.x)
}

#[test]
fn serial_handling_passes_the_strike_down_the_line() {
    let (mut world, ids) = ball_into_touching_pair(CollisionHandling::Serial);
    let v = run_and_read_velocities(&mut world, ids);
    assert_abs_diff_eq!(v[0], 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(v[1], 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(v[2], 1.0, epsilon = 1e-3);
}

#[test]
fn simultaneous_and_grouped_handling_share_the_strike() {
    for handling in [CollisionHandling::Simultaneous, CollisionHandling::SerialGrouped] {
        let (mut world, ids) = ball_into_touching_pair(handling);
        let v = run_and_read_velocities(&mut world, ids);
        assert_abs_diff_eq!(v[0], -1.0 / 3.0, epsilon = 1e-3);
        assert_abs_diff_eq!(v[1], 2.0 / 3.0, epsilon = 1e-3);
        assert_abs_diff_eq!(v[2], 2.0 / 3.0, epsilon = 1e-3);
        assert_abs_diff_eq!(world.energy().kinetic(), 0.5, epsilon = 1e-3);
    }
}

fn stuck_stage(config: SimConfig) -> (&'static str, PhysicsWorld, Vec<f64>) {
    let (mut world, _, _) = head_on_pair(1.0);
    world.set_config(config);
    let before = world.state_vector();
    let err = world.advance(2.0).unwrap_err();
    assert!(err.is_stuck(), "{err}");
    let PhysicsError::CollisionSearchExceeded { stage, .. } = err else {
        unreachable!()
    };
    (stage, world, before)
}

#[test]
fn exhausted_search_budget_reports_where_it_stuck() {
    let (stage, world, before) = stuck_stage(SimConfig::default().with_max_collision_search(0));
    assert_eq!(stage, "collision search");
    assert_eq!(world.state_vector(), before);

    let (stage, world, before) = stuck_stage(SimConfig::default().with_max_collision_search(1));
    assert_eq!(stage, "collision bisection");
    assert_eq!(world.state_vector(), before);
    assert_eq!(world.time(), 0.0);

    let no_bisection = SimConfig {
        min_bisection_interval: 10.0,
        ..SimConfig::default().with_max_collision_search(1)
    };
    let (stage, world, before) = stuck_stage(no_bisection);
    assert_eq!(stage, "collision impact");
    assert_eq!(world.state_vector(), before);
}
