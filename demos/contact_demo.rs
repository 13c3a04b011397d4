use rigid2d::*;

fn main() -> Result<()> {
    let mut world = PhysicsWorld::new();
    let walls = Walls::enclose(DVec2::new(-4.0, 0.0), DVec2::new(4.0, 5.0), 0.5)?;
    let floor = walls.zero_energy_level;
    world.add_walls(walls);
    world.add_force_law(GravityLaw::default().with_zero_energy_level(floor));

    let rest = world.config().resting_gap();
    let mut block = make_block("block", 1.0, 1.0, 2.0)?;
    block.set_position(DVec2::new(-1.0, 0.5 + rest), 0.0);
    world.add_body(block);

    let mut ball = make_ball("ball", 0.3, 1.0);
    ball.set_position(DVec2::new(1.0, 3.0), 0.0);
    ball.set_velocity(DVec2::new(-1.0, 0.0), 0.0);
    world.add_body(ball);

    world.add_post_step_hook(|report, _| {
        for impulse in &report.impulses {
            println!(
                "t={:.3} impulse {:.3} at ({:.3}, {:.3})",
                report.time, impulse.impulse, impulse.point.x, impulse.point.y
            );
        }
    });

    for _ in 0..200 {
        world.advance(DEFAULT_TIME_STEP)?;
    }

    let energy = world.energy();
    println!("t={:.2} total energy {:.4}", world.time(), energy.total());
    for contact in world.contacts().iter() {
        println!(
            "contact {:?} / {:?} gap {:.4}",
            contact.body_a, contact.body_b, contact.distance
        );
    }
    Ok(())
}
