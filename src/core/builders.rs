//! Convenience constructors for common bodies and enclosing walls.

use glam::DVec2;

use super::{rigidbody::RigidBody, shape::Shape};
use crate::error::Result;

pub fn make_block(name: &str, width: f64, height: f64, mass: f64) -> Result<RigidBody> {
    Ok(RigidBody::new(name, Shape::block(width, height)?, mass))
}

pub fn make_ball(name: &str, radius: f64, mass: f64) -> RigidBody {
    RigidBody::new(name, Shape::circle(radius), mass)
}

pub fn make_regular_polygon(name: &str, sides: usize, radius: f64, mass: f64) -> Result<RigidBody> {
    Ok(RigidBody::new(name, Shape::regular_polygon(sides, radius)?, mass))
}

/// Four immovable walls whose inner faces bound a rectangle.
#[derive(Debug, Clone)]
pub struct Walls {
    pub bodies: Vec<RigidBody>,
    /// Height of the floor's top face, a natural zero for potential energy.
    pub zero_energy_level: f64,
}

impl Walls {
    pub fn enclose(min: DVec2, max: DVec2, thickness: f64) -> Result<Self> {
        let width = max.x - min.x;
        let height = max.y - min.y;
        let center = 0.5 * (min + max);
        let half_t = 0.5 * thickness;
        let long_w = width + 2.0 * thickness;

        let mut floor = RigidBody::fixed("wall_bottom", Shape::block(long_w, thickness)?);
        floor.set_position(DVec2::new(center.x, min.y - half_t), 0.0);
        let mut ceiling = RigidBody::fixed("wall_top", Shape::block(long_w, thickness)?);
        ceiling.set_position(DVec2::new(center.x, max.y + half_t), 0.0);
        let mut left = RigidBody::fixed("wall_left", Shape::block(thickness, height)?);
        left.set_position(DVec2::new(min.x - half_t, center.y), 0.0);
        let mut right = RigidBody::fixed("wall_right", Shape::block(thickness, height)?);
        right.set_position(DVec2::new(max.x + half_t, center.y), 0.0);

        Ok(Self {
            bodies: vec![floor, ceiling, left, right],
            zero_energy_level: min.y,
        })
    }
}
