use glam::DVec2;

use super::{
    shape::Shape,
    types::{MassProperties, Transform, Velocity},
};
use crate::{config::DEFAULT_ELASTICITY, utils::allocator::EntityId};

/// Rigid body: kinematic state, mass properties and geometry.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub id: EntityId,
    name: String,
    pub transform: Transform,
    pub velocity: Velocity,
    mass_properties: MassProperties,
    shape: Shape,
    elasticity: f64,
    drag_points: Vec<DVec2>,
    zero_energy_level: Option<f64>,
}

impl RigidBody {
    /// Creates a body of uniform density whose moment follows from its shape.
    pub fn new(name: &str, shape: Shape, mass: f64) -> Self {
        let moment = mass * shape.moment_per_mass();
        Self {
            id: EntityId::default(),
            name: name.to_uppercase(),
            transform: Transform::default(),
            velocity: Velocity::default(),
            mass_properties: MassProperties { mass, moment },
            shape,
            elasticity: DEFAULT_ELASTICITY,
            drag_points: vec![DVec2::ZERO],
            zero_energy_level: None,
        }
    }

    /// Creates an immovable body, such as a wall.
    pub fn fixed(name: &str, shape: Shape) -> Self {
        let mut body = Self::new(name, shape, 1.0);
        body.mass_properties = MassProperties::infinite();
        body
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_equals(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_static(&self) -> bool {
        !self.mass_properties.mass.is_finite()
    }

    pub fn mass(&self) -> f64 {
        self.mass_properties.mass
    }

    /// Changes the mass, scaling the moment of inertia with it.
    pub fn set_mass(&mut self, mass: f64) {
        if self.is_static() || !mass.is_finite() {
            self.mass_properties = MassProperties {
                mass,
                moment: mass * self.shape.moment_per_mass(),
            };
            return;
        }
        let ratio = mass / self.mass_properties.mass;
        self.mass_properties.mass = mass;
        self.mass_properties.moment *= ratio;
    }

    pub fn moment_about_cm(&self) -> f64 {
        self.mass_properties.moment
    }

    pub fn set_moment(&mut self, moment: f64) {
        self.mass_properties.moment = moment;
    }

    pub fn mass_properties(&self) -> MassProperties {
        self.mass_properties
    }

    pub fn inverse_mass(&self) -> f64 {
        self.mass_properties.inverse_mass()
    }

    pub fn inverse_moment(&self) -> f64 {
        self.mass_properties.inverse_moment()
    }

    pub fn elasticity(&self) -> f64 {
        self.elasticity
    }

    /// Sets the coefficient of restitution, clamped to `[0, 1]`.
    pub fn set_elasticity(&mut self, elasticity: f64) {
        self.elasticity = elasticity.clamp(0.0, 1.0);
    }

    pub fn drag_points(&self) -> &[DVec2] {
        &self.drag_points
    }

    pub fn set_drag_points(&mut self, points: Vec<DVec2>) {
        self.drag_points = points;
    }

    pub fn zero_energy_level(&self) -> Option<f64> {
        self.zero_energy_level
    }

    pub fn set_zero_energy_level(&mut self, level: Option<f64>) {
        self.zero_energy_level = level;
    }

    pub fn position(&self) -> DVec2 {
        self.transform.position
    }

    pub fn angle(&self) -> f64 {
        self.transform.angle()
    }

    pub fn set_position(&mut self, position: DVec2, angle: f64) {
        self.transform.position = position;
        self.transform.set_angle(angle);
    }

    pub fn set_velocity(&mut self, linear: DVec2, angular: f64) {
        self.velocity.linear = linear;
        self.velocity.angular = angular;
    }

    pub fn body_to_world(&self, local: DVec2) -> DVec2 {
        self.transform.apply(local)
    }

    pub fn world_to_body(&self, world: DVec2) -> DVec2 {
        self.transform.inverse_apply(world)
    }

    pub fn rotate_body_to_world(&self, v: DVec2) -> DVec2 {
        self.transform.rotate(v)
    }

    pub fn rotate_world_to_body(&self, v: DVec2) -> DVec2 {
        self.transform.unrotate(v)
    }

    /// Velocity of the material point currently at `world`.
    pub fn velocity_at(&self, world: DVec2) -> DVec2 {
        let r = world - self.transform.position;
        self.velocity.linear + r.perp() * self.velocity.angular
    }

    pub fn contains_world_point(&self, world: DVec2) -> bool {
        self.shape.contains(self.world_to_body(world))
    }

    pub fn world_vertices(&self) -> Vec<DVec2> {
        match &self.shape {
            Shape::Circle { .. } => vec![self.transform.position],
            Shape::Polygon(polygon) => polygon
                .vertices()
                .iter()
                .map(|v| self.body_to_world(*v))
                .collect(),
        }
    }

    pub fn translational_energy(&self) -> f64 {
        if self.is_static() {
            return 0.0;
        }
        0.5 * self.mass_properties.mass * self.velocity.linear.length_squared()
    }

    pub fn rotational_energy(&self) -> f64 {
        if self.is_static() {
            return 0.0;
        }
        0.5 * self.mass_properties.moment * self.velocity.angular * self.velocity.angular
    }
}
