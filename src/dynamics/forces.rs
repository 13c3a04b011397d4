use std::any::Any;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::{
    config::DEFAULT_GRAVITY,
    core::{connector::Anchor, rigidbody::RigidBody},
    utils::{
        allocator::{Arena, EntityId},
        math::torque,
    },
};

const MIN_SPRING_LENGTH: f64 = 1e-12;

/// A force applied to one body at a world location, plus an optional pure torque.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Force {
    pub body: EntityId,
    pub vector: DVec2,
    pub location: DVec2,
    pub torque: f64,
}

impl Force {
    pub fn at(body: EntityId, vector: DVec2, location: DVec2) -> Self {
        Self {
            body,
            vector,
            location,
            torque: 0.0,
        }
    }

    /// Total torque about `centre`.
    pub fn torque_about(&self, centre: DVec2) -> f64 {
        torque(self.location - centre, self.vector) + self.torque
    }
}

/// Trait describing a force law evaluated from the current body state only.
pub trait ForceLaw: Send + Sync {
    fn name(&self) -> &str;

    fn calculate(&self, bodies: &Arena<RigidBody>) -> Vec<Force>;

    fn potential_energy(&self, _bodies: &Arena<RigidBody>) -> f64 {
        0.0
    }
}

/// Uniform gravity along -Y applied to every movable body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GravityLaw {
    pub gravity: f64,
    pub zero_energy_level: f64,
}

impl Default for GravityLaw {
    fn default() -> Self {
        Self::new(DEFAULT_GRAVITY)
    }
}

impl GravityLaw {
    pub fn new(gravity: f64) -> Self {
        Self {
            gravity,
            zero_energy_level: 0.0,
        }
    }

    pub fn with_zero_energy_level(mut self, level: f64) -> Self {
        self.zero_energy_level = level;
        self
    }
}

impl ForceLaw for GravityLaw {
    fn name(&self) -> &str {
        "gravity"
    }

    fn calculate(&self, bodies: &Arena<RigidBody>) -> Vec<Force> {
        bodies
            .iter_with_ids()
            .filter(|(_, body)| !body.is_static())
            .map(|(id, body)| {
                Force::at(id, DVec2::new(0.0, -self.gravity * body.mass()), body.position())
            })
            .collect()
    }

    fn potential_energy(&self, bodies: &Arena<RigidBody>) -> f64 {
        bodies
            .iter()
            .filter(|body| !body.is_static())
            .map(|body| {
                let level = body.zero_energy_level().unwrap_or(self.zero_energy_level);
                body.mass() * self.gravity * (body.position().y - level)
            })
            .sum()
    }
}

/// Viscous damping of linear and angular motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampingLaw {
    pub damping: f64,
    pub rotate_ratio: f64,
}

impl DampingLaw {
    pub fn new(damping: f64, rotate_ratio: f64) -> Self {
        Self {
            damping,
            rotate_ratio,
        }
    }
}

impl ForceLaw for DampingLaw {
    fn name(&self) -> &str {
        "damping"
    }

    fn calculate(&self, bodies: &Arena<RigidBody>) -> Vec<Force> {
        if self.damping == 0.0 {
            return Vec::new();
        }
        bodies
            .iter_with_ids()
            .filter(|(_, body)| !body.is_static())
            .map(|(id, body)| Force {
                body: id,
                vector: -self.damping * body.velocity.linear,
                location: body.position(),
                torque: -self.damping * self.rotate_ratio * body.velocity.angular,
            })
            .collect()
    }
}

/// Damped spring between two anchors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    pub name: &'static str,
    pub anchor_a: Anchor,
    pub anchor_b: Anchor,
    pub rest_length: f64,
    pub stiffness: f64,
    pub damping: f64,
}

impl Spring {
    pub fn new(anchor_a: Anchor, anchor_b: Anchor, rest_length: f64, stiffness: f64) -> Self {
        Self {
            name: "spring",
            anchor_a,
            anchor_b,
            rest_length,
            stiffness,
            damping: 0.0,
        }
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Current length, or `None` if an anchor body is gone.
    pub fn length(&self, bodies: &Arena<RigidBody>) -> Option<f64> {
        let a = self.anchor_a.world_point(bodies)?;
        let b = self.anchor_b.world_point(bodies)?;
        Some(a.distance(b))
    }

    /// Force on the first anchor; the second anchor receives the opposite.
    fn force_on_a(&self, bodies: &Arena<RigidBody>) -> Option<(DVec2, DVec2, DVec2)> {
        let pa = self.anchor_a.world_point(bodies)?;
        let pb = self.anchor_b.world_point(bodies)?;
        let va = self.anchor_a.world_velocity(bodies)?;
        let vb = self.anchor_b.world_velocity(bodies)?;
        let offset = pb - pa;
        let relative_velocity = vb - va;

        let force = if self.rest_length == 0.0 {
            self.stiffness * offset + self.damping * relative_velocity
        } else {
            let length = offset.length();
            if length < MIN_SPRING_LENGTH {
                return Some((DVec2::ZERO, pa, pb));
            }
            let unit = offset / length;
            let stretch = self.stiffness * (length - self.rest_length);
            let damping = self.damping * relative_velocity.dot(unit);
            unit * (stretch + damping)
        };
        Some((force, pa, pb))
    }
}

impl ForceLaw for Spring {
    fn name(&self) -> &str {
        self.name
    }

    fn calculate(&self, bodies: &Arena<RigidBody>) -> Vec<Force> {
        let Some((force, pa, pb)) = self.force_on_a(bodies) else {
            return Vec::new();
        };
        let mut forces = Vec::with_capacity(2);
        if let Some(body) = self.anchor_a.body() {
            forces.push(Force::at(body, force, pa));
        }
        if let Some(body) = self.anchor_b.body() {
            forces.push(Force::at(body, -force, pb));
        }
        forces
    }

    fn potential_energy(&self, bodies: &Arena<RigidBody>) -> f64 {
        self.length(bodies).map_or(0.0, |length| {
            let stretch = length - self.rest_length;
            0.5 * self.stiffness * stretch * stretch
        })
    }
}

/// Single thruster in body coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thruster {
    pub location: DVec2,
    pub direction: DVec2,
    pub active: bool,
}

/// Switchable thrusters attached to one body, sharing a magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrusterSet {
    pub body: EntityId,
    pub magnitude: f64,
    thrusters: Vec<Thruster>,
}

impl ThrusterSet {
    pub fn new(body: EntityId, magnitude: f64) -> Self {
        Self {
            body,
            magnitude,
            thrusters: Vec::new(),
        }
    }

    /// Adds an inactive thruster and returns its index.
    pub fn add_thruster(&mut self, location: DVec2, direction: DVec2) -> usize {
        self.thrusters.push(Thruster {
            location,
            direction: direction.normalize_or_zero(),
            active: false,
        });
        self.thrusters.len() - 1
    }

    pub fn set_active(&mut self, index: usize, active: bool) {
        if let Some(thruster) = self.thrusters.get_mut(index) {
            thruster.active = active;
        }
    }

    pub fn thrusters(&self) -> &[Thruster] {
        &self.thrusters
    }
}

impl ForceLaw for ThrusterSet {
    fn name(&self) -> &str {
        "thrusters"
    }

    fn calculate(&self, bodies: &Arena<RigidBody>) -> Vec<Force> {
        let Some(body) = bodies.get(self.body) else {
            return Vec::new();
        };
        self.thrusters
            .iter()
            .filter(|t| t.active)
            .map(|t| {
                Force::at(
                    self.body,
                    body.rotate_body_to_world(t.direction) * self.magnitude,
                    body.body_to_world(t.location),
                )
            })
            .collect()
    }
}

/// Handle to a law held by a [`ForceRegistry`]. Stays valid until the law is
/// removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForceLawHandle(EntityId);

/// Object-safe view of a registered law that can be downcast back to its type.
trait StoredLaw: ForceLaw {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: ForceLaw + 'static> StoredLaw for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Collection of force laws evaluated on every derivative evaluation.
#[derive(Default)]
pub struct ForceRegistry {
    laws: Arena<Box<dyn StoredLaw>>,
}

impl ForceRegistry {
    pub fn new() -> Self {
        Self { laws: Arena::new() }
    }

    pub fn add<F: ForceLaw + 'static>(&mut self, law: F) -> ForceLawHandle {
        ForceLawHandle(self.laws.insert(Box::new(law)))
    }

    /// The law behind `handle`, if it is still registered and is an `F`.
    pub fn get<F: ForceLaw + 'static>(&self, handle: ForceLawHandle) -> Option<&F> {
        (**self.laws.get(handle.0)?).as_any().downcast_ref()
    }

    pub fn get_mut<F: ForceLaw + 'static>(&mut self, handle: ForceLawHandle) -> Option<&mut F> {
        (**self.laws.get_mut(handle.0)?).as_any_mut().downcast_mut()
    }

    /// Unregisters a law. Returns `false` if the handle was already stale.
    pub fn remove(&mut self, handle: ForceLawHandle) -> bool {
        self.laws.remove(handle.0).is_some()
    }

    pub fn len(&self) -> usize {
        self.laws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.laws.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.laws.iter().map(|law| law.name())
    }

    pub fn calculate_all(&self, bodies: &Arena<RigidBody>) -> Vec<Force> {
        self.laws
            .iter()
            .flat_map(|law| law.calculate(bodies))
            .collect()
    }

    pub fn potential_energy(&self, bodies: &Arena<RigidBody>) -> f64 {
        self.laws.iter().map(|law| law.potential_energy(bodies)).sum()
    }
}

impl std::fmt::Debug for ForceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shape::Shape;

    fn single_body(body: RigidBody) -> (Arena<RigidBody>, EntityId) {
        let mut bodies = Arena::new();
        let id = bodies.insert(body);
        (bodies, id)
    }

    #[test]
    fn gravity_skips_static_bodies() {
        let mut bodies = Arena::new();
        let ball = bodies.insert(RigidBody::new("ball", Shape::circle(0.5), 2.0));
        bodies.insert(RigidBody::fixed("floor", Shape::block(4.0, 1.0).unwrap()));
        let forces = GravityLaw::default().calculate(&bodies);
        assert_eq!(forces.len(), 1);
        assert_eq!(forces[0].body, ball);
        assert!((forces[0].vector.y + 19.6).abs() < 1e-12);
    }

    #[test]
    fn gravity_energy_uses_body_level_override() {
        let mut body = RigidBody::new("ball", Shape::circle(0.5), 1.0);
        body.set_position(DVec2::new(0.0, 3.0), 0.0);
        body.set_zero_energy_level(Some(1.0));
        let (bodies, _) = single_body(body);
        let law = GravityLaw::new(10.0).with_zero_energy_level(-5.0);
        assert!((law.potential_energy(&bodies) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn stretched_spring_pulls_body_toward_anchor() {
        let mut body = RigidBody::new("bob", Shape::circle(0.1), 1.0);
        body.set_position(DVec2::new(3.0, 0.0), 0.0);
        let (bodies, id) = single_body(body);
        let spring = Spring::new(
            Anchor::on_body(id, DVec2::ZERO),
            Anchor::World(DVec2::ZERO),
            1.0,
            5.0,
        );
        let forces = spring.calculate(&bodies);
        assert_eq!(forces.len(), 1);
        assert!((forces[0].vector - DVec2::new(-10.0, 0.0)).length() < 1e-12);
        assert!((spring.potential_energy(&bodies) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn zero_rest_length_uses_full_displacement() {
        let mut body = RigidBody::new("bob", Shape::circle(0.1), 1.0);
        body.set_position(DVec2::new(1.0, 2.0), 0.0);
        let (bodies, id) = single_body(body);
        let spring = Spring::new(
            Anchor::on_body(id, DVec2::ZERO),
            Anchor::World(DVec2::ZERO),
            0.0,
            2.0,
        );
        let forces = spring.calculate(&bodies);
        assert!((forces[0].vector - DVec2::new(-2.0, -4.0)).length() < 1e-12);
    }

    #[test]
    fn spring_damping_opposes_relative_motion() {
        let mut body = RigidBody::new("bob", Shape::circle(0.1), 1.0);
        body.set_position(DVec2::new(2.0, 0.0), 0.0);
        body.set_velocity(DVec2::new(1.0, 0.0), 0.0);
        let (bodies, id) = single_body(body);
        let spring = Spring::new(
            Anchor::on_body(id, DVec2::ZERO),
            Anchor::World(DVec2::ZERO),
            2.0,
            5.0,
        )
        .with_damping(0.5);
        let forces = spring.calculate(&bodies);
        assert!((forces[0].vector - DVec2::new(-0.5, 0.0)).length() < 1e-12);
    }

    #[test]
    fn damping_law_applies_rotational_ratio() {
        let mut body = RigidBody::new("spinner", Shape::circle(1.0), 1.0);
        body.set_velocity(DVec2::new(2.0, 0.0), 3.0);
        let (bodies, _) = single_body(body);
        let forces = DampingLaw::new(0.5, 2.0).calculate(&bodies);
        assert!((forces[0].vector - DVec2::new(-1.0, 0.0)).length() < 1e-12);
        assert!((forces[0].torque + 3.0).abs() < 1e-12);
    }

    #[test]
    fn only_active_thrusters_push() {
        let mut body = RigidBody::new("ship", Shape::circle(1.0), 1.0);
        body.set_position(DVec2::ZERO, std::f64::consts::FRAC_PI_2);
        let (bodies, id) = single_body(body);
        let mut thrusters = ThrusterSet::new(id, 3.0);
        let main = thrusters.add_thruster(DVec2::new(-1.0, 0.0), DVec2::X);
        thrusters.add_thruster(DVec2::new(0.0, 1.0), DVec2::X);
        assert!(thrusters.calculate(&bodies).is_empty());

        thrusters.set_active(main, true);
        let forces = thrusters.calculate(&bodies);
        assert_eq!(forces.len(), 1);
        assert!((forces[0].vector - DVec2::new(0.0, 3.0)).length() < 1e-12);
        assert!(forces[0].torque_about(DVec2::ZERO).abs() < 1e-12);
    }

    #[test]
    fn registry_hands_back_typed_laws_until_removed() {
        let (bodies, id) = single_body(RigidBody::new("ship", Shape::circle(1.0), 1.0));
        let mut registry = ForceRegistry::new();
        let gravity = registry.add(GravityLaw::default());
        let engines = registry.add(ThrusterSet::new(id, 2.0));
        assert!(registry.get::<GravityLaw>(engines).is_none());
        assert!((registry.get::<GravityLaw>(gravity).unwrap().gravity - 9.8).abs() < 1e-12);

        let thrusters = registry.get_mut::<ThrusterSet>(engines).unwrap();
        let main = thrusters.add_thruster(DVec2::ZERO, DVec2::Y);
        thrusters.set_active(main, true);
        assert_eq!(registry.calculate_all(&bodies).len(), 2);

        assert!(registry.remove(gravity));
        assert!(!registry.remove(gravity));
        assert!(registry.get::<GravityLaw>(gravity).is_none());
        assert_eq!(registry.len(), 1);
        let forces = registry.calculate_all(&bodies);
        assert!((forces[0].vector - DVec2::new(0.0, 2.0)).length() < 1e-12);
    }
}
