use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::rigidbody::RigidBody;
use crate::utils::allocator::{Arena, EntityId};

/// One end of a joint, rope or spring: a point fixed on a body, or a point fixed in
/// the immovable world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Anchor {
    World(DVec2),
    Body { body: EntityId, local: DVec2 },
}

impl Anchor {
    pub fn on_body(body: EntityId, local: DVec2) -> Self {
        Anchor::Body { body, local }
    }

    pub fn body(&self) -> Option<EntityId> {
        match self {
            Anchor::World(_) => None,
            Anchor::Body { body, .. } => Some(*body),
        }
    }

    /// Current world position, or `None` if the body no longer exists.
    pub fn world_point(&self, bodies: &Arena<RigidBody>) -> Option<DVec2> {
        match self {
            Anchor::World(point) => Some(*point),
            Anchor::Body { body, local } => bodies.get(*body).map(|b| b.body_to_world(*local)),
        }
    }

    pub fn world_velocity(&self, bodies: &Arena<RigidBody>) -> Option<DVec2> {
        match self {
            Anchor::World(_) => Some(DVec2::ZERO),
            Anchor::Body { body, local } => bodies
                .get(*body)
                .map(|b| b.velocity_at(b.body_to_world(*local))),
        }
    }
}

/// Frame in which a joint normal is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CoordType {
    /// Fixed in the frame of the joint's second anchor body; rotates with it.
    Body,
    #[default]
    World,
}

/// Persistent bilateral constraint: the two anchor points have zero relative
/// velocity and acceleration along the normal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub anchor_a: Anchor,
    pub anchor_b: Anchor,
    pub normal: DVec2,
    pub normal_type: CoordType,
}

impl Joint {
    pub fn new(
        name: &str,
        anchor_a: Anchor,
        anchor_b: Anchor,
        normal_type: CoordType,
        normal: DVec2,
    ) -> Self {
        Self {
            name: name.to_uppercase(),
            anchor_a,
            anchor_b,
            normal: normal.normalize_or_zero(),
            normal_type,
        }
    }

    /// Two perpendicular joints that pin `anchor_a` to `anchor_b`.
    pub fn attach_rigid_body(
        name: &str,
        anchor_a: Anchor,
        anchor_b: Anchor,
        normal_type: CoordType,
    ) -> [Joint; 2] {
        [
            Joint::new(&format!("{name}_x"), anchor_a, anchor_b, normal_type, DVec2::X),
            Joint::new(&format!("{name}_y"), anchor_a, anchor_b, normal_type, DVec2::Y),
        ]
    }

    /// Pins a body point to a fixed world point.
    pub fn pin_to_world(name: &str, body: EntityId, local: DVec2, world: DVec2) -> [Joint; 2] {
        Self::attach_rigid_body(
            name,
            Anchor::on_body(body, local),
            Anchor::World(world),
            CoordType::World,
        )
    }

    pub fn bodies(&self) -> (Option<EntityId>, Option<EntityId>) {
        (self.anchor_a.body(), self.anchor_b.body())
    }

    /// World-frame unit normal.
    pub fn world_normal(&self, bodies: &Arena<RigidBody>) -> DVec2 {
        match (self.normal_type, self.anchor_b) {
            (CoordType::Body, Anchor::Body { body, .. }) => bodies
                .get(body)
                .map(|b| b.rotate_body_to_world(self.normal))
                .unwrap_or(self.normal),
            _ => self.normal,
        }
    }

    /// Separation of the anchors along the normal.
    pub fn gap(&self, bodies: &Arena<RigidBody>) -> Option<f64> {
        let a = self.anchor_a.world_point(bodies)?;
        let b = self.anchor_b.world_point(bodies)?;
        Some((a - b).dot(self.world_normal(bodies)))
    }
}

/// Whether a rope resists compression as well as stretching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RopeKind {
    /// Goes slack when the ends move closer than `length`.
    #[default]
    Flexible,
    /// Holds the ends exactly `length` apart.
    Rigid,
}

/// Distance constraint between two anchors. A rigid rope is an equality
/// constraint; a flexible one only pulls, and only while taut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rope {
    pub name: String,
    pub anchor_a: Anchor,
    pub anchor_b: Anchor,
    pub length: f64,
    pub kind: RopeKind,
    /// Restitution used when a flexible rope snaps taut.
    pub elasticity: f64,
}

impl Rope {
    pub fn new(
        name: &str,
        anchor_a: Anchor,
        anchor_b: Anchor,
        length: f64,
        kind: RopeKind,
    ) -> Self {
        Self {
            name: name.to_uppercase(),
            anchor_a,
            anchor_b,
            length,
            kind,
            elasticity: 0.0,
        }
    }

    pub fn flexible(name: &str, anchor_a: Anchor, anchor_b: Anchor, length: f64) -> Self {
        Self::new(name, anchor_a, anchor_b, length, RopeKind::Flexible)
    }

    pub fn rigid(name: &str, anchor_a: Anchor, anchor_b: Anchor, length: f64) -> Self {
        Self::new(name, anchor_a, anchor_b, length, RopeKind::Rigid)
    }

    pub fn with_elasticity(mut self, elasticity: f64) -> Self {
        self.elasticity = elasticity;
        self
    }

    pub fn is_rigid(&self) -> bool {
        self.kind == RopeKind::Rigid
    }

    pub fn bodies(&self) -> (Option<EntityId>, Option<EntityId>) {
        (self.anchor_a.body(), self.anchor_b.body())
    }

    /// Current distance between the anchors.
    pub fn span(&self, bodies: &Arena<RigidBody>) -> Option<f64> {
        let a = self.anchor_a.world_point(bodies)?;
        let b = self.anchor_b.world_point(bodies)?;
        Some(a.distance(b))
    }

    /// `length - span`: positive while slack, negative when overstretched.
    pub fn slack(&self, bodies: &Arena<RigidBody>) -> Option<f64> {
        self.span(bodies).map(|span| self.length - span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shape::Shape;

    #[test]
    fn body_normal_rotates_with_second_body() {
        let mut bodies = Arena::new();
        let mut body = RigidBody::new("b", Shape::circle(0.5), 1.0);
        body.set_position(DVec2::ZERO, std::f64::consts::FRAC_PI_2);
        let id = bodies.insert(body);

        let joint = Joint::new(
            "j",
            Anchor::World(DVec2::new(0.0, 1.0)),
            Anchor::on_body(id, DVec2::ZERO),
            CoordType::Body,
            DVec2::X,
        );
        let normal = joint.world_normal(&bodies);
        assert!((normal - DVec2::Y).length() < 1e-12);
        assert!((joint.gap(&bodies).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pin_creates_perpendicular_pair() {
        let [jx, jy] = Joint::pin_to_world("pin", EntityId::from_index(0), DVec2::ZERO, DVec2::ONE);
        assert_eq!(jx.normal.dot(jy.normal), 0.0);
        assert_eq!(jx.name, "PIN_X");
    }

    #[test]
    fn rope_slack_measures_against_length() {
        let mut bodies = Arena::new();
        let mut body = RigidBody::new("b", Shape::circle(0.1), 1.0);
        body.set_position(DVec2::new(0.0, -1.5), 0.0);
        let id = bodies.insert(body);
        let rope = Rope::flexible(
            "line",
            Anchor::World(DVec2::ZERO),
            Anchor::on_body(id, DVec2::ZERO),
            2.0,
        );
        assert!(!rope.is_rigid());
        assert_eq!(rope.name, "LINE");
        assert!((rope.slack(&bodies).unwrap() - 0.5).abs() < 1e-12);
    }
}
