use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Position of the centre of mass plus orientation, with the angle's sine and
/// cosine cached for the body/world transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "TransformRepr", into = "TransformRepr")]
pub struct Transform {
    pub position: DVec2,
    angle: f64,
    sin_angle: f64,
    cos_angle: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(DVec2::ZERO, 0.0)
    }
}

impl Transform {
    pub fn new(position: DVec2, angle: f64) -> Self {
        let (sin_angle, cos_angle) = angle.sin_cos();
        Self {
            position,
            angle,
            sin_angle,
            cos_angle,
        }
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn set_angle(&mut self, angle: f64) {
        if angle != self.angle {
            self.angle = angle;
            let (s, c) = angle.sin_cos();
            self.sin_angle = s;
            self.cos_angle = c;
        }
    }

    /// Rotates a body-frame vector into the world frame.
    pub fn rotate(&self, v: DVec2) -> DVec2 {
        DVec2::new(
            self.cos_angle * v.x - self.sin_angle * v.y,
            self.sin_angle * v.x + self.cos_angle * v.y,
        )
    }

    /// Rotates a world-frame vector into the body frame.
    pub fn unrotate(&self, v: DVec2) -> DVec2 {
        DVec2::new(
            self.cos_angle * v.x + self.sin_angle * v.y,
            -self.sin_angle * v.x + self.cos_angle * v.y,
        )
    }

    pub fn apply(&self, local: DVec2) -> DVec2 {
        self.position + self.rotate(local)
    }

    pub fn inverse_apply(&self, world: DVec2) -> DVec2 {
        self.unrotate(world - self.position)
    }
}

#[derive(Serialize, Deserialize)]
struct TransformRepr {
    position: DVec2,
    angle: f64,
}

impl From<TransformRepr> for Transform {
    fn from(repr: TransformRepr) -> Self {
        Transform::new(repr.position, repr.angle)
    }
}

impl From<Transform> for TransformRepr {
    fn from(transform: Transform) -> Self {
        TransformRepr {
            position: transform.position,
            angle: transform.angle,
        }
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: DVec2,
    pub angular: f64,
}

impl Velocity {
    pub fn new(linear: DVec2, angular: f64) -> Self {
        Self { linear, angular }
    }
}

/// Mass and moment of inertia about the centre of mass. Infinite mass marks an
/// immovable body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub moment: f64,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            moment: 1.0,
        }
    }
}

impl MassProperties {
    pub fn infinite() -> Self {
        Self {
            mass: f64::INFINITY,
            moment: f64::INFINITY,
        }
    }

    pub fn inverse_mass(&self) -> f64 {
        if self.mass.is_finite() && self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    pub fn inverse_moment(&self) -> f64 {
        if self.moment.is_finite() && self.moment > 0.0 {
            1.0 / self.moment
        } else {
            0.0
        }
    }
}

/// How the elasticities of two colliding bodies combine into one coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MixingMode {
    #[default]
    Average,
    Min,
    Max,
    GeometricMean,
}

impl MixingMode {
    pub fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            MixingMode::Average => 0.5 * (a + b),
            MixingMode::Min => a.min(b),
            MixingMode::Max => a.max(b),
            MixingMode::GeometricMean => (a.abs() * b.abs()).sqrt(),
        }
    }
}

/// Kinetic and potential energy totals of the simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyInfo {
    pub translational: f64,
    pub rotational: f64,
    pub potential: f64,
}

impl EnergyInfo {
    pub fn kinetic(&self) -> f64 {
        self.translational + self.rotational
    }

    pub fn total(&self) -> f64 {
        self.kinetic() + self.potential
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixing_modes_combine_expected_values() {
        assert!((MixingMode::Average.combine(0.6, 0.2) - 0.4).abs() < 1e-12);
        assert!((MixingMode::Min.combine(0.6, 0.2) - 0.2).abs() < 1e-12);
        assert!((MixingMode::Max.combine(0.6, 0.2) - 0.6).abs() < 1e-12);
        let expected = (0.6_f64 * 0.2_f64).sqrt();
        assert!((MixingMode::GeometricMean.combine(0.6, 0.2) - expected).abs() < 1e-12);
    }

    #[test]
    fn transform_round_trips_points() {
        let transform = Transform::new(DVec2::new(1.0, -2.0), 0.7);
        let local = DVec2::new(0.3, 0.9);
        let back = transform.inverse_apply(transform.apply(local));
        assert!((back - local).length() < 1e-12);
    }

    #[test]
    fn infinite_mass_has_zero_inverse() {
        let props = MassProperties::infinite();
        assert_eq!(props.inverse_mass(), 0.0);
        assert_eq!(props.inverse_moment(), 0.0);
    }
}
