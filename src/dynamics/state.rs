//! Flat state vector layout shared by the integrator, evaluator and world.
//!
//! Per body, in slot order: x, x velocity, y, y velocity, angle, angular
//! velocity. Time is the single trailing entry.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::{
    core::rigidbody::RigidBody,
    error::{PhysicsError, Result},
    utils::allocator::Arena,
};

pub const VARS_PER_BODY: usize = 6;

pub const X: usize = 0;
pub const VX: usize = 1;
pub const Y: usize = 2;
pub const VY: usize = 3;
pub const ANGLE: usize = 4;
pub const OMEGA: usize = 5;

const LABELS: [(&str, &str); VARS_PER_BODY] = [
    ("X POSITION", "m"),
    ("X VELOCITY", "m/s"),
    ("Y POSITION", "m"),
    ("Y VELOCITY", "m/s"),
    ("ANGLE", "rad"),
    ("ANGULAR VELOCITY", "rad/s"),
];

pub fn state_len(body_count: usize) -> usize {
    VARS_PER_BODY * body_count + 1
}

/// Name and unit of one state variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarInfo {
    pub name: String,
    pub unit: String,
}

pub fn var_infos(bodies: &Arena<RigidBody>) -> Vec<VarInfo> {
    let mut infos = Vec::with_capacity(state_len(bodies.len()));
    for body in bodies.iter() {
        for (label, unit) in LABELS {
            infos.push(VarInfo {
                name: format!("{} {label}", body.name()),
                unit: unit.to_string(),
            });
        }
    }
    infos.push(VarInfo {
        name: "TIME".to_string(),
        unit: "s".to_string(),
    });
    infos
}

/// Serializable copy of the state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub time: f64,
    pub values: Vec<f64>,
}

/// Owned flat state, kept in step with the body arena by the world.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateVector {
    values: Vec<f64>,
}

impl StateVector {
    pub fn from_bodies(bodies: &Arena<RigidBody>, time: f64) -> Self {
        let mut state = Self::default();
        state.gather(bodies, time);
        state
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn body_count(&self) -> usize {
        self.values.len().saturating_sub(1) / VARS_PER_BODY
    }

    pub fn time(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    pub fn set_time(&mut self, time: f64) {
        if let Some(last) = self.values.last_mut() {
            *last = time;
        }
    }

    /// Rebuilds the vector from the bodies, resizing it if the body count changed.
    pub fn gather(&mut self, bodies: &Arena<RigidBody>, time: f64) {
        self.values.clear();
        self.values.resize(state_len(bodies.len()), 0.0);
        read_bodies(bodies, &mut self.values);
        self.set_time(time);
    }

    pub fn scatter(&self, bodies: &mut Arena<RigidBody>) {
        write_bodies(&self.values, bodies);
    }

    /// Replaces every value. The length must match the current layout.
    pub fn assign(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.values.len() {
            return Err(PhysicsError::StateLength {
                expected: self.values.len(),
                actual: values.len(),
            });
        }
        self.values.copy_from_slice(values);
        Ok(())
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            time: self.time(),
            values: self.values.clone(),
        }
    }
}

/// Copies positions and velocities of the bodies into `vars`, leaving time alone.
pub fn read_bodies(bodies: &Arena<RigidBody>, vars: &mut [f64]) {
    for (body, chunk) in bodies.iter().zip(vars.chunks_exact_mut(VARS_PER_BODY)) {
        let p = body.position();
        let v = body.velocity.linear;
        chunk.copy_from_slice(&[p.x, v.x, p.y, v.y, body.angle(), body.velocity.angular]);
    }
}

/// Copies positions and velocities from `vars` into the bodies.
pub fn write_bodies(vars: &[f64], bodies: &mut Arena<RigidBody>) {
    for (body, chunk) in bodies.iter_mut().zip(vars.chunks_exact(VARS_PER_BODY)) {
        if body.is_static() {
            continue;
        }
        body.set_position(DVec2::new(chunk[X], chunk[Y]), chunk[ANGLE]);
        body.set_velocity(DVec2::new(chunk[VX], chunk[VY]), chunk[OMEGA]);
    }
}

/// Fails with [`PhysicsError::NumericAnomaly`] naming the first non-finite variable.
pub fn check_finite(vars: &[f64], bodies: &Arena<RigidBody>) -> Result<()> {
    let Some(index) = vars.iter().position(|v| !v.is_finite()) else {
        return Ok(());
    };
    let time = vars.last().copied().unwrap_or(f64::NAN);
    let variable = match bodies.as_slice().get(index / VARS_PER_BODY) {
        Some(body) => format!("{} {}", body.name(), LABELS[index % VARS_PER_BODY].0),
        None => "TIME".to_string(),
    };
    Err(PhysicsError::NumericAnomaly { variable, time })
}
