//! Rate-of-change evaluation for the flat state vector.

use super::{
    constraint_solver::{BodyAccel, ConstraintRow, ConstraintSystem},
    forces::ForceRegistry,
    integrator::OdeSystem,
    state::{self, VARS_PER_BODY},
};
use crate::{
    collision::{contact::ContactSet, narrowphase::detect_contacts},
    config::SimConfig,
    core::{
        connector::{Joint, Rope},
        rigidbody::RigidBody,
    },
    error::Result,
    utils::allocator::Arena,
};

/// Ordered stage of one derivative evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPhase {
    /// Force laws turned into centre-of-mass accelerations.
    AppliedForces,
    /// One row per joint and rigid rope, then one per taut flexible rope.
    JointReactions,
    /// One row per resting contact found in the current state.
    ContactForces,
}

/// Derivative evaluator over a body set. Writes each evaluated state into the
/// bodies first, so force laws and contact detection read a consistent state.
pub struct DynamicsEvaluator<'a> {
    bodies: &'a mut Arena<RigidBody>,
    joints: &'a [Joint],
    ropes: &'a [Rope],
    forces: &'a ForceRegistry,
    config: &'a SimConfig,
    phases: &'static [EvalPhase],
    contacts: ContactSet,
    evaluations: usize,
}

impl<'a> DynamicsEvaluator<'a> {
    /// Applied forces and connectors only.
    pub fn rigid_body(
        bodies: &'a mut Arena<RigidBody>,
        joints: &'a [Joint],
        ropes: &'a [Rope],
        forces: &'a ForceRegistry,
        config: &'a SimConfig,
    ) -> Self {
        Self::with_phases(
            bodies,
            joints,
            ropes,
            forces,
            config,
            &[EvalPhase::AppliedForces, EvalPhase::JointReactions],
        )
    }

    /// Applied forces, connectors and resting contact forces.
    pub fn contact_aware(
        bodies: &'a mut Arena<RigidBody>,
        joints: &'a [Joint],
        ropes: &'a [Rope],
        forces: &'a ForceRegistry,
        config: &'a SimConfig,
    ) -> Self {
        Self::with_phases(
            bodies,
            joints,
            ropes,
            forces,
            config,
            &[
                EvalPhase::AppliedForces,
                EvalPhase::JointReactions,
                EvalPhase::ContactForces,
            ],
        )
    }

    fn with_phases(
        bodies: &'a mut Arena<RigidBody>,
        joints: &'a [Joint],
        ropes: &'a [Rope],
        forces: &'a ForceRegistry,
        config: &'a SimConfig,
        phases: &'static [EvalPhase],
    ) -> Self {
        Self {
            bodies,
            joints,
            ropes,
            forces,
            config,
            phases,
            contacts: ContactSet::default(),
            evaluations: 0,
        }
    }

    pub fn phases(&self) -> &[EvalPhase] {
        self.phases
    }

    /// Resting contacts of the most recent evaluation, with their forces.
    pub fn last_contacts(&self) -> &ContactSet {
        &self.contacts
    }

    pub fn into_last_contacts(self) -> ContactSet {
        self.contacts
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    fn applied_accelerations(&self, accel: &mut [BodyAccel]) {
        for force in self.forces.calculate_all(self.bodies) {
            let Some(slot) = self.bodies.slot_of(force.body) else {
                continue;
            };
            let body = &self.bodies.as_slice()[slot];
            if body.is_static() {
                continue;
            }
            accel[slot].linear += force.vector * body.inverse_mass();
            accel[slot].angular += force.torque_about(body.position()) * body.inverse_moment();
        }
    }
}

impl OdeSystem for DynamicsEvaluator<'_> {
    fn evaluate(&mut self, vars: &[f64], change: &mut [f64], _time_offset: f64) -> Result<()> {
        self.evaluations += 1;
        state::write_bodies(vars, self.bodies);
        let time = vars.last().copied().unwrap_or(0.0);

        let mut accel = vec![BodyAccel::default(); self.bodies.len()];
        let mut rows: Vec<ConstraintRow> = Vec::new();
        let mut contact_count = 0;
        for phase in self.phases {
            match phase {
                EvalPhase::AppliedForces => self.applied_accelerations(&mut accel),
                EvalPhase::JointReactions => {
                    for joint in self.joints {
                        rows.push(ConstraintRow::from_joint(joint, self.bodies)?);
                    }
                    let mut flexible = Vec::new();
                    for rope in self.ropes {
                        let row = ConstraintRow::from_rope(rope, self.bodies)?;
                        if rope.is_rigid() {
                            rows.push(row);
                        } else if row.gap < self.config.distance_tol
                            && row.normal_velocity.abs() < self.config.velocity_tol
                        {
                            flexible.push(row);
                        }
                    }
                    rows.extend(flexible);
                }
                EvalPhase::ContactForces => {
                    let found = detect_contacts(
                        self.bodies,
                        self.config.distance_tol,
                        self.config.elasticity_mixing,
                    );
                    let resting = found.resting(self.config.distance_tol, self.config.velocity_tol);
                    contact_count = resting.len();
                    rows.extend(resting.iter().map(ConstraintRow::from_contact));
                    self.contacts = ContactSet::new(resting);
                }
            }
        }

        if !rows.is_empty() {
            let system = ConstraintSystem::new(rows, self.bodies.as_slice());
            let forces = system.solve_forces(&accel, self.config, time)?;
            system.apply_forces(&forces, &mut accel);
            let first_contact = system.len() - contact_count;
            let mut contacts = std::mem::take(&mut self.contacts).into_vec();
            for (contact, force) in contacts.iter_mut().zip(&forces[first_contact..]) {
                contact.force = *force;
            }
            self.contacts = ContactSet::new(contacts);
        }

        for (slot, body) in self.bodies.iter().enumerate() {
            let out = &mut change[slot * VARS_PER_BODY..(slot + 1) * VARS_PER_BODY];
            if body.is_static() {
                out.fill(0.0);
                continue;
            }
            let v = body.velocity.linear;
            out[state::X] = v.x;
            out[state::VX] = accel[slot].linear.x;
            out[state::Y] = v.y;
            out[state::VY] = accel[slot].linear.y;
            out[state::ANGLE] = body.velocity.angular;
            out[state::OMEGA] = accel[slot].angular;
        }
        if let Some(last) = change.last_mut() {
            *last = 1.0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            connector::{Anchor, CoordType},
            shape::Shape,
        },
        dynamics::{forces::GravityLaw, state::StateVector},
    };
    use glam::DVec2;

    #[test]
    fn free_fall_rates() {
        let mut bodies = Arena::new();
        let mut ball = RigidBody::new("ball", Shape::circle(0.5), 2.0);
        ball.set_velocity(DVec2::new(3.0, 0.0), 0.5);
        bodies.insert(ball);
        let mut forces = ForceRegistry::new();
        forces.add(GravityLaw::default());
        let config = SimConfig::default();

        let vars = StateVector::from_bodies(&bodies, 0.0);
        let mut change = vec![0.0; vars.len()];
        let mut evaluator = DynamicsEvaluator::rigid_body(&mut bodies, &[], &[], &forces, &config);
        evaluator.evaluate(vars.as_slice(), &mut change, 0.0).unwrap();
        assert_eq!(change, vec![3.0, 0.0, 0.0, -9.8, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn pin_joint_cancels_gravity_on_hanging_body() {
        let mut bodies = Arena::new();
        let mut bob = RigidBody::new("bob", Shape::circle(0.1), 1.0);
        bob.set_position(DVec2::new(0.0, -1.0), 0.0);
        let id = bodies.insert(bob);
        let joints = Joint::attach_rigid_body(
            "pin",
            Anchor::on_body(id, DVec2::new(0.0, 1.0)),
            Anchor::World(DVec2::ZERO),
            CoordType::World,
        );
        let mut forces = ForceRegistry::new();
        forces.add(GravityLaw::default());
        let config = SimConfig::default();

        let vars = StateVector::from_bodies(&bodies, 0.0);
        let mut change = vec![0.0; vars.len()];
        let mut evaluator =
            DynamicsEvaluator::rigid_body(&mut bodies, &joints, &[], &forces, &config);
        evaluator.evaluate(vars.as_slice(), &mut change, 0.0).unwrap();
        for rate in &change[..6] {
            assert!(rate.abs() < 1e-9, "{change:?}");
        }
    }

    #[test]
    fn resting_contact_supports_block() {
        let mut bodies = Arena::new();
        let mut block = RigidBody::new("block", Shape::block(1.0, 1.0).unwrap(), 1.0);
        let config = SimConfig::default();
        block.set_position(DVec2::new(0.0, 0.5 + config.resting_gap()), 0.0);
        bodies.insert(block);
        let mut floor = RigidBody::fixed("floor", Shape::block(10.0, 1.0).unwrap());
        floor.set_position(DVec2::new(0.0, -0.5), 0.0);
        bodies.insert(floor);
        let mut forces = ForceRegistry::new();
        forces.add(GravityLaw::default());

        let vars = StateVector::from_bodies(&bodies, 0.0);
        let mut change = vec![0.0; vars.len()];
        let mut evaluator =
            DynamicsEvaluator::contact_aware(&mut bodies, &[], &[], &forces, &config);
        evaluator.evaluate(vars.as_slice(), &mut change, 0.0).unwrap();

        assert!(change[state::VY].abs() < 1e-6);
        assert!(change[state::OMEGA].abs() < 1e-6);
        let contacts = evaluator.last_contacts();
        assert_eq!(contacts.len(), 2);
        let total: f64 = contacts.iter().map(|c| c.force).sum();
        assert!((total - 9.8).abs() < 1e-6);
    }

    #[test]
    fn slack_rope_leaves_body_falling_and_taut_rope_holds_it() {
        let config = SimConfig::default();
        let mut forces = ForceRegistry::new();
        forces.add(GravityLaw::default());
        for (drop, falling) in [(0.5, true), (config.resting_gap(), false)] {
            let mut bodies = Arena::new();
            let mut bob = RigidBody::new("bob", Shape::circle(0.1), 1.0);
            bob.set_position(DVec2::new(0.0, -2.0 + drop), 0.0);
            let id = bodies.insert(bob);
            let ropes = [Rope::flexible(
                "line",
                Anchor::World(DVec2::ZERO),
                Anchor::on_body(id, DVec2::ZERO),
                2.0,
            )];

            let vars = StateVector::from_bodies(&bodies, 0.0);
            let mut change = vec![0.0; vars.len()];
            let mut evaluator =
                DynamicsEvaluator::rigid_body(&mut bodies, &[], &ropes, &forces, &config);
            evaluator.evaluate(vars.as_slice(), &mut change, 0.0).unwrap();
            if falling {
                assert!((change[state::VY] + 9.8).abs() < 1e-9);
            } else {
                assert!(change[state::VY].abs() < 1e-9);
            }
        }
    }
}
