//! Collision impulses applied at the instant of impact.

use glam::DVec2;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{
    constraint_solver::{ConstraintRow, ConstraintSystem},
    island::build_islands,
};
use crate::{
    collision::contact::Contact,
    config::SimConfig,
    core::{
        connector::{Joint, Rope},
        rigidbody::RigidBody,
    },
    error::{PhysicsError, Result},
    utils::allocator::{Arena, EntityId},
};

/// How simultaneous impacts are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CollisionHandling {
    /// One system over every touching contact.
    Simultaneous,
    /// The fastest approaching contact alone, repeated until none approach.
    Serial,
    /// The island holding the fastest approaching contact, repeated.
    SerialGrouped,
    /// `SerialGrouped`, then one simultaneous pass over everything.
    #[default]
    SerialGroupedLastPass,
}

/// Impulse delivered across one contact during a collision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedImpulse {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub point: DVec2,
    pub normal: DVec2,
    pub impulse: f64,
}

struct Resolver<'a> {
    bodies: &'a mut Arena<RigidBody>,
    joint_rows: Vec<ConstraintRow>,
    contact_rows: Vec<ConstraintRow>,
    totals: Vec<f64>,
    config: &'a SimConfig,
    time: f64,
    passes: usize,
}

impl Resolver<'_> {
    fn refresh(&mut self) {
        let bodies = self.bodies.as_slice();
        for row in self.joint_rows.iter_mut().chain(self.contact_rows.iter_mut()) {
            row.refresh_velocity(bodies);
        }
    }

    /// Index of the contact approaching fastest, if any is approaching at all.
    fn worst_approaching(&self) -> Option<usize> {
        self.contact_rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.normal_velocity < -self.config.small_velocity)
            .min_by(|(_, a), (_, b)| a.normal_velocity.total_cmp(&b.normal_velocity))
            .map(|(index, _)| index)
    }

    fn solve_subset(&mut self, subset: &[usize]) -> Result<()> {
        self.passes += 1;
        if self.passes > self.config.max_collision_search {
            log::warn!(
                "collision resolution exceeded {} passes at t={:.6}",
                self.config.max_collision_search,
                self.time
            );
            return Err(PhysicsError::CollisionSearchExceeded {
                stage: "collision resolution",
                iterations: self.config.max_collision_search,
                time: self.time,
            });
        }
        self.refresh();
        let mut rows = self.joint_rows.clone();
        rows.extend(subset.iter().map(|&i| self.contact_rows[i]));
        let system = ConstraintSystem::new(rows, self.bodies.as_slice());
        let impulses = system.solve_impulses(self.config, self.time)?;
        system.apply_impulses(&impulses, self.bodies.as_mut_slice());
        for (k, &i) in subset.iter().enumerate() {
            self.totals[i] += impulses[system.joint_count() + k];
        }
        Ok(())
    }

    fn simultaneous(&mut self) -> Result<()> {
        let all: Vec<usize> = (0..self.contact_rows.len()).collect();
        self.solve_subset(&all)
    }

    fn serial(&mut self) -> Result<()> {
        loop {
            self.refresh();
            let Some(worst) = self.worst_approaching() else {
                return Ok(());
            };
            self.solve_subset(&[worst])?;
        }
    }

    fn serial_grouped(&mut self) -> Result<()> {
        loop {
            self.refresh();
            let Some(worst) = self.worst_approaching() else {
                return Ok(());
            };
            let islands = build_islands(self.bodies.as_slice(), &self.contact_rows, &self.joint_rows);
            let group = islands
                .into_iter()
                .find(|island| island.contacts.contains(&worst))
                .map(|island| island.contacts)
                .unwrap_or_else(|| vec![worst]);
            self.solve_subset(&group)?;
        }
    }
}

/// Applies collision impulses across `contacts` so that approaching pairs
/// separate with `-e` times their approach speed. Joints and rigid ropes take
/// part as equality rows; flexible ropes near taut are one-sided rows like
/// contacts. Returns the total impulse per contact that received any.
pub fn resolve_collisions(
    bodies: &mut Arena<RigidBody>,
    joints: &[Joint],
    ropes: &[Rope],
    contacts: &[Contact],
    config: &SimConfig,
    time: f64,
) -> Result<Vec<ResolvedImpulse>> {
    let mut joint_rows = joints
        .iter()
        .map(|joint| ConstraintRow::from_joint(joint, bodies))
        .collect::<Result<Vec<_>>>()?;
    let mut contact_rows: Vec<ConstraintRow> =
        contacts.iter().map(ConstraintRow::from_contact).collect();
    for rope in ropes {
        let row = ConstraintRow::from_rope(rope, bodies)?;
        if rope.is_rigid() {
            joint_rows.push(row);
        } else if row.gap < config.distance_tol {
            contact_rows.push(row);
        }
    }

    let totals = vec![0.0; contact_rows.len()];
    let mut resolver = Resolver {
        bodies,
        joint_rows,
        contact_rows,
        totals,
        config,
        time,
        passes: 0,
    };
    match config.collision_handling {
        CollisionHandling::Simultaneous => resolver.simultaneous()?,
        CollisionHandling::Serial => resolver.serial()?,
        CollisionHandling::SerialGrouped => resolver.serial_grouped()?,
        CollisionHandling::SerialGroupedLastPass => {
            resolver.serial_grouped()?;
            resolver.simultaneous()?;
        }
    }
    debug!(
        "resolved {} contacts and {} taut ropes in {} passes at t={time:.6}",
        contacts.len(),
        resolver.contact_rows.len() - contacts.len(),
        resolver.passes
    );

    Ok(contacts
        .iter()
        .zip(&resolver.totals)
        .filter(|(_, total)| **total != 0.0)
        .map(|(contact, total)| ResolvedImpulse {
            body_a: contact.body_a,
            body_b: contact.body_b,
            point: contact.point,
            normal: contact.normal,
            impulse: *total,
        })
        .collect())
}
