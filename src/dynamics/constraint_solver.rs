//! Constraint forces for joints, ropes and resting contacts.
//!
//! Every active constraint contributes one row. Row `i` relates the forces on
//! all rows to the relative normal acceleration of its two material points:
//!
//! ```text
//! gap_i'' = sum_j A_ij f_j + b_i
//! ```
//!
//! where `A_ij` is the response of row `i` to a unit force on row `j` and `b_i`
//! collects applied forces and velocity terms. Joint rows must hit their
//! target exactly; contact and rope rows form a complementarity problem with
//! `f >= 0`. Joints are solved directly first, which both detects a singular
//! joint set and seeds the projected Gauss-Seidel relaxation over all rows.

use glam::DVec2;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    collision::contact::Contact,
    config::SimConfig,
    core::{
        connector::{Anchor, CoordType, Joint, Rope, RopeKind},
        rigidbody::RigidBody,
    },
    error::{PhysicsError, Result},
    utils::{allocator::Arena, math::torque},
};

/// Smallest pivot of the joint block, relative to its largest, that still
/// counts as independent.
const JOINT_RANK_TOLERANCE: f64 = 1e-10;
const MIN_DIAGONAL: f64 = 1e-14;
const MIN_ROPE_SPAN: f64 = 1e-12;

/// Stabilization target added to constraint rows to cancel drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExtraAccel {
    /// Target zero relative normal acceleration.
    None,
    /// Also damp relative normal velocity, `-2 v / tau`.
    Velocity,
    /// Also pull the gap toward its target, `-(gap - target) / tau^2`.
    #[default]
    VelocityAndDistance,
}

impl ExtraAccel {
    pub fn target(self, gap_error: f64, normal_velocity: f64, timescale: f64) -> f64 {
        match self {
            ExtraAccel::None => 0.0,
            ExtraAccel::Velocity => -2.0 * normal_velocity / timescale,
            ExtraAccel::VelocityAndDistance => {
                -2.0 * normal_velocity / timescale - gap_error / (timescale * timescale)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    /// Equality row: joints and rigid ropes.
    Joint,
    Contact,
    /// Taut flexible rope; pulls but never pushes.
    Rope,
}

impl RowKind {
    pub fn is_unilateral(self) -> bool {
        !matches!(self, RowKind::Joint)
    }
}

/// Centre-of-mass acceleration of one body.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyAccel {
    pub linear: DVec2,
    pub angular: f64,
}

impl BodyAccel {
    /// Acceleration of the material point at lever arm `r`, leaving out the
    /// centripetal part which rows carry in their curvature.
    fn at(&self, r: DVec2) -> DVec2 {
        self.linear + r.perp() * self.angular
    }
}

/// Kinematics of one connector end.
struct AnchorState {
    slot: Option<usize>,
    point: DVec2,
    velocity: DVec2,
    r: DVec2,
    omega: f64,
}

impl AnchorState {
    fn read(anchor: &Anchor, bodies: &Arena<RigidBody>, owner: &str) -> Result<Self> {
        let missing = || PhysicsError::config(format!("{owner} refers to a missing body"));
        let point = anchor.world_point(bodies).ok_or_else(missing)?;
        let velocity = anchor.world_velocity(bodies).ok_or_else(missing)?;
        let slot = anchor.body().and_then(|id| bodies.slot_of(id));
        let body = slot.map(|s| &bodies.as_slice()[s]);
        Ok(Self {
            slot,
            point,
            velocity,
            r: body.map_or(DVec2::ZERO, |b| point - b.position()),
            omega: body.map_or(0.0, |b| b.velocity.angular),
        })
    }

    /// `n . r w^2`, this end's share of a row's centripetal curvature.
    fn centripetal(&self, normal: DVec2) -> f64 {
        normal.dot(self.r * (self.omega * self.omega))
    }
}

/// One scalar constraint between two material points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintRow {
    pub kind: RowKind,
    /// Arena slot of each side; `None` for a fixed world point.
    pub slot_a: Option<usize>,
    pub slot_b: Option<usize>,
    pub normal: DVec2,
    pub r_a: DVec2,
    pub r_b: DVec2,
    pub gap: f64,
    pub normal_velocity: f64,
    pub curvature: f64,
    pub elasticity: f64,
}

impl ConstraintRow {
    pub fn from_joint(joint: &Joint, bodies: &Arena<RigidBody>) -> Result<Self> {
        let owner = format!("joint {}", joint.name);
        let a = AnchorState::read(&joint.anchor_a, bodies, &owner)?;
        let b = AnchorState::read(&joint.anchor_b, bodies, &owner)?;

        let normal = joint.world_normal(bodies);
        let v_rel = a.velocity - b.velocity;
        let normal_rate = match joint.normal_type {
            CoordType::Body => normal.perp() * b.omega,
            CoordType::World => DVec2::ZERO,
        };

        Ok(Self {
            kind: RowKind::Joint,
            slot_a: a.slot,
            slot_b: b.slot,
            normal,
            r_a: a.r,
            r_b: b.r,
            gap: (a.point - b.point).dot(normal),
            normal_velocity: v_rel.dot(normal),
            curvature: b.centripetal(normal) - a.centripetal(normal)
                + 2.0 * normal_rate.dot(v_rel),
            elasticity: 0.0,
        })
    }

    /// Row whose gap is the rope's slack. The normal points from A toward B,
    /// so a positive force is tension.
    pub fn from_rope(rope: &Rope, bodies: &Arena<RigidBody>) -> Result<Self> {
        let owner = format!("rope {}", rope.name);
        let a = AnchorState::read(&rope.anchor_a, bodies, &owner)?;
        let b = AnchorState::read(&rope.anchor_b, bodies, &owner)?;

        let offset = b.point - a.point;
        let span = offset.length();
        let normal = if span > MIN_ROPE_SPAN {
            offset / span
        } else {
            DVec2::Y
        };
        let v_rel = a.velocity - b.velocity;
        let normal_velocity = v_rel.dot(normal);
        let tangential = v_rel - normal * normal_velocity;

        Ok(Self {
            kind: match rope.kind {
                RopeKind::Rigid => RowKind::Joint,
                RopeKind::Flexible => RowKind::Rope,
            },
            slot_a: a.slot,
            slot_b: b.slot,
            normal,
            r_a: a.r,
            r_b: b.r,
            gap: rope.length - span,
            normal_velocity,
            curvature: b.centripetal(normal) - a.centripetal(normal)
                - tangential.length_squared() / span.max(MIN_ROPE_SPAN),
            elasticity: rope.elasticity,
        })
    }

    pub fn from_contact(contact: &Contact) -> Self {
        Self {
            kind: RowKind::Contact,
            slot_a: Some(contact.slot_a),
            slot_b: Some(contact.slot_b),
            normal: contact.normal,
            r_a: contact.r_a,
            r_b: contact.r_b,
            gap: contact.distance,
            normal_velocity: contact.normal_velocity,
            curvature: contact.curvature,
            elasticity: contact.elasticity,
        }
    }

    /// Recomputes the relative normal velocity after body velocities changed.
    pub fn refresh_velocity(&mut self, bodies: &[RigidBody]) {
        let side = |slot: Option<usize>, r: DVec2| {
            slot.and_then(|s| bodies.get(s))
                .map_or(DVec2::ZERO, |b| b.velocity.linear + r.perp() * b.velocity.angular)
        };
        self.normal_velocity = self
            .normal
            .dot(side(self.slot_a, self.r_a) - side(self.slot_b, self.r_b));
    }

    fn sides(&self) -> [(Option<usize>, DVec2, f64); 2] {
        [(self.slot_a, self.r_a, 1.0), (self.slot_b, self.r_b, -1.0)]
    }

    /// Relative normal acceleration produced by the given body accelerations.
    pub fn relative_acceleration(&self, accel: &[BodyAccel]) -> f64 {
        let side = |slot: Option<usize>, r: DVec2| {
            slot.and_then(|s| accel.get(s)).map_or(DVec2::ZERO, |a| a.at(r))
        };
        self.normal
            .dot(side(self.slot_a, self.r_a) - side(self.slot_b, self.r_b))
            + self.curvature
    }

    /// Stabilization target for this row's acceleration.
    pub fn target(&self, config: &SimConfig) -> f64 {
        let target_gap = match self.kind {
            RowKind::Joint => 0.0,
            RowKind::Contact | RowKind::Rope => config.resting_gap(),
        };
        config.extra_accel.target(
            self.gap - target_gap,
            self.normal_velocity,
            config.stabilization_timescale,
        )
    }
}

/// Rows plus their response matrix, joints first.
#[derive(Debug, Clone)]
pub struct ConstraintSystem {
    rows: Vec<ConstraintRow>,
    joint_count: usize,
    matrix: DMatrix<f64>,
    inverse_mass: Vec<(f64, f64)>,
}

impl ConstraintSystem {
    /// Builds the system. `rows` must list every equality row before any
    /// unilateral one.
    pub fn new(rows: Vec<ConstraintRow>, bodies: &[RigidBody]) -> Self {
        let joint_count = rows.iter().take_while(|r| r.kind == RowKind::Joint).count();
        let inverse_mass: Vec<(f64, f64)> = bodies
            .iter()
            .map(|b| (b.inverse_mass(), b.inverse_moment()))
            .collect();

        let n = rows.len();
        let mut matrix = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                let value = response(&rows[i], &rows[j], &inverse_mass);
                matrix[(i, j)] = value;
                matrix[(j, i)] = value;
            }
        }
        Self {
            rows,
            joint_count,
            matrix,
            inverse_mass,
        }
    }

    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    /// Solves for constraint forces given the applied accelerations.
    /// Unilateral forces come out non-negative.
    pub fn solve_forces(
        &self,
        accel: &[BodyAccel],
        config: &SimConfig,
        time: f64,
    ) -> Result<Vec<f64>> {
        let rhs = DVector::from_iterator(
            self.rows.len(),
            self.rows
                .iter()
                .map(|row| row.target(config) - row.relative_acceleration(accel)),
        );
        self.solve(&rhs, config, "contact relaxation", time)
    }

    /// Solves for impulses that drive each row's relative normal velocity to
    /// its target: `-e v` for unilateral rows and zero for joints. Impacts
    /// slower than the restitution cutoff are perfectly inelastic.
    pub fn solve_impulses(&self, config: &SimConfig, time: f64) -> Result<Vec<f64>> {
        let rhs = DVector::from_iterator(
            self.rows.len(),
            self.rows.iter().map(|row| {
                if !row.kind.is_unilateral() {
                    return -row.normal_velocity;
                }
                let e = if row.normal_velocity.abs() < config.restitution_cutoff {
                    0.0
                } else {
                    row.elasticity
                };
                -(1.0 + e) * row.normal_velocity
            }),
        );
        self.solve(&rhs, config, "impulse relaxation", time)
    }

    fn solve(
        &self,
        rhs: &DVector<f64>,
        config: &SimConfig,
        stage: &'static str,
        time: f64,
    ) -> Result<Vec<f64>> {
        let mut x = DVector::<f64>::zeros(self.rows.len());
        if self.joint_count > 0 {
            let joint_solution = self.solve_joint_block(rhs)?;
            x.rows_mut(0, self.joint_count).copy_from(&joint_solution);
        }
        if self.joint_count == self.rows.len() {
            return Ok(x.as_slice().to_vec());
        }

        let unilateral: Vec<bool> = self.rows.iter().map(|r| r.kind.is_unilateral()).collect();
        match projected_gauss_seidel(
            &self.matrix,
            rhs,
            &unilateral,
            &mut x,
            config.solver_tolerance,
            config.max_contact_iterations,
        ) {
            Some(_) => Ok(x.as_slice().to_vec()),
            None => {
                log::warn!(
                    "{stage} did not converge in {} sweeps at t={time:.6}",
                    config.max_contact_iterations
                );
                Err(PhysicsError::CollisionSearchExceeded {
                    stage,
                    iterations: config.max_contact_iterations,
                    time,
                })
            }
        }
    }

    /// Direct solve of the equality rows alone. A rank-deficient block means
    /// redundant or contradictory joints.
    fn solve_joint_block(&self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let k = self.joint_count;
        let singular = || {
            PhysicsError::config(format!("{k} joints form a singular or redundant system"))
        };
        let lu = self.matrix.view((0, 0), (k, k)).into_owned().full_piv_lu();
        let pivots = lu.u().diagonal();
        if pivots.amin() <= JOINT_RANK_TOLERANCE * pivots.amax() {
            return Err(singular());
        }
        lu.solve(&rhs.rows(0, k).into_owned()).ok_or_else(singular)
    }

    /// Adds the accelerations caused by row forces `f` to `accel`.
    pub fn apply_forces(&self, forces: &[f64], accel: &mut [BodyAccel]) {
        for (row, f) in self.rows.iter().zip(forces) {
            if *f == 0.0 {
                continue;
            }
            for (slot, r, sign) in row.sides() {
                let Some(slot) = slot else { continue };
                let (inv_m, inv_i) = self.inverse_mass[slot];
                let push = row.normal * (sign * f);
                accel[slot].linear += push * inv_m;
                accel[slot].angular += torque(r, push) * inv_i;
            }
        }
    }

    /// Applies row impulses directly to body velocities.
    pub fn apply_impulses(&self, impulses: &[f64], bodies: &mut [RigidBody]) {
        for (row, j) in self.rows.iter().zip(impulses) {
            if *j == 0.0 {
                continue;
            }
            for (slot, r, sign) in row.sides() {
                let Some(body) = slot.and_then(|s| bodies.get_mut(s)) else {
                    continue;
                };
                if body.is_static() {
                    continue;
                }
                let push = row.normal * (sign * j);
                let linear = body.velocity.linear + push * body.inverse_mass();
                let angular = body.velocity.angular + torque(r, push) * body.inverse_moment();
                body.set_velocity(linear, angular);
            }
        }
    }
}

/// Response of row `i`'s relative acceleration to a unit force on row `j`.
fn response(i: &ConstraintRow, j: &ConstraintRow, inverse_mass: &[(f64, f64)]) -> f64 {
    let mut value = 0.0;
    for (slot_i, r_i, s_i) in i.sides() {
        let Some(k) = slot_i else { continue };
        for (slot_j, r_j, s_j) in j.sides() {
            if slot_j != Some(k) {
                continue;
            }
            let (inv_m, inv_i) = inverse_mass[k];
            value += s_i
                * s_j
                * (i.normal.dot(j.normal) * inv_m
                    + r_i.perp_dot(i.normal) * r_j.perp_dot(j.normal) * inv_i);
        }
    }
    value
}

/// Largest violation over `active` rows of `A x = rhs` on bilateral rows and
/// of `min(x, A x - rhs) = 0` on unilateral rows.
fn complementarity_residual(
    a: &DMatrix<f64>,
    rhs: &DVector<f64>,
    unilateral: &[bool],
    active: &[bool],
    x: &DVector<f64>,
) -> f64 {
    let w = a * x - rhs;
    (0..w.len())
        .filter(|&i| active[i])
        .map(|i| if unilateral[i] { w[i].min(x[i]).abs() } else { w[i].abs() })
        .fold(0.0, f64::max)
}

/// Projected Gauss-Seidel for `A x = rhs` where rows flagged `unilateral`
/// satisfy `x >= 0, A x - rhs >= 0` with complementarity instead.
///
/// Starts from the contents of `x`. Returns the number of sweeps used, or
/// `None` when the complementarity residual is still above
/// `tolerance * max(1, |rhs|)` after `max_iterations` sweeps. Rows with a
/// vanishing diagonal carry no force.
pub fn projected_gauss_seidel(
    a: &DMatrix<f64>,
    rhs: &DVector<f64>,
    unilateral: &[bool],
    x: &mut DVector<f64>,
    tolerance: f64,
    max_iterations: usize,
) -> Option<usize> {
    let n = a.nrows();
    let active: Vec<bool> = (0..n).map(|i| a[(i, i)] > MIN_DIAGONAL).collect();
    for i in 0..n {
        if !active[i] {
            x[i] = 0.0;
        } else if unilateral[i] {
            x[i] = x[i].max(0.0);
        }
    }
    let limit = tolerance * rhs.amax().max(1.0);

    for sweep in 1..=max_iterations {
        for i in (0..n).filter(|&i| active[i]) {
            let residual = rhs[i] - a.row(i).tr_dot(&*x);
            let mut updated = x[i] + residual / a[(i, i)];
            if unilateral[i] {
                updated = updated.max(0.0);
            }
            x[i] = updated;
        }
        if complementarity_residual(a, rhs, unilateral, &active, x) <= limit {
            return Some(sweep);
        }
    }
    None
}
