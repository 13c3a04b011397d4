//! Collision-aware macro step.
//!
//! A step integrates the remaining interval, then checks the result for
//! interpenetration. A penetrating candidate is rejected and the interval is
//! bisected from the last good state until that state holds an approaching
//! pair just short of touching. Impulses are applied there and integration
//! resumes from the collision instant.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use super::{
    constraint_solver::ConstraintRow,
    evaluator::DynamicsEvaluator,
    forces::ForceRegistry,
    impulse::{resolve_collisions, ResolvedImpulse},
    integrator::{IntegrationMethod, Integrator},
    state::{self, StateVector},
};
use crate::{
    collision::{contact::ContactSet, narrowphase::detect_contacts},
    config::SimConfig,
    core::{
        connector::{Joint, Rope},
        rigidbody::RigidBody,
    },
    error::{PhysicsError, Result},
    utils::{allocator::Arena, logging::ScopedTimer},
};

/// Phase of the stepper's control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Integrating,
    Checking,
    Commit,
    Backup,
    Collide,
    Finished,
}

/// Outcome of one committed macro step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Simulation time reached.
    pub time: f64,
    /// Number of collision instants handled.
    pub collisions: usize,
    /// Number of bisection halvings performed.
    pub bisections: usize,
    pub impulses: Vec<ResolvedImpulse>,
}

/// Borrowed world state the stepper operates on.
pub struct StepContext<'a> {
    pub bodies: &'a mut Arena<RigidBody>,
    pub joints: &'a [Joint],
    pub ropes: &'a [Rope],
    pub forces: &'a ForceRegistry,
    pub config: &'a SimConfig,
}

impl StepContext<'_> {
    fn detect(&self) -> ContactSet {
        detect_contacts(
            self.bodies,
            self.config.distance_tol,
            self.config.elasticity_mixing,
        )
    }

    /// Rows of the flexible ropes that are within the distance tolerance of
    /// taut, overstretched ones included.
    fn taut_ropes(&self) -> Result<Vec<ConstraintRow>> {
        let mut rows = Vec::new();
        for rope in self.ropes.iter().filter(|rope| !rope.is_rigid()) {
            let row = ConstraintRow::from_rope(rope, self.bodies)?;
            if row.gap < self.config.distance_tol {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn stuck(&self, stage: &'static str, time: f64) -> PhysicsError {
        warn!(
            "{stage} exceeded {} iterations at t={time:.6}",
            self.config.max_collision_search
        );
        PhysicsError::CollisionSearchExceeded {
            stage,
            iterations: self.config.max_collision_search,
            time,
        }
    }
}

/// Drives the integrator through the collision state machine.
#[derive(Debug, Clone)]
pub struct CollisionStepper {
    integrator: Integrator,
    contact_forces: bool,
}

impl Default for CollisionStepper {
    fn default() -> Self {
        Self::new(IntegrationMethod::default())
    }
}

impl CollisionStepper {
    pub fn new(method: IntegrationMethod) -> Self {
        Self {
            integrator: Integrator::new(method),
            contact_forces: true,
        }
    }

    pub fn method(&self) -> IntegrationMethod {
        self.integrator.method
    }

    pub fn set_method(&mut self, method: IntegrationMethod) {
        self.integrator.method = method;
    }

    /// Whether resting contacts are held apart by contact forces during
    /// integration. Collisions are handled either way.
    pub fn set_contact_forces(&mut self, enabled: bool) {
        self.contact_forces = enabled;
    }

    pub fn contact_forces(&self) -> bool {
        self.contact_forces
    }

    /// Integrates `vars` (whose last entry is the time) forward by `dt` to
    /// `end_time`.
    fn integrate(
        &mut self,
        ctx: &mut StepContext<'_>,
        vars: &mut [f64],
        dt: f64,
        end_time: f64,
    ) -> Result<()> {
        let _timer = ScopedTimer::new("integrate");
        let mut evaluator = if self.contact_forces {
            DynamicsEvaluator::contact_aware(
                ctx.bodies,
                ctx.joints,
                ctx.ropes,
                ctx.forces,
                ctx.config,
            )
        } else {
            DynamicsEvaluator::rigid_body(ctx.bodies, ctx.joints, ctx.ropes, ctx.forces, ctx.config)
        };
        self.integrator.step(&mut evaluator, vars, dt)?;
        if let Some(time) = vars.last_mut() {
            *time = end_time;
        }
        Ok(())
    }

    /// Places `vars` in the bodies and reports whether any pair interpenetrates
    /// or any flexible rope is overstretched.
    fn penetrates(ctx: &mut StepContext<'_>, vars: &[f64]) -> Result<bool> {
        if let Err(err) = state::check_finite(vars, ctx.bodies) {
            warn!("rejecting step: {err}");
            return Err(err);
        }
        state::write_bodies(vars, ctx.bodies);
        if ctx.detect().has_penetration() {
            return Ok(true);
        }
        Ok(ctx.taut_ropes()?.iter().any(|row| row.gap < 0.0))
    }

    /// Advances `state` by `dt`. On error `state` still holds the last
    /// committed values but the bodies may not; callers restore them.
    pub fn advance(
        &mut self,
        ctx: &mut StepContext<'_>,
        state: &mut StateVector,
        dt: f64,
    ) -> Result<StepReport> {
        let _timer = ScopedTimer::new("advance");
        let start = state.time();
        let mut report = StepReport {
            time: start,
            ..StepReport::default()
        };
        if !dt.is_finite() || dt < 0.0 {
            return Err(PhysicsError::config(format!("invalid time step {dt}")));
        }
        if dt == 0.0 {
            return Ok(report);
        }

        let config = *ctx.config;
        let end = start + dt;
        let mut good = state.as_slice().to_vec();
        let mut good_time = start;
        let mut candidate = good.clone();
        let mut candidate_time = end;
        let mut iterations = 0;
        let mut phase = StepPhase::Integrating;

        while phase != StepPhase::Finished {
            trace!("{phase:?} good={good_time:.9} candidate={candidate_time:.9}");
            phase = match phase {
                StepPhase::Integrating => {
                    iterations += 1;
                    if iterations > config.max_collision_search {
                        return Err(ctx.stuck("collision search", good_time));
                    }
                    candidate.copy_from_slice(&good);
                    self.integrate(ctx, &mut candidate, candidate_time - good_time, candidate_time)?;
                    StepPhase::Checking
                }
                StepPhase::Checking => {
                    if Self::penetrates(ctx, &candidate)? {
                        StepPhase::Backup
                    } else {
                        StepPhase::Commit
                    }
                }
                StepPhase::Commit => {
                    good.copy_from_slice(&candidate);
                    good_time = candidate_time;
                    if good_time >= end {
                        StepPhase::Finished
                    } else {
                        candidate_time = end;
                        StepPhase::Integrating
                    }
                }
                StepPhase::Backup => {
                    state::write_bodies(&good, ctx.bodies);
                    let target_gap = config.target_gap();
                    let near_impact = |gap: f64, normal_velocity: f64| {
                        (0.0..target_gap).contains(&gap) && normal_velocity < -config.small_velocity
                    };
                    let ready = ctx
                        .detect()
                        .iter()
                        .any(|c| near_impact(c.distance, c.normal_velocity))
                        || ctx
                            .taut_ropes()?
                            .iter()
                            .any(|row| near_impact(row.gap, row.normal_velocity));
                    if ready || candidate_time - good_time < config.min_bisection_interval {
                        StepPhase::Collide
                    } else {
                        iterations += 1;
                        if iterations > config.max_collision_search {
                            return Err(ctx.stuck("collision bisection", good_time));
                        }
                        report.bisections += 1;
                        let mid = 0.5 * (good_time + candidate_time);
                        let mut trial = good.clone();
                        self.integrate(ctx, &mut trial, mid - good_time, mid)?;
                        if Self::penetrates(ctx, &trial)? {
                            candidate_time = mid;
                        } else {
                            good = trial;
                            good_time = mid;
                        }
                        StepPhase::Backup
                    }
                }
                StepPhase::Collide => {
                    iterations += 1;
                    if iterations > config.max_collision_search {
                        return Err(ctx.stuck("collision impact", good_time));
                    }
                    state::write_bodies(&good, ctx.bodies);
                    let touching = ctx.detect();
                    let impulses = resolve_collisions(
                        ctx.bodies,
                        ctx.joints,
                        ctx.ropes,
                        touching.as_slice(),
                        &config,
                        good_time,
                    )?;
                    debug!(
                        "collision at t={good_time:.6}: {} contacts, {} impulses",
                        touching.len(),
                        impulses.len()
                    );
                    state::read_bodies(ctx.bodies, &mut good);
                    report.collisions += 1;
                    report.impulses.extend(impulses);
                    candidate_time = end;
                    StepPhase::Integrating
                }
                StepPhase::Finished => StepPhase::Finished,
            };
        }

        state.assign(&good)?;
        state::write_bodies(&good, ctx.bodies);
        report.time = good_time;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shape::Shape;
    use glam::DVec2;

    fn approaching_pair() -> Arena<RigidBody> {
        let mut bodies = Arena::new();
        for (x, v) in [(-2.0, 1.0), (2.0, -1.0)] {
            let mut ball = RigidBody::new("ball", Shape::circle(0.5), 1.0);
            ball.set_position(DVec2::new(x, 0.0), 0.0);
            ball.set_velocity(DVec2::new(v, 0.0), 0.0);
            bodies.insert(ball);
        }
        bodies
    }

    #[test]
    fn free_motion_commits_in_one_pass() {
        let mut bodies = approaching_pair();
        let forces = ForceRegistry::new();
        let config = SimConfig::default();
        let mut state = StateVector::from_bodies(&bodies, 0.0);
        let mut stepper = CollisionStepper::new(IntegrationMethod::RungeKutta);
        let mut ctx = StepContext {
            bodies: &mut bodies,
            joints: &[],
            ropes: &[],
            forces: &forces,
            config: &config,
        };
        let report = stepper.advance(&mut ctx, &mut state, 0.5).unwrap();
        assert_eq!(report.collisions, 0);
        assert_eq!(report.bisections, 0);
        assert!((state.time() - 0.5).abs() < 1e-12);
        assert!((state.as_slice()[state::X] + 1.5).abs() < 1e-12);
    }

    #[test]
    fn collision_is_found_by_bisection() {
        let mut bodies = approaching_pair();
        let forces = ForceRegistry::new();
        let config = SimConfig::default();
        let mut state = StateVector::from_bodies(&bodies, 0.0);
        let mut stepper = CollisionStepper::new(IntegrationMethod::RungeKutta);
        let mut ctx = StepContext {
            bodies: &mut bodies,
            joints: &[],
            ropes: &[],
            forces: &forces,
            config: &config,
        };
        let report = stepper.advance(&mut ctx, &mut state, 2.0).unwrap();
        assert_eq!(report.collisions, 1);
        assert!(report.bisections > 0);
        assert_eq!(report.impulses.len(), 1);
        assert!((report.impulses[0].impulse - 2.0).abs() < 1e-9);

        let v = state.as_slice();
        assert!((v[state::VX] + 1.0).abs() < 1e-9);
        assert!((v[6 + state::VX] - 1.0).abs() < 1e-9);
        assert!((v[state::X] + 1.0).abs() < 2.0 * config.distance_tol);
    }

    #[test]
    fn negative_step_is_rejected() {
        let mut bodies = approaching_pair();
        let forces = ForceRegistry::new();
        let config = SimConfig::default();
        let mut state = StateVector::from_bodies(&bodies, 0.0);
        let mut ctx = StepContext {
            bodies: &mut bodies,
            joints: &[],
            ropes: &[],
            forces: &forces,
            config: &config,
        };
        let result = CollisionStepper::default().advance(&mut ctx, &mut state, -1.0);
        assert!(matches!(result, Err(PhysicsError::Configuration(_))));
    }
}
