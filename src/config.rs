//! Global configuration constants and the tunable [`SimConfig`].

use serde::{Deserialize, Serialize};

use crate::{
    core::types::MixingMode,
    dynamics::{
        constraint_solver::ExtraAccel, impulse::CollisionHandling, integrator::IntegrationMethod,
    },
};

/// Default gravity magnitude, applied along -Y.
pub const DEFAULT_GRAVITY: f64 = 9.8;

/// Default macro step requested by a host loop (in seconds).
pub const DEFAULT_TIME_STEP: f64 = 0.025;

/// Gap below which two shapes are considered touching.
pub const DEFAULT_DISTANCE_TOL: f64 = 0.01;

/// Normal speed below which a touching pair is a resting contact rather than a collision.
pub const DEFAULT_VELOCITY_TOL: f64 = 0.05;

/// Impact speed below which a collision is treated as perfectly inelastic.
pub const DEFAULT_RESTITUTION_CUTOFF: f64 = 0.01;

/// Fraction of the distance tolerance the collision search aims for.
pub const DEFAULT_COLLISION_ACCURACY: f64 = 0.6;

/// Bisection and resolution passes allowed per macro step.
pub const DEFAULT_MAX_COLLISION_SEARCH: usize = 400;

/// Projected Gauss-Seidel sweeps allowed per constraint solve.
pub const DEFAULT_MAX_CONTACT_ITERATIONS: usize = 10_000;

/// Relative residual accepted by the constraint solvers.
pub const DEFAULT_SOLVER_TOLERANCE: f64 = 1e-10;

/// Time constant of the contact and joint stabilization terms.
pub const DEFAULT_STABILIZATION_TIMESCALE: f64 = 0.1;

/// Smallest time interval the bisection will split.
pub const DEFAULT_MIN_BISECTION_INTERVAL: f64 = 1e-9;

/// Approach speed below which a touching pair is not worth an impulse.
pub const DEFAULT_SMALL_VELOCITY: f64 = 1e-5;

/// Default coefficient of restitution for new bodies.
pub const DEFAULT_ELASTICITY: f64 = 1.0;

/// Tunable parameters of the contact-aware simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub distance_tol: f64,
    pub velocity_tol: f64,
    pub restitution_cutoff: f64,
    pub collision_accuracy: f64,
    pub max_collision_search: usize,
    pub max_contact_iterations: usize,
    pub solver_tolerance: f64,
    pub stabilization_timescale: f64,
    pub min_bisection_interval: f64,
    pub small_velocity: f64,
    pub elasticity_mixing: MixingMode,
    pub collision_handling: CollisionHandling,
    pub extra_accel: ExtraAccel,
    pub integration_method: IntegrationMethod,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            distance_tol: DEFAULT_DISTANCE_TOL,
            velocity_tol: DEFAULT_VELOCITY_TOL,
            restitution_cutoff: DEFAULT_RESTITUTION_CUTOFF,
            collision_accuracy: DEFAULT_COLLISION_ACCURACY,
            max_collision_search: DEFAULT_MAX_COLLISION_SEARCH,
            max_contact_iterations: DEFAULT_MAX_CONTACT_ITERATIONS,
            solver_tolerance: DEFAULT_SOLVER_TOLERANCE,
            stabilization_timescale: DEFAULT_STABILIZATION_TIMESCALE,
            min_bisection_interval: DEFAULT_MIN_BISECTION_INTERVAL,
            small_velocity: DEFAULT_SMALL_VELOCITY,
            elasticity_mixing: MixingMode::default(),
            collision_handling: CollisionHandling::default(),
            extra_accel: ExtraAccel::default(),
            integration_method: IntegrationMethod::default(),
        }
    }
}

impl SimConfig {
    pub fn with_distance_tol(mut self, tol: f64) -> Self {
        self.distance_tol = tol;
        self
    }

    pub fn with_velocity_tol(mut self, tol: f64) -> Self {
        self.velocity_tol = tol;
        self
    }

    pub fn with_restitution_cutoff(mut self, cutoff: f64) -> Self {
        self.restitution_cutoff = cutoff;
        self
    }

    pub fn with_max_collision_search(mut self, passes: usize) -> Self {
        self.max_collision_search = passes;
        self
    }

    pub fn with_collision_handling(mut self, handling: CollisionHandling) -> Self {
        self.collision_handling = handling;
        self
    }

    pub fn with_extra_accel(mut self, extra_accel: ExtraAccel) -> Self {
        self.extra_accel = extra_accel;
        self
    }

    pub fn with_integration_method(mut self, method: IntegrationMethod) -> Self {
        self.integration_method = method;
        self
    }

    pub fn with_elasticity_mixing(mut self, mode: MixingMode) -> Self {
        self.elasticity_mixing = mode;
        self
    }

    /// Gap at which the collision search stops backing up.
    pub fn target_gap(&self) -> f64 {
        self.distance_tol * self.collision_accuracy
    }

    /// Gap that stabilized resting contacts settle at.
    pub fn resting_gap(&self) -> f64 {
        self.distance_tol * 0.5
    }
}
