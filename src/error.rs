//! Error types surfaced by the engine.

use thiserror::Error;

/// Failures that abort the current step. None of them are retried internally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// Invalid setup: singular or redundant joints, bad shapes, unknown bodies.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Bisection, collision resolution or contact relaxation did not converge.
    #[error("stuck during {stage} after {iterations} iterations at time {time}")]
    CollisionSearchExceeded {
        stage: &'static str,
        iterations: usize,
        time: f64,
    },

    /// A position or velocity became non-finite.
    #[error("non-finite value in {variable} at time {time}")]
    NumericAnomaly { variable: String, time: f64 },

    /// A state vector of the wrong length was supplied.
    #[error("state vector length mismatch: expected {expected}, got {actual}")]
    StateLength { expected: usize, actual: usize },
}

impl PhysicsError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True for the "stuck" family of errors.
    pub fn is_stuck(&self) -> bool {
        matches!(self, Self::CollisionSearchExceeded { .. })
    }
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
