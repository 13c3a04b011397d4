//! Additional 2D math helpers layered on top of `glam`.

use glam::DVec2;

/// Scalar torque produced by `force` applied at lever arm `r`.
pub fn torque(r: DVec2, force: DVec2) -> f64 {
    r.perp_dot(force)
}
