use log::{log_enabled, warn, Level};
use std::time::{Duration, Instant};

/// Simple scoped timer for tracing the phases of a step.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            let elapsed = self.start.elapsed();
            log::trace!("end {} ({} us)", self.label, elapsed.as_micros());
        }
    }
}

/// Warns when a macro step took longer than the wall-clock budget.
pub fn warn_if_step_budget_exceeded(duration: Duration, budget_ms: f64) {
    let elapsed_ms = duration.as_secs_f64() * 1000.0;
    if elapsed_ms > budget_ms {
        warn!("step exceeded budget: {elapsed_ms:.2} ms > {budget_ms:.2} ms");
    }
}
