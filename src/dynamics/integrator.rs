use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Right-hand side of a first-order system `dy/dt = f(y)`.
pub trait OdeSystem {
    /// Writes the rate of change of `vars` into `change`. `time_offset` is the
    /// offset of this evaluation from the start of the current step.
    fn evaluate(&mut self, vars: &[f64], change: &mut [f64], time_offset: f64) -> Result<()>;
}

/// Fixed-step scheme used by [`Integrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IntegrationMethod {
    #[default]
    RungeKutta,
    ModifiedEuler,
    Euler,
}

/// Integrator responsible for stepping the flat state vector forward in time.
#[derive(Debug, Clone, Default)]
pub struct Integrator {
    pub method: IntegrationMethod,
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    scratch: Vec<f64>,
}

impl Integrator {
    pub fn new(method: IntegrationMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    fn resize(&mut self, n: usize) {
        for buffer in [
            &mut self.k1,
            &mut self.k2,
            &mut self.k3,
            &mut self.k4,
            &mut self.scratch,
        ] {
            buffer.clear();
            buffer.resize(n, 0.0);
        }
    }

    /// Advances `vars` in place by `dt`. On error `vars` is left untouched.
    pub fn step<S: OdeSystem + ?Sized>(
        &mut self,
        system: &mut S,
        vars: &mut [f64],
        dt: f64,
    ) -> Result<()> {
        self.resize(vars.len());
        match self.method {
            IntegrationMethod::Euler => {
                system.evaluate(vars, &mut self.k1, 0.0)?;
                for (y, k) in vars.iter_mut().zip(&self.k1) {
                    *y += dt * k;
                }
            }
            IntegrationMethod::ModifiedEuler => {
                system.evaluate(vars, &mut self.k1, 0.0)?;
                offset(&mut self.scratch, vars, &self.k1, dt);
                system.evaluate(&self.scratch, &mut self.k2, dt)?;
                for i in 0..vars.len() {
                    vars[i] += 0.5 * dt * (self.k1[i] + self.k2[i]);
                }
            }
            IntegrationMethod::RungeKutta => {
                let half = 0.5 * dt;
                system.evaluate(vars, &mut self.k1, 0.0)?;
                offset(&mut self.scratch, vars, &self.k1, half);
                system.evaluate(&self.scratch, &mut self.k2, half)?;
                offset(&mut self.scratch, vars, &self.k2, half);
                system.evaluate(&self.scratch, &mut self.k3, half)?;
                offset(&mut self.scratch, vars, &self.k3, dt);
                system.evaluate(&self.scratch, &mut self.k4, dt)?;
                let sixth = dt / 6.0;
                for i in 0..vars.len() {
                    vars[i] += sixth
                        * (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]);
                }
            }
        }
        Ok(())
    }
}

fn offset(out: &mut [f64], base: &[f64], rate: &[f64], h: f64) {
    for ((o, y), k) in out.iter_mut().zip(base).zip(rate) {
        *o = y + h * k;
    }
}
