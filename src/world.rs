use std::time::Instant;

use log::{debug, info};

use crate::{
    collision::{contact::ContactSet, narrowphase::detect_contacts},
    config::SimConfig,
    core::{
        builders::Walls,
        connector::{Joint, Rope},
        rigidbody::RigidBody,
        types::EnergyInfo,
    },
    dynamics::{
        constraint_solver::ExtraAccel,
        forces::{ForceLaw, ForceLawHandle, ForceRegistry},
        impulse::CollisionHandling,
        integrator::IntegrationMethod,
        state::{self, StateSnapshot, StateVector, VarInfo},
        stepper::{CollisionStepper, StepContext, StepReport},
    },
    error::{PhysicsError, Result},
    utils::{
        allocator::{Arena, EntityId},
        logging::{warn_if_step_budget_exceeded, ScopedTimer},
    },
};

const ALIGN_PASSES: usize = 10;

/// Callback run once after every committed macro step.
pub type PostStepHook = Box<dyn FnMut(&StepReport, &Arena<RigidBody>) + Send + Sync>;

/// Central simulation container: bodies, connectors, force laws and the stepper.
///
/// Bodies are the source of truth between steps; the flat state vector is
/// rebuilt from them on demand in slot order.
pub struct PhysicsWorld {
    bodies: Arena<RigidBody>,
    joints: Vec<Joint>,
    ropes: Vec<Rope>,
    forces: ForceRegistry,
    config: SimConfig,
    stepper: CollisionStepper,
    time: f64,
    initial_state: Option<StateSnapshot>,
    hooks: Vec<PostStepHook>,
    step_budget_ms: Option<f64>,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    pub fn with_config(config: SimConfig) -> Self {
        Self {
            bodies: Arena::new(),
            joints: Vec::new(),
            ropes: Vec::new(),
            forces: ForceRegistry::new(),
            stepper: CollisionStepper::new(config.integration_method),
            config,
            time: 0.0,
            initial_state: None,
            hooks: Vec::new(),
            step_budget_ms: None,
        }
    }

    pub fn add_body(&mut self, body: RigidBody) -> EntityId {
        let id = self.bodies.insert(body);
        if let Some(stored) = self.bodies.get_mut(id) {
            stored.id = id;
        }
        self.layout_changed();
        id
    }

    pub fn add_walls(&mut self, walls: Walls) -> Vec<EntityId> {
        walls.bodies.into_iter().map(|wall| self.add_body(wall)).collect()
    }

    /// Removes a body and every joint and rope attached to it.
    pub fn remove_body(&mut self, id: EntityId) -> Option<RigidBody> {
        let body = self.bodies.remove(id)?;
        let detached =
            |(a, b): (Option<EntityId>, Option<EntityId>)| a != Some(id) && b != Some(id);
        let before = self.joints.len() + self.ropes.len();
        self.joints.retain(|joint| detached(joint.bodies()));
        self.ropes.retain(|rope| detached(rope.bodies()));
        let removed = before - self.joints.len() - self.ropes.len();
        if removed > 0 {
            debug!("removed {removed} connectors attached to {}", body.name());
        }
        self.layout_changed();
        Some(body)
    }

    fn layout_changed(&mut self) {
        if self.initial_state.take().is_some() {
            debug!("body set changed, discarding saved initial state");
        }
    }

    pub fn body(&self, id: EntityId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    /// Mutable access between steps; edits become part of the state.
    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id)
    }

    /// Case-insensitive lookup.
    pub fn body_by_name(&self, name: &str) -> Option<&RigidBody> {
        self.bodies.iter().find(|body| body.name_equals(name))
    }

    pub fn bodies(&self) -> &Arena<RigidBody> {
        &self.bodies
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn check_anchors(
        &self,
        owner: &str,
        ends: (Option<EntityId>, Option<EntityId>),
    ) -> Result<()> {
        for id in [ends.0, ends.1].into_iter().flatten() {
            if self.bodies.get(id).is_none() {
                return Err(PhysicsError::config(format!("{owner} refers to an unknown body")));
            }
        }
        Ok(())
    }

    pub fn add_joint(&mut self, joint: Joint) -> Result<()> {
        self.check_anchors(&format!("joint {}", joint.name), joint.bodies())?;
        self.joints.push(joint);
        Ok(())
    }

    pub fn add_joints(&mut self, joints: impl IntoIterator<Item = Joint>) -> Result<()> {
        for joint in joints {
            self.add_joint(joint)?;
        }
        Ok(())
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn clear_joints(&mut self) {
        self.joints.clear();
    }

    pub fn add_rope(&mut self, rope: Rope) -> Result<()> {
        let owner = format!("rope {}", rope.name);
        if !rope.length.is_finite() || rope.length <= 0.0 {
            return Err(PhysicsError::config(format!(
                "{owner} needs a positive length, got {}",
                rope.length
            )));
        }
        self.check_anchors(&owner, rope.bodies())?;
        self.ropes.push(rope);
        Ok(())
    }

    pub fn ropes(&self) -> &[Rope] {
        &self.ropes
    }

    /// Registers a force law. The handle gives typed access to it later.
    pub fn add_force_law<F: ForceLaw + 'static>(&mut self, law: F) -> ForceLawHandle {
        self.forces.add(law)
    }

    pub fn force_law<F: ForceLaw + 'static>(&self, handle: ForceLawHandle) -> Option<&F> {
        self.forces.get(handle)
    }

    /// Mutable access between steps, e.g. to switch thrusters.
    pub fn force_law_mut<F: ForceLaw + 'static>(
        &mut self,
        handle: ForceLawHandle,
    ) -> Option<&mut F> {
        self.forces.get_mut(handle)
    }

    pub fn remove_force_law(&mut self, handle: ForceLawHandle) -> bool {
        self.forces.remove(handle)
    }

    pub fn force_laws(&self) -> &ForceRegistry {
        &self.forces
    }

    /// Moves bodies so every joint gap closes. The first anchor's body moves
    /// unless it is static or a world point.
    pub fn align_joints(&mut self) {
        for _ in 0..ALIGN_PASSES {
            for joint in &self.joints {
                let Some(gap) = joint.gap(&self.bodies) else {
                    continue;
                };
                if gap == 0.0 {
                    continue;
                }
                let normal = joint.world_normal(&self.bodies);
                let movable = |id: Option<EntityId>| {
                    id.filter(|id| self.bodies.get(*id).is_some_and(|b| !b.is_static()))
                };
                let (target, shift) = match (movable(joint.anchor_a.body()), movable(joint.anchor_b.body())) {
                    (Some(a), _) => (a, -gap * normal),
                    (None, Some(b)) => (b, gap * normal),
                    (None, None) => continue,
                };
                if let Some(body) = self.bodies.get_mut(target) {
                    let angle = body.angle();
                    let position = body.position() + shift;
                    body.set_position(position, angle);
                }
            }
        }
    }

    pub fn add_post_step_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&StepReport, &Arena<RigidBody>) + Send + Sync + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    /// Warns through `log` when a call to [`advance`](Self::advance) takes
    /// longer than `budget_ms` of wall-clock time.
    pub fn set_step_budget(&mut self, budget_ms: Option<f64>) {
        self.step_budget_ms = budget_ms;
    }

    /// Advances the simulation by `dt`, handling every collision in between.
    /// On error the bodies and time stay at their values before the call.
    pub fn advance(&mut self, dt: f64) -> Result<StepReport> {
        let started = Instant::now();
        if self.initial_state.is_none() {
            self.save_initial_state();
        }

        let mut state = StateVector::from_bodies(&self.bodies, self.time);
        let before = state.clone();
        let result = {
            let _timer = ScopedTimer::new("world::advance");
            let mut ctx = StepContext {
                bodies: &mut self.bodies,
                joints: &self.joints,
                ropes: &self.ropes,
                forces: &self.forces,
                config: &self.config,
            };
            self.stepper.advance(&mut ctx, &mut state, dt)
        };

        match result {
            Ok(report) => {
                self.time = state.time();
                for hook in &mut self.hooks {
                    hook(&report, &self.bodies);
                }
                if let Some(budget) = self.step_budget_ms {
                    warn_if_step_budget_exceeded(started.elapsed(), budget);
                }
                Ok(report)
            }
            Err(err) => {
                before.scatter(&mut self.bodies);
                Err(err)
            }
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn state_vector(&self) -> Vec<f64> {
        StateVector::from_bodies(&self.bodies, self.time)
            .as_slice()
            .to_vec()
    }

    /// Overwrites every body and the time from a flat vector laid out as
    /// [`state_vector`](Self::state_vector) returns it.
    pub fn set_state_vector(&mut self, values: &[f64]) -> Result<()> {
        let expected = state::state_len(self.bodies.len());
        if values.len() != expected {
            return Err(PhysicsError::StateLength {
                expected,
                actual: values.len(),
            });
        }
        state::write_bodies(values, &mut self.bodies);
        self.time = values[expected - 1];
        Ok(())
    }

    pub fn var_infos(&self) -> Vec<VarInfo> {
        state::var_infos(&self.bodies)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateVector::from_bodies(&self.bodies, self.time).snapshot()
    }

    pub fn restore(&mut self, snapshot: &StateSnapshot) -> Result<()> {
        self.set_state_vector(&snapshot.values)
    }

    pub fn save_initial_state(&mut self) {
        let snapshot = self.snapshot();
        info!(
            "saved initial state of {} bodies at t={:.6}",
            self.bodies.len(),
            snapshot.time
        );
        self.initial_state = Some(snapshot);
    }

    /// Returns to the saved initial state. Without one, nothing changes.
    pub fn reset(&mut self) -> Result<()> {
        let Some(snapshot) = self.initial_state.clone() else {
            return Ok(());
        };
        self.restore(&snapshot)?;
        info!("reset to t={:.6}", self.time);
        Ok(())
    }

    /// Sets the elasticity of every body, clamped to `[0, 1]`.
    pub fn set_elasticity(&mut self, elasticity: f64) {
        for body in self.bodies.iter_mut() {
            body.set_elasticity(elasticity);
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SimConfig) {
        self.stepper.set_method(config.integration_method);
        self.config = config;
    }

    pub fn set_collision_handling(&mut self, handling: CollisionHandling) {
        self.config.collision_handling = handling;
    }

    pub fn set_extra_accel(&mut self, extra_accel: ExtraAccel) {
        self.config.extra_accel = extra_accel;
    }

    pub fn set_integration_method(&mut self, method: IntegrationMethod) {
        self.config.integration_method = method;
        self.stepper.set_method(method);
    }

    pub fn set_contact_forces(&mut self, enabled: bool) {
        self.stepper.set_contact_forces(enabled);
    }

    pub fn energy(&self) -> EnergyInfo {
        EnergyInfo {
            translational: self.bodies.iter().map(RigidBody::translational_energy).sum(),
            rotational: self.bodies.iter().map(RigidBody::rotational_energy).sum(),
            potential: self.forces.potential_energy(&self.bodies),
        }
    }

    /// Pairs currently within the distance tolerance, for inspection.
    pub fn contacts(&self) -> ContactSet {
        detect_contacts(
            &self.bodies,
            self.config.distance_tol,
            self.config.elasticity_mixing,
        )
    }
}
