//! Simulation dynamics: force laws, integration, constraint solving and the
//! collision-aware stepper.

pub mod constraint_solver;
pub mod evaluator;
pub mod forces;
pub mod impulse;
pub mod integrator;
pub mod island;
pub mod state;
pub mod stepper;

pub use constraint_solver::{ConstraintRow, ConstraintSystem, ExtraAccel, RowKind};
pub use evaluator::{DynamicsEvaluator, EvalPhase};
pub use forces::{
    DampingLaw, Force, ForceLaw, ForceLawHandle, ForceRegistry, GravityLaw, Spring, Thruster,
    ThrusterSet,
};
pub use impulse::{resolve_collisions, CollisionHandling, ResolvedImpulse};
pub use integrator::{IntegrationMethod, Integrator, OdeSystem};
pub use island::{build_islands, Island};
pub use state::{StateSnapshot, StateVector, VarInfo};
pub use stepper::{CollisionStepper, StepContext, StepPhase, StepReport};
