//! rigid2d – a 2D rigid-body engine.
//!
//! Bodies carry circle or convex polygon shapes and move under pluggable
//! force laws. Joints and ropes hold anchor points together, resting
//! contacts are held apart by solved contact forces, and collisions are
//! located by bisection and resolved with impulses. [`PhysicsWorld`] ties it together.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::DVec2;

pub use collision::{Contact, ContactSet, NormalKind};
pub use config::{SimConfig, DEFAULT_TIME_STEP};
pub use core::{
    builders::{make_ball, make_block, make_regular_polygon, Walls},
    connector::{Anchor, CoordType, Joint, Rope, RopeKind},
    rigidbody::RigidBody,
    shape::{Polygon, Shape},
    types::{EnergyInfo, MassProperties, MixingMode, Transform, Velocity},
};
pub use dynamics::{
    CollisionHandling, DampingLaw, ExtraAccel, Force, ForceLaw, ForceLawHandle, ForceRegistry,
    GravityLaw, IntegrationMethod, ResolvedImpulse, Spring, StateSnapshot, StepReport, Thruster,
    ThrusterSet, VarInfo,
};
pub use error::{PhysicsError, Result};
pub use utils::allocator::{Arena, EntityId, GenerationalId};
pub use world::{PhysicsWorld, PostStepHook};
