//! Core types describing bodies, shapes, connectors and shared data.

pub mod builders;
pub mod connector;
pub mod rigidbody;
pub mod shape;
pub mod types;

pub use builders::{make_ball, make_block, make_regular_polygon, Walls};
pub use connector::{Anchor, CoordType, Joint, Rope, RopeKind};
pub use rigidbody::RigidBody;
pub use shape::{Edge, Polygon, Shape};
pub use types::{EnergyInfo, MassProperties, MixingMode, Transform, Velocity};
