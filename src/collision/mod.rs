//! Collision detection: sort-and-sweep pair culling and exact 2D contact tests.

pub mod broadphase;
pub mod contact;
pub mod narrowphase;

pub use broadphase::candidate_pairs;
pub use contact::{Contact, ContactSet, NormalKind};
pub use narrowphase::detect_contacts;
