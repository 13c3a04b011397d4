//! Utility helpers: id allocation, 2D math and logging.

pub mod allocator;
pub mod logging;
pub mod math;

pub use allocator::{Arena, EntityId, GenerationalId};
pub use math::*;
