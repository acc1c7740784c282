//! Shared types for the worldstream engine.
//!
//! # Invariants
//! - Property bags iterate in key order.
//! - Spline tables are read only after `commit()`.

pub mod spline;
pub mod types;

pub use spline::{SplineScalar, SplineTable};
pub use types::{ObjectId, PropertyBag, PropertyValue};

pub fn crate_info() -> &'static str {
    "worldstream-common v0.1.0"
}
