//! Diff engine: turns an entity's tracked state into store operations.
//!
//! - `op.rs` - `FieldPath`, `UpdateOp` and their application to documents
//! - `scalar.rs` - per-attribute diff against the loaded baseline
//! - `array.rs` - index-aligned reconciliation of list attributes

pub mod array;
pub mod op;
pub mod scalar;

pub use op::{FieldPath, Segment, UpdateOp, apply_all};
pub use scalar::{TrackedState, diff_attributes, diff_object};
