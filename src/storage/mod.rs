pub mod engine;
pub mod memory;
pub mod persistence;
pub mod query;

pub use engine::DocumentStore;
pub use memory::MemoryStore;
pub use persistence::{SnapshotManager, StoreSnapshot};
pub use query::{Condition, Filter, Projection, Query};
