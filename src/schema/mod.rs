pub mod attribute;
pub mod entity_schema;
pub mod registry;

pub use attribute::{Attribute, DefaultFn, DefaultValue, ValueKind};
pub use entity_schema::{EntitySchema, SchemaBuilder};
pub use registry::{EntityType, Registry};
