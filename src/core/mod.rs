pub mod error;
pub mod types;

pub use error::{DocError, Result};
pub use types::{Document, EntityId, ID_FIELD, json_type_name, timestamp_now};
