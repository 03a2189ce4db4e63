// ============================================================================
// memodoc Library
// ============================================================================

//! Partial-projection document mapper.
//!
//! Entity types are described by a fixed attribute table and registered
//! against a [`DocumentStore`]. Instances can be loaded under a projection,
//! edited locally and saved back as minimal field-addressed operations,
//! including index-aligned edits of embedded document lists.
//!
//! # Examples
//!
//! ```
//! use memodoc::{Attribute, EntitySchema, MemoryStore, Registry, ValueKind};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> memodoc::Result<()> {
//! let mut registry = Registry::new(Arc::new(MemoryStore::new()));
//! let posts = registry.register(
//!     EntitySchema::root("Post", "posts")
//!         .attribute(Attribute::new("cont", ValueKind::Str).default_value(""))
//!         .attribute(Attribute::new("cover", ValueKind::Str))
//!         .build()?,
//! )?;
//!
//! let mut post = posts.blank().with("cont", "hello")?;
//! post.save().await?;
//!
//! let mut partial = posts.get(post.id().as_int().unwrap_or_default(), Some(&["cover"])).await?;
//! partial.set("cover", "cover.png")?;
//! partial.save().await?;
//!
//! let mut full = posts.get(post.id().as_int().unwrap_or_default(), None).await?;
//! assert_eq!(full.get("cont")?, json!("hello"));
//! assert_eq!(full.get("cover")?, json!("cover.png"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod diff;
pub mod entity;
pub mod schema;
pub mod storage;

// Re-export main types for convenience
pub use config::{DurabilityMode, StoreConfig};
pub use core::{DocError, Document, EntityId, Result};
pub use diff::{FieldPath, UpdateOp};
pub use entity::{Entity, generate_token};
pub use schema::{Attribute, DefaultValue, EntitySchema, EntityType, Registry, ValueKind};
pub use storage::{DocumentStore, Filter, MemoryStore, Projection, Query};
