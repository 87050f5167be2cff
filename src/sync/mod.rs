//! Reconciling stored documents with incoming data.
//!
//! - `schema`: static field classification per collection and record type
//! - `merge`: the schema-driven deep merge
//! - `collections`: routing of server payloads into local collections

pub mod collections;
pub mod merge;
pub mod schema;

pub use collections::{sync_collection, SyncMethod, SyncTarget};
pub use merge::merge;
pub use schema::{FieldKind, KeyedList, Schema, SchemaRegistry, DEFAULT_ITEM_KEY};
