//! Storage layer for casesync.
//!
//! This module provides SQLite-based persistence for every collection the
//! client keeps offline:
//! - Records, forms, options and other server data
//! - The queue of writes waiting for the network (`offline_requests`)

mod collections;
mod database;
mod migrations;
mod store;

pub use collections::Collection;
pub use database::Database;
pub use migrations::CURRENT_VERSION;
pub use store::LocalStore;
