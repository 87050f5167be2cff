//! casesync - offline-first local store and action queue
//!
//! This crate keeps case-management records in a versioned local store,
//! merges server payloads into stored documents subform by subform, and
//! replays writes made while offline in order.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod queue;
pub mod storage;
pub mod sync;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::SyncError;
pub use queue::{ActionQueue, QueueEvent, QueueItem, QueueSink, SyncRunner};
pub use storage::{Collection, LocalStore};
pub use sync::{merge, Schema, SchemaRegistry};
