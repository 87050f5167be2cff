//! Configuration management for casesync.
//!
//! This module handles loading and saving configuration from `~/.casesync/`.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{Config, GeneralConfig, LoggingConfig, QueueConfig, ServerConfig};
