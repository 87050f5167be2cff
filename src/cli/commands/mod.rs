//! Command implementations for casesync.
//!
//! Every command returns the text to print on stdout.

mod config;
mod queue;
mod store;

pub use config::config;
pub use queue::queue;
pub use store::store;

use std::path::PathBuf;

use clap::CommandFactory;
use clap_complete::Shell;
use tracing::debug;

use crate::cli::args::{Cli, OutputFormat};
use crate::config::{Config, Paths};
use crate::error::SyncError;
use crate::storage::LocalStore;

/// Resolved settings shared by all commands.
pub struct Context {
    /// Loaded configuration.
    pub config: Config,
    /// Configuration file in use.
    pub config_file: PathBuf,
    /// Database file in use.
    pub database: PathBuf,
    /// Output format.
    pub format: OutputFormat,
}

impl Context {
    /// Resolve paths and load the configuration.
    ///
    /// Explicit paths win over `CASESYNC_HOME` and the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read.
    pub fn load(
        config_file: Option<PathBuf>,
        database: Option<PathBuf>,
        format: Option<OutputFormat>,
    ) -> Result<Self, SyncError> {
        let paths = Paths::default();
        let config_file = config_file.unwrap_or_else(|| paths.config_file.clone());
        let database = database.unwrap_or_else(|| paths.database.clone());
        let config = Config::load_from_path(&config_file)?;
        let format = format.unwrap_or(config.general.default_output);

        Ok(Self {
            config,
            config_file,
            database,
            format,
        })
    }

    /// Open the local store, upgrading it if needed.
    ///
    /// Subform declarations found in the stored forms are added to the
    /// configured merge schemas.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_store(&self) -> Result<LocalStore, SyncError> {
        if let Some(parent) = self.database.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut store = LocalStore::open(&self.database, self.config.schema_registry())?;
        let forms = store.refresh_schemas_from_forms()?;
        debug!(database = %self.database.display(), forms, "store opened");
        Ok(store)
    }
}

/// Generate a shell completion script.
///
/// # Errors
///
/// Returns an error if the script is not valid UTF-8.
pub fn completions(shell: Shell) -> Result<String, SyncError> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, "casesync", &mut buf);
    String::from_utf8(buf).map_err(|e| SyncError::Parse(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_mention_subcommands() {
        let script = completions(Shell::Bash).unwrap();
        assert!(script.contains("casesync"));
        assert!(script.contains("queue"));
    }

    #[test]
    fn test_context_uses_explicit_paths() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let database = temp_dir.path().join("nested").join("store.db");

        let ctx = Context::load(
            Some(temp_dir.path().join("missing.yaml")),
            Some(database.clone()),
            Some(OutputFormat::Json),
        )
        .unwrap();
        assert_eq!(ctx.format, OutputFormat::Json);

        let store = ctx.open_store().unwrap();
        assert!(store.is_open());
        assert!(database.exists());
    }
}
