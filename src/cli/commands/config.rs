//! Configuration commands.

use colored::Colorize;
use serde_json::json;

use super::Context;
use crate::cli::args::{ConfigCommands, OutputFormat};
use crate::config::Config;
use crate::error::SyncError;
use crate::output::to_json;

/// Execute config subcommands.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized or written.
pub fn config(ctx: &Context, cmd: ConfigCommands) -> Result<String, SyncError> {
    match cmd {
        ConfigCommands::Show => match ctx.format {
            OutputFormat::Json => to_json(&ctx.config),
            OutputFormat::Pretty => {
                let yaml = serde_yaml::to_string(&ctx.config)?;
                Ok(format!(
                    "{} {}\n{}",
                    "#".dimmed(),
                    ctx.config_file.display().to_string().dimmed(),
                    yaml.trim_end()
                ))
            },
        },
        ConfigCommands::Init { force } => {
            let path = &ctx.config_file;
            if path.exists() && !force {
                return Err(SyncError::Config(format!(
                    "{} already exists. Use --force to overwrite.",
                    path.display()
                )));
            }

            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Config::default().save_to_path(path)?;

            match ctx.format {
                OutputFormat::Json => to_json(&json!({"written": path})),
                OutputFormat::Pretty => Ok(format!(
                    "{} Wrote {}",
                    "✓".green(),
                    path.display()
                )),
            }
        },
    }
}
