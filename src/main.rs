use anyhow::{Context as _, Result};
use clap::Parser;
use colored::Colorize;

use casesync::cli::args::{Cli, Commands};
use casesync::cli::commands::{self, Context};
use casesync::error::SyncError;
use casesync::logging;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        let code = e.downcast_ref::<SyncError>().map_or(1, SyncError::exit_code);
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let output = match cli.command {
        Commands::Completions { shell } => commands::completions(shell)?,
        command => {
            let ctx = Context::load(cli.config, cli.db, cli.output)?;
            let level = cli.log_level.as_deref().unwrap_or(&ctx.config.logging.level);
            logging::init(level, ctx.config.logging.json)?;
            execute(&ctx, command)?
        },
    };

    if !output.is_empty() {
        println!("{}", output.trim_end());
    }

    Ok(())
}

fn execute(ctx: &Context, command: Commands) -> Result<String> {
    let output = match command {
        Commands::Store(args) => commands::store(ctx, args.command)
            .with_context(|| format!("store {}", ctx.database.display()))?,
        Commands::Queue(args) => commands::queue(ctx, args.command)
            .with_context(|| format!("queue {}", ctx.database.display()))?,
        Commands::Config(args) => commands::config(ctx, args.command)?,
        Commands::Completions { shell } => commands::completions(shell)?,
    };
    Ok(output)
}
