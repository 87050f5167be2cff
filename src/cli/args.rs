use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::queue::Method;
use crate::storage::Collection;

#[derive(Parser)]
#[command(name = "casesync")]
#[command(about = "Offline-first local store and action queue for case-management records")]
#[command(long_about = "casesync - offline store and sync queue

Keeps case-management records in a versioned local store and replays
writes made while offline against the server, one at a time and in order.

QUICK START:
  casesync store collections                  Show collections and sizes
  casesync store import records cases.json    Merge documents into a collection
  casesync queue add --type cases/SAVE_RECORD --method PATCH --path cases/c1
  casesync queue run                          Send queued actions

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

For more information on a specific command, run:
  casesync <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output, or 'json' for
    /// machine-readable output suitable for scripting. Defaults to
    /// `general.default_output` from the configuration.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Configuration file (default: ~/.casesync/config.yaml)
    #[arg(long, env = "CASESYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Database file (default: ~/.casesync/casesync.db)
    #[arg(long, env = "CASESYNC_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `casesync=trace` (overrides the config)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read and write the local store
    ///
    /// Documents live in named collections and are keyed by their `id`.
    /// Writing a document that is already stored merges both versions;
    /// nested subforms are matched by their `unique_id`.
    ///
    /// # Examples
    ///
    ///   casesync store list records --index case
    ///   casesync store get records c1
    ///   casesync store put records '{"id": "c1", "age": 10}' --index case
    #[command(alias = "s")]
    Store(StoreArgs),

    /// Manage the offline action queue
    ///
    /// Actions are persisted until the server confirms them. `run` sends
    /// them one at a time; an action failing three times in a row is
    /// dropped.
    ///
    /// # Examples
    ///
    ///   casesync queue list
    ///   casesync queue add --type cases/SAVE_RECORD --method PATCH --path cases/c1
    ///   casesync queue run
    #[command(alias = "q")]
    Queue(QueueArgs),

    /// Show or create the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    ///
    /// Example: casesync completions bash > ~/.bash_completion.d/casesync
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub command: StoreCommands,
}

/// Local store subcommands.
#[derive(Subcommand)]
pub enum StoreCommands {
    /// Show one document
    Get {
        /// Collection name
        collection: Collection,
        /// Document key
        key: String,
    },

    /// List the documents of a collection
    #[command(alias = "ls")]
    List {
        /// Collection name
        collection: Collection,
        /// Only documents stored under this query index (record type)
        #[arg(long, short = 'i')]
        index: Option<String>,
    },

    /// Write a document, merging it into the stored version
    Put {
        /// Collection name
        collection: Collection,
        /// Document as JSON
        document: String,
        /// Store under this key instead of the document's id
        #[arg(long, short = 'k')]
        key: Option<String>,
        /// Query index (record type) of the document
        #[arg(long, short = 'i')]
        index: Option<String>,
    },

    /// Delete a document
    #[command(alias = "rm")]
    Delete {
        /// Collection name
        collection: Collection,
        /// Document key
        key: String,
    },

    /// Remove every document of a collection
    Clear {
        /// Collection name
        collection: Collection,
        /// Skip confirmation
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Merge a JSON array or mapping of documents into a collection
    Import {
        /// Collection name
        collection: Collection,
        /// JSON file; `-` reads stdin
        file: PathBuf,
        /// Query index (record type) of the documents
        #[arg(long, short = 'i')]
        index: Option<String>,
    },

    /// List collections with their sizes
    Collections,

    /// Show the store schema version
    Version,
}

#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

/// Offline queue subcommands.
#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued actions in dispatch order
    #[command(alias = "ls")]
    List,

    /// Queue an action
    Add {
        /// Action type, e.g. cases/SAVE_RECORD
        #[arg(long = "type", short = 't')]
        action_type: String,

        /// HTTP method
        #[arg(long, short = 'm', default_value = "PATCH", value_parser = parse_method)]
        method: Method,

        /// Path relative to the server base URL
        #[arg(long, short = 'p')]
        path: String,

        /// Request body as JSON
        #[arg(long, short = 'b')]
        body: Option<String>,

        /// Id of the targeted record
        #[arg(long)]
        id: Option<String>,

        /// Collection the response is written to
        #[arg(long)]
        target: Option<Collection>,

        /// Record type used when writing the response
        #[arg(long)]
        record_type: Option<String>,

        /// Attachment field the action uploads or removes
        #[arg(long, requires = "record_type")]
        attachment: Option<String>,
    },

    /// Show queue size and server settings
    Status,

    /// Send queued actions until the queue is empty
    Run,

    /// Drop the head action without sending it
    Skip,

    /// Remove every queued action
    Clear {
        /// Skip confirmation
        #[arg(long, short = 'f')]
        force: bool,
    },
}

fn parse_method(s: &str) -> Result<Method, String> {
    Method::from_name(s).ok_or_else(|| format!("unknown HTTP method '{s}'"))
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short = 'f')]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_queue_add() {
        let cli = Cli::try_parse_from([
            "casesync",
            "queue",
            "add",
            "--type",
            "cases/SAVE_RECORD",
            "--method",
            "post",
            "--path",
            "cases",
            "--target",
            "records",
            "--record-type",
            "case",
        ])
        .unwrap();

        let Commands::Queue(QueueArgs {
            command: QueueCommands::Add { method, target, .. },
        }) = cli.command
        else {
            panic!("expected queue add");
        };
        assert_eq!(method, Method::Post);
        assert_eq!(target, Some(Collection::Records));
    }

    #[test]
    fn test_unknown_collection_rejected() {
        assert!(Cli::try_parse_from(["casesync", "store", "list", "reports"]).is_err());
    }

    #[test]
    fn test_global_output_flag() {
        let cli = Cli::try_parse_from(["casesync", "store", "version", "-o", "json"]).unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
    }
}
