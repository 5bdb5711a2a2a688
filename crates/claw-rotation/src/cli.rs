//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// claw-rotate - four-step credential rotation.
#[derive(Parser, Debug, Clone)]
#[command(name = "claw-rotate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path of the JSON configuration file.
    #[arg(short, long, env = "CLAW_ROTATE_CONFIG", default_value = "claw-rotate.json")]
    pub config: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Log output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run one rotation step from a JSON event.
    ///
    /// The event carries `SecretId`, `ClientRequestToken` and `Step`.
    Invoke {
        /// File holding the event; stdin when omitted.
        #[arg(long)]
        event: Option<PathBuf>,
    },

    /// Run all four steps for a secret.
    Rotate {
        /// Secret to rotate.
        #[arg(long)]
        secret_id: String,
        /// Version token; a fresh UUID when omitted.
        #[arg(long)]
        token: Option<String>,
    },

    /// Create a secret whose current version holds a file's contents.
    Seed {
        /// Secret to create.
        #[arg(long)]
        secret_id: String,
        /// File holding the initial JSON value.
        #[arg(long)]
        value_file: PathBuf,
    },

    /// Print the version to staging label table of a secret.
    Describe {
        /// Secret to describe.
        #[arg(long)]
        secret_id: String,
    },

    /// Write a fresh base64 master key.
    InitKey {
        /// Destination file; must not exist.
        #[arg(long)]
        output: PathBuf,
    },
}
