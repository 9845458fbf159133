use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediameta")]
#[command(author, version, about = "Media metadata extraction for search indexing")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract canonical attributes from media files
    Extract {
        /// Files to extract (paths or file:// URLs)
        #[arg(required = true)]
        files: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Per-file time budget in milliseconds (overrides config)
        #[arg(long)]
        budget_ms: Option<u64>,

        /// Number of worker threads (defaults to the CPU count)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Identify the container family of each file
    Sniff {
        /// Files to classify
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Show the raw records a parser produces, before mapping
    Records {
        /// File to inspect
        #[arg(required = true)]
        file: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the attribute vocabulary with declared types
    Vocab {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}
