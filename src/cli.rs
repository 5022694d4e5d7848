use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "storyreel")]
#[command(author, version, about = "Render narrated stories into captioned videos")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log filter directive, e.g. `info` or `sr_render=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the render API server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Import a story from a JSON file into the database
    Import {
        /// Story JSON file
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Inspect or adjust a user's render credits
    Credits {
        #[command(subcommand)]
        action: CreditsAction,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum CreditsAction {
    /// Add credits to a user's balance
    Grant {
        /// User id
        user: String,

        /// Number of credits to add
        amount: i64,

        /// Journal note
        #[arg(long, default_value = "manual grant")]
        reason: String,
    },

    /// Show a user's balance and recent transactions
    Balance {
        /// User id
        user: String,

        /// Number of journal entries to show
        #[arg(long, default_value = "10")]
        limit: i64,
    },
}
